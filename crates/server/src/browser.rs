//! Interactive browser detection.
//!
//! Maven endpoints serve machine clients only. Browsers are turned away
//! before any lookup so cached content is never rendered in a page.

use regex::Regex;
use std::sync::LazyLock;

/// Message returned to rejected browsers.
pub const BROWSER_REJECTION_MESSAGE: &str =
    "This endpoint is not available for browsers. Use a Maven client instead.";

// Chrome, Firefox, Safari, Edge, Opera and Internet Explorer. Tool user
// agents (Maven, Gradle, curl) never carry these tokens.
static BROWSER_UA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:chrome|chromium|crios|firefox|fxios|safari|edg|edge|opera|opr)/|\bmsie |\btrident/.*rv:",
    )
    .expect("Invalid browser regex")
});

/// Whether a User-Agent belongs to an interactive browser.
pub fn is_browser(user_agent: Option<&str>) -> bool {
    user_agent.is_some_and(|ua| BROWSER_UA.is_match(ua))
}
