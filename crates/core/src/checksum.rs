//! Checksums reported for cached artifacts.
//!
//! The proxy computes SHA-1 (mandatory) and MD5 (optional) while streaming an
//! artifact to object storage; these types only validate and normalize the
//! hex form it reports.

use serde::{Deserialize, Serialize};
use std::fmt;

fn parse_hex(kind: &str, s: &str, len: usize) -> crate::Result<String> {
    if s.len() != len {
        return Err(crate::Error::InvalidChecksum(format!(
            "{kind}: expected {len} hex chars, got {}",
            s.len()
        )));
    }
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(crate::Error::InvalidChecksum(format!(
            "{kind}: non-hex character"
        )));
    }
    Ok(s.to_ascii_lowercase())
}

/// A SHA-1 checksum as 40 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha1Hex(String);

impl Sha1Hex {
    pub const HEX_LEN: usize = 40;

    /// Parse from hex, normalizing to lowercase.
    pub fn parse(s: &str) -> crate::Result<Self> {
        parse_hex("sha1", s, Self::HEX_LEN).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An MD5 checksum as 32 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Md5Hex(String);

impl Md5Hex {
    pub const HEX_LEN: usize = 32;

    /// Parse from hex, normalizing to lowercase.
    pub fn parse(s: &str) -> crate::Result<Self> {
        parse_hex("md5", s, Self::HEX_LEN).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_hex_traits {
    ($ty:ident) => {
        impl TryFrom<String> for $ty {
            type Error = crate::Error;

            fn try_from(s: String) -> crate::Result<Self> {
                Self::parse(&s)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> String {
                value.0
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), self.0)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

impl_hex_traits!(Sha1Hex);
impl_hex_traits!(Md5Hex);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_parse() {
        let sha1 = Sha1Hex::parse("A94A8FE5CCB19BA61C4C0873D391E987982FBBD3").unwrap();
        assert_eq!(sha1.as_str(), "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3");
        assert!(Sha1Hex::parse("a94a8fe5").is_err());
        assert!(Sha1Hex::parse("z94a8fe5ccb19ba61c4c0873d391e987982fbbd3").is_err());
    }

    #[test]
    fn test_md5_parse() {
        let md5 = Md5Hex::parse("098f6bcd4621d373cade4e832627b4f6").unwrap();
        assert_eq!(md5.to_string(), "098f6bcd4621d373cade4e832627b4f6");
        assert!(Md5Hex::parse("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let ok: Sha1Hex =
            serde_json::from_str("\"a94a8fe5ccb19ba61c4c0873d391e987982fbbd3\"").unwrap();
        assert_eq!(ok.as_str().len(), 40);
        assert!(serde_json::from_str::<Md5Hex>("\"short\"").is_err());
    }
}
