//! Request path handling.
//!
//! A request path such as `com/example/lib/1.0/lib-1.0.jar` addresses one
//! file: everything before the last `/` is the folder path (the Maven package
//! path), everything after it is the file name. Characters are not validated.

use std::fmt;

/// Checksum format requested through a digest suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestFormat {
    Sha1,
    Md5,
}

impl DigestFormat {
    /// File suffix including the leading dot.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Sha1 => ".sha1",
            Self::Md5 => ".md5",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
        }
    }
}

impl fmt::Display for DigestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a path into `(folder_path, file_name)`.
///
/// A path without `/` has an empty folder path. A trailing `/` yields an
/// empty file name. Empty input is rejected.
pub fn split(path: &str) -> crate::Result<(&str, &str)> {
    if path.is_empty() {
        return Err(crate::Error::EmptyPath);
    }

    Ok(match path.rsplit_once('/') {
        Some((folder, file)) => (folder, file),
        None => ("", path),
    })
}

/// Recognise a request for a checksum file.
///
/// Returns the path of the artifact the digest belongs to and the requested
/// format, or `None` when the path is a regular artifact.
pub fn digest_request(path: &str) -> Option<(&str, DigestFormat)> {
    [DigestFormat::Sha1, DigestFormat::Md5]
        .into_iter()
        .find_map(|format| {
            path.strip_suffix(format.suffix())
                .filter(|artifact| !artifact.is_empty() && !artifact.ends_with('/'))
                .map(|artifact| (artifact, format))
        })
}
