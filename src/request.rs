//! Request path normalization.
//!
//! Every request path entering the orchestrator is converted into a [`RequestPath`] first. The
//! conversion strips leading/trailing slashes and rejects anything that could address a location
//! outside the source root or cache directory, before any filesystem access happens.

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt::{Display, Formatter},
    path::{Component, Path, PathBuf},
};

use crate::error::ForgeError;

/// A normalized, root-relative request path: `/`-separated, no leading or trailing slash, no
/// empty, `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestPath(String);

impl RequestPath {
    pub fn parse(raw: &str) -> Result<RequestPath, ForgeError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(ForgeError::NotFound(format!("empty request path {raw:?}")));
        }
        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            match segment {
                // Collapse repeated separators.
                "" => continue,
                "." | ".." => {
                    return Err(ForgeError::Forbidden(format!(
                        "request path {raw:?} leaves the asset root"
                    )));
                }
                s if s.contains('\\') || s.contains('\0') || s.contains(':') => {
                    return Err(ForgeError::Forbidden(format!(
                        "request path {raw:?} contains an invalid segment"
                    )));
                }
                s => segments.push(s),
            }
        }
        Ok(RequestPath(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path with the extension of its final segment removed.
    pub fn stem(&self) -> &str {
        strip_extension(&self.0)
    }

    /// Location of this request inside `dir`, mirroring the request path 1:1.
    pub fn under(&self, dir: &Path) -> PathBuf {
        self.0.split('/').fold(dir.to_path_buf(), |acc, s| acc.join(s))
    }
}

impl Display for RequestPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Remove the extension of the last path segment. Dot-files (`.env`) have no extension.
pub fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(0) | None => path,
        Some(dot) => &path[..name_start + dot],
    }
}

/// Whether `needle` occurs in `haystack` delimited by `/` or the ends of the string on both sides,
/// i.e. as a whole run of path segments.
pub fn contains_segments(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, matched)| {
        let end = start + matched.len();
        let open = start == 0 || haystack[..start].ends_with('/');
        let close = end == haystack.len() || haystack[end..].starts_with('/');
        open && close
    })
}

/// Render a relative OS path with `/` separators.
pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    os_path_ref
        .as_ref()
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
            Component::ParentDir => Some(Cow::from("..")),
        })
        .collect::<Vec<_>>()
        .join("/")
}
