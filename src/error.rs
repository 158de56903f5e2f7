use std::{io, path::StripPrefixError};

use globset::Error as GlobError;
use http::status::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ForgeError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Access outside of the asset root is forbidden: {0}")]
    Forbidden(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Asset Not Found: {0}")]
    NotFound(String),
    #[error("Invalid glob pattern: {0}")]
    Pattern(String),
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Plugin '{plugin}' failed: {message}")]
    TransformFailed { plugin: String, message: String },
}

impl ForgeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForgeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForgeError::Forbidden(_) => StatusCode::FORBIDDEN,
            ForgeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForgeError::NotFound(_) => StatusCode::NOT_FOUND,
            ForgeError::Pattern(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForgeError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForgeError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForgeError::TransformFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Only filesystem failures are worth retrying. A failed transform would fail again on the
    /// same source content.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ForgeError::Io(_))
    }

    pub fn transform<P: Into<String>, M: Into<String>>(plugin: P, message: M) -> Self {
        ForgeError::TransformFailed {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Name of the plugin that produced this error, if it came out of a pipeline step.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            ForgeError::TransformFailed { plugin, .. } => Some(plugin),
            _ => None,
        }
    }
}

impl From<StripPrefixError> for ForgeError {
    fn from(src: StripPrefixError) -> ForgeError {
        ForgeError::Forbidden(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for ForgeError {
    fn from(src: toml::de::Error) -> ForgeError {
        ForgeError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for ForgeError {
    fn from(src: JsonError) -> ForgeError {
        ForgeError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<GlobError> for ForgeError {
    fn from(src: GlobError) -> ForgeError {
        ForgeError::Pattern(format!("{src}"))
    }
}

impl From<walkdir::Error> for ForgeError {
    fn from(src: walkdir::Error) -> ForgeError {
        let path = src.path().map(|p| p.display().to_string()).unwrap_or_default();
        match src.into_io_error() {
            Some(io_error) => ForgeError::Io(format!("{path}: {io_error}")),
            None => ForgeError::Io(format!("filesystem loop detected at {path}")),
        }
    }
}

// io::ErrorKind::NotFound stays Io: a source vanishing mid-request is a race, not a missing asset.
impl From<io::Error> for ForgeError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::PermissionDenied => {
                ForgeError::Io(format!("Permission denied: {x}"))
            }
            _ => ForgeError::Io(format!("IOError ({}): {x}", x.kind())),
        }
    }
}
