use async_trait::async_trait;
use std::path::PathBuf;

use super::{AssetFile, Merge};
use crate::error::ForgeError;

/// Concatenates the ordered source set into one file.
///
/// The first bound argument, when present, renames the merged file's logical path (e.g.
/// `libraries.js`); otherwise the first source's path is kept.
#[derive(Debug, Clone)]
pub struct Concat {
    separator: Vec<u8>,
}

impl Default for Concat {
    fn default() -> Self {
        Concat::with_separator("\n")
    }
}

impl Concat {
    pub fn with_separator(separator: impl Into<Vec<u8>>) -> Self {
        Concat {
            separator: separator.into(),
        }
    }
}

#[async_trait]
impl Merge for Concat {
    fn name(&self) -> &str {
        "concat"
    }

    async fn merge(&self, files: Vec<AssetFile>, args: &[String]) -> Result<AssetFile, ForgeError> {
        let Some(first) = files.first() else {
            return Err(ForgeError::transform(self.name(), "no files to concatenate"));
        };
        let path = match args.first() {
            Some(name) => first
                .path
                .parent()
                .map(|parent| parent.join(name))
                .unwrap_or_else(|| PathBuf::from(name)),
            None => first.path.clone(),
        };

        let capacity = files.iter().map(|f| f.contents.len()).sum::<usize>()
            + self.separator.len() * files.len().saturating_sub(1);
        let mut contents = Vec::with_capacity(capacity);
        for (idx, file) in files.iter().enumerate() {
            if idx > 0 {
                contents.extend_from_slice(&self.separator);
            }
            contents.extend_from_slice(&file.contents);
        }
        Ok(AssetFile { path, contents })
    }
}
