use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::ForgeError;

/// Persists compiled artifacts under the cache directory.
///
/// Content is written to a uniquely named temporary file next to its destination and renamed into
/// place, so a concurrent reader sees either the previous artifact or the complete new one.
#[derive(Debug, Clone)]
pub struct CacheWriter {
    cache_dir: PathBuf,
}

impl CacheWriter {
    pub fn new(cache_dir: PathBuf) -> Self {
        CacheWriter { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Write `contents` to `output`, creating intermediate directories. Returns the final path.
    pub async fn write(&self, contents: &[u8], output: &Path) -> Result<PathBuf, ForgeError> {
        if !output.starts_with(&self.cache_dir) || output == self.cache_dir {
            return Err(ForgeError::Forbidden(format!(
                "{} is not inside the cache directory {}",
                output.display(),
                self.cache_dir.display()
            )));
        }
        let (Some(parent), Some(file_name)) = (output.parent(), output.file_name()) else {
            return Err(ForgeError::Io(format!(
                "cache path {} has no file name",
                output.display()
            )));
        };
        tokio::fs::create_dir_all(parent).await?;

        let tmp = parent.join(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            Uuid::new_v4().simple()
        ));
        if let Err(e) = write_file(&tmp, contents).await {
            discard(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, output).await {
            discard(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!("Cached {} bytes at {}", contents.len(), output.display());
        Ok(output.to_path_buf())
    }

    /// Remove every cached artifact.
    pub async fn clear(&self) -> Result<(), ForgeError> {
        match tokio::fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    Ok(())
}

async fn discard(tmp: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("Could not remove temporary cache file {}: {e}", tmp.display());
        }
    }
}
