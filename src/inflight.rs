//! Deduplication of concurrent builds.
//!
//! The first request to find a stale artifact becomes the build *leader* for that output path and
//! registers a completion signal. Requests arriving while the build runs become *followers* and
//! wait on that signal instead of compiling again. The entry is removed when the leader finishes,
//! fails, or is dropped, so a later request can always start a fresh build.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::watch;

use crate::error::ForgeError;

pub type BuildResult = Result<PathBuf, ForgeError>;

type Signal = watch::Receiver<Option<BuildResult>>;

#[derive(Debug, Default, Clone)]
pub struct InFlight(Arc<Mutex<HashMap<PathBuf, Signal>>>);

pub enum Claim {
    Leader(BuildGuard),
    Follower(Follower),
}

impl InFlight {
    pub fn new() -> Self {
        InFlight::default()
    }

    /// Become the leader for `output`, or a follower of the build already running for it.
    pub fn claim(&self, output: &Path) -> Claim {
        let mut map = self.0.lock();
        if let Some(rx) = map.get(output) {
            return Claim::Follower(Follower(rx.clone()));
        }
        let (tx, rx) = watch::channel(None);
        map.insert(output.to_path_buf(), rx);
        Claim::Leader(BuildGuard {
            output: output.to_path_buf(),
            tx,
            map: self.0.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Held by the leading build. Dropping it, with or without [`finish`](BuildGuard::finish),
/// clears the in-flight entry.
pub struct BuildGuard {
    output: PathBuf,
    tx: watch::Sender<Option<BuildResult>>,
    map: Arc<Mutex<HashMap<PathBuf, Signal>>>,
}

impl BuildGuard {
    /// Publish the build result to every follower.
    pub fn finish(self, result: BuildResult) {
        // No receivers left is fine: nobody was waiting.
        let _ = self.tx.send(Some(result));
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.map.lock().remove(&self.output);
    }
}

pub struct Follower(Signal);

impl Follower {
    /// The leader's result, or `None` if the leader went away without finishing.
    pub async fn wait(mut self) -> Option<BuildResult> {
        let result = match self.0.wait_for(|result| result.is_some()).await {
            Ok(result) => result.clone(),
            Err(_) => None,
        };
        result
    }
}
