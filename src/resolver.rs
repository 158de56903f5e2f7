//! Source resolution and cache freshness.
//!
//! Given a normalized request and the tasks that matched it, the [`Resolver`] locates the source
//! file(s) the request should be built from and decides whether the artifact already in the cache
//! can be served instead.
//!
//! ## Resolution Steps
//!
//! 1. Collect the distinct source patterns of the matched tasks, in order of first appearance
//! 2. Walk the source root (skipping hidden entries and the cache/dependency directories) and keep
//!    files matching any of those patterns, grouped by the first pattern they match. Links are
//!    followed only to files inside the root. Patterns without glob syntax are looked up directly
//!    and never walk the tree.
//! 3. Select candidates whose extension-stripped path equals the extension-stripped request. When
//!    none do, fall back to candidates containing the request stem as whole path segments, so that
//!    `libraries.js` finds `js/libraries/a.js` but `bar.js` never finds `foobar.js`
//! 4. No candidates: [`Resolution::NotFound`]
//! 5. The cached artifact lives at `<cache_dir>/<request>`. It is fresh when its modification time
//!    is not older than the newest selected source.

use globset::GlobSetBuilder;
use std::{
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};
use walkdir::{DirEntry, WalkDir};

use crate::{
    error::ForgeError,
    request::{contains_segments, os_path_to_string, strip_extension, RequestPath},
    task::Task,
};

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No source file backs this request.
    NotFound,
    /// The artifact at `output` is at least as new as every source.
    Cached { output: PathBuf },
    /// The artifact at `output` is missing or older than a source; `sources` (root-relative, in
    /// resolution order, never empty) must be compiled.
    Stale {
        output: PathBuf,
        sources: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
    cache_dir: PathBuf,
    dependencies_dir: PathBuf,
}

impl Resolver {
    pub fn new(root: PathBuf, cache_dir: PathBuf, dependencies_dir: PathBuf) -> Self {
        Resolver {
            root,
            cache_dir,
            dependencies_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Deterministic cache location of `request`.
    pub fn output_path(&self, request: &RequestPath) -> PathBuf {
        request.under(&self.cache_dir)
    }

    pub async fn resolve(
        &self,
        request: &RequestPath,
        tasks: &[&Task],
    ) -> Result<Resolution, ForgeError> {
        let candidates = self.candidates(tasks).await?;
        let sources = select_sources(request, candidates);
        if sources.is_empty() {
            tracing::debug!("Could not resolve {request}");
            return Ok(Resolution::NotFound);
        }

        let output = self.output_path(request);
        let source_paths: Vec<PathBuf> = sources.iter().map(|s| self.root.join(s)).collect();
        if self.is_fresh(&output, &source_paths).await? {
            Ok(Resolution::Cached { output })
        } else {
            Ok(Resolution::Stale {
                output,
                sources: sources.into_iter().map(PathBuf::from).collect(),
            })
        }
    }

    /// All source files under the root matching the tasks' source patterns, as `/`-separated
    /// root-relative paths. Symbolic links count when they point at a file inside the root.
    pub async fn candidates(&self, tasks: &[&Task]) -> Result<Vec<String>, ForgeError> {
        let mut patterns: Vec<String> = Vec::new();
        let mut builder = GlobSetBuilder::new();
        for task in tasks {
            if patterns.iter().any(|p| p == task.source_pattern()) {
                continue;
            }
            patterns.push(task.source_pattern().to_string());
            builder.add(task.source_glob().clone());
        }
        if patterns.is_empty() {
            return Ok(Vec::new());
        }
        let globs = builder.build()?;

        let root = self.root.clone();
        let excluded = [self.cache_dir.clone(), self.dependencies_dir.clone()];
        let walk = tokio::task::spawn_blocking(move || {
            if patterns.iter().all(|p| is_literal(p)) {
                return literal_candidates(&root, &excluded, &patterns);
            }
            let mut found: Vec<(usize, String)> = Vec::new();
            for entry in walk_sources(&root, &excluded, walk_depth(&patterns)) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) if e.depth() == 0 => return Err(ForgeError::from(e)),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable entry while globbing sources: {e}");
                        continue;
                    }
                };
                if !is_source_file(entry.path(), entry.file_type(), &root) {
                    continue;
                }
                let relative = os_path_to_string(entry.path().strip_prefix(&root)?);
                if let Some(first) = globs.matches(&relative).into_iter().min() {
                    found.push((first, relative));
                }
            }
            // Stable: walk order is kept within each pattern group.
            found.sort_by_key(|(pattern_idx, _)| *pattern_idx);
            Ok(found.into_iter().map(|(_, path)| path).collect::<Vec<_>>())
        });
        walk.await
            .map_err(|e| ForgeError::Io(format!("source glob walk did not complete: {e}")))?
    }

    /// Whether the artifact at `output` exists and is at least as new as every one of `sources`
    /// (absolute paths).
    pub(crate) async fn is_fresh(
        &self,
        output: &Path,
        sources: &[PathBuf],
    ) -> Result<bool, ForgeError> {
        let cached = match tokio::fs::metadata(output).await {
            Ok(meta) if meta.is_file() => meta.modified()?,
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let mut newest = SystemTime::UNIX_EPOCH;
        for source in sources {
            let modified = tokio::fs::metadata(source).await?.modified()?;
            newest = newest.max(modified);
        }
        Ok(cached >= newest)
    }
}

/// A pattern without glob syntax names exactly one path.
fn is_literal(pattern: &str) -> bool {
    !pattern.contains(['*', '?', '[', ']', '{', '}', '\\'])
}

/// Deepest walk level a set of patterns can match at, or `None` when a pattern spans directories.
fn walk_depth(patterns: &[String]) -> Option<usize> {
    if patterns.iter().any(|p| p.contains("**") || p.contains('[')) {
        return None;
    }
    patterns.iter().map(|p| p.split('/').count()).max()
}

/// Look literal patterns up directly, applying the same rules as the walk.
fn literal_candidates(
    root: &Path,
    excluded: &[PathBuf],
    patterns: &[String],
) -> Result<Vec<String>, ForgeError> {
    let canonical_root = std::fs::canonicalize(root)?;
    let mut found = Vec::new();
    for pattern in patterns {
        if pattern.split('/').any(|segment| segment.is_empty() || segment.starts_with('.')) {
            continue;
        }
        let path = root.join(pattern);
        if excluded.iter().any(|ex| path.starts_with(ex)) {
            continue;
        }
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if is_source_file(&path, meta.file_type(), root) => {
                // A linked directory along the way must not lead out of the root.
                match std::fs::canonicalize(&path) {
                    Ok(target) if target.starts_with(&canonical_root) => found.push(pattern.clone()),
                    _ => tracing::warn!("Skipping {path:?}: it resolves outside the source root"),
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(found)
}

/// Regular files, and symbolic links whose target is a regular file under `root`.
fn is_source_file(path: &Path, file_type: std::fs::FileType, root: &Path) -> bool {
    if file_type.is_file() {
        return true;
    }
    if !file_type.is_symlink() {
        return false;
    }
    let (Ok(target), Ok(root)) = (std::fs::canonicalize(path), std::fs::canonicalize(root)) else {
        tracing::debug!("Skipping dangling link {path:?}");
        return false;
    };
    if !target.starts_with(&root) {
        tracing::warn!("Skipping link {path:?}: target {target:?} is outside the source root");
        return false;
    }
    target.is_file()
}

fn walk_sources<'a>(
    root: &'a Path,
    excluded: &'a [PathBuf],
    max_depth: Option<usize>,
) -> impl Iterator<Item = Result<DirEntry, walkdir::Error>> + 'a {
    fn is_hidden(entry: &DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
    }
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }
    walker
        .into_iter()
        .filter_entry(move |e| {
            e.depth() == 0 || !(is_hidden(e) || excluded.iter().any(|ex| e.path().starts_with(ex)))
        })
}

/// Narrow `candidates` down to the sources of `request`: exact stem matches when any exist,
/// otherwise whole-segment containment matches.
pub fn select_sources(request: &RequestPath, candidates: Vec<String>) -> Vec<String> {
    let stem = request.stem();
    let (exact, rest): (Vec<String>, Vec<String>) = candidates
        .into_iter()
        .partition(|candidate| strip_extension(candidate) == stem);
    if !exact.is_empty() {
        return exact;
    }
    rest.into_iter()
        .filter(|candidate| contains_segments(strip_extension(candidate), stem))
        .collect()
}
