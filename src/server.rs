//! Request orchestration.
//!
//! An [`AssetServer`] owns the alias table, the task registry, the server-wide plugins and the
//! directories it works in. Setup (`alias`, `task`, `use_plugin`) takes `&mut self`; once set up,
//! the server is shared behind an `Arc` and [`AssetServer::serve`] handles requests concurrently.
//!
//! ## Request Flow
//!
//! ```text
//! RECEIVED -> MATCHING -> RESOLVING -> CACHED              -> DONE
//!                 |           |     \-> COMPILING -> WRITING -> DONE
//!                 |           |              |           |
//!                 \-----------+--------------+-----------+---> FAILED
//! ```
//!
//! Each request is handled independently. Two requests for the same stale output share a single
//! compile: the first one builds, the others wait for its result.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    alias::AliasTable,
    cache::CacheWriter,
    config::ServerConfig,
    error::ForgeError,
    inflight::{Claim, InFlight},
    pipeline::Pipeline,
    plugin::{AssetFile, Plugin, PluginSpec},
    request::RequestPath,
    resolver::{Resolution, Resolver},
    task::{Task, TaskRegistry},
};

/// Where a request is in its lifecycle. Used for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Matching,
    Resolving,
    Cached,
    Compiling,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "RECEIVED",
            Stage::Matching => "MATCHING",
            Stage::Resolving => "RESOLVING",
            Stage::Cached => "CACHED",
            Stage::Compiling => "COMPILING",
            Stage::Writing => "WRITING",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A successfully handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub request: RequestPath,
    /// Absolute location of the artifact in the cache directory.
    pub path: PathBuf,
    /// `true` when the artifact was already fresh and no pipeline ran.
    pub cached: bool,
}

#[derive(Debug)]
pub struct AssetServer {
    config: ServerConfig,
    aliases: AliasTable,
    tasks: TaskRegistry,
    global: Vec<PluginSpec>,
    resolver: Resolver,
    writer: CacheWriter,
    inflight: InFlight,
}

impl AssetServer {
    pub fn new(config: ServerConfig) -> Result<AssetServer, ForgeError> {
        config.validate()?;
        let cache_dir = config.cache_dir();
        let resolver = Resolver::new(
            config.root.clone(),
            cache_dir.clone(),
            config.dependencies_dir(),
        );
        tracing::debug!(
            "Serving assets from {:?}, caching in {:?}",
            config.root,
            cache_dir
        );
        Ok(AssetServer {
            config,
            aliases: AliasTable::with_defaults(),
            tasks: TaskRegistry::new(),
            global: Vec::new(),
            resolver,
            writer: CacheWriter::new(cache_dir),
            inflight: InFlight::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn global_plugins(&self) -> &[PluginSpec] {
        &self.global
    }

    /// Declare `equivalent` as a source extension for requests ending in `extension`. Only tasks
    /// registered afterwards see the new alias.
    pub fn alias(&mut self, extension: &str, equivalent: &str) -> &mut Self {
        self.aliases.alias(extension, equivalent);
        self
    }

    pub fn merge_aliases<I, K, V, S>(&mut self, mapping: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.aliases.merge(mapping);
        self
    }

    /// Register a task for `pattern` and return it for configuration.
    pub fn task(&mut self, pattern: &str) -> Result<&mut Task, ForgeError> {
        self.tasks.register(pattern, &self.aliases)
    }

    /// Alias of [`task`](Self::task).
    pub fn get(&mut self, pattern: &str) -> Result<&mut Task, ForgeError> {
        self.task(pattern)
    }

    /// Append a plugin that runs first for every request, ahead of any task plugins.
    pub fn use_plugin<I, S>(&mut self, plugin: Plugin, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global.push(PluginSpec::new(plugin, args));
        self
    }

    /// Remove every cached artifact.
    pub async fn clear_cache(&self) -> Result<(), ForgeError> {
        self.writer.clear().await
    }

    /// Produce the artifact for `raw_path`, compiling it if the cached copy is missing or stale.
    #[tracing::instrument(skip_all, fields(request = raw_path))]
    pub async fn serve(&self, raw_path: &str) -> Result<Served, ForgeError> {
        tracing::trace!("{}", Stage::Received);
        let result = self.handle(raw_path).await;
        match &result {
            Ok(served) => tracing::debug!(
                "{} {} ({})",
                Stage::Done,
                served.path.display(),
                if served.cached { "cached" } else { "compiled" }
            ),
            Err(e) => tracing::debug!("{}: {e}", Stage::Failed),
        }
        result
    }

    async fn handle(&self, raw_path: &str) -> Result<Served, ForgeError> {
        let request = RequestPath::parse(raw_path)?;
        if request.as_str().split('/').any(|s| s.starts_with('.')) {
            return Err(ForgeError::NotFound(format!("{request} is hidden")));
        }
        if tokio::fs::metadata(request.under(&self.config.root))
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            return Err(ForgeError::NotFound(format!("{request} is a directory")));
        }

        tracing::trace!("{}", Stage::Matching);
        let matched = self.tasks.matching(request.as_str());
        if matched.is_empty() {
            tracing::debug!("No tasks matching request {request}");
            return Err(ForgeError::NotFound(format!("no task matches {request}")));
        }

        tracing::trace!("{} with {} tasks", Stage::Resolving, matched.len());
        match self.resolver.resolve(&request, &matched).await? {
            Resolution::NotFound => Err(ForgeError::NotFound(format!(
                "no source file for {request}"
            ))),
            Resolution::Cached { output } => {
                tracing::debug!("{}: using cached {}", Stage::Cached, output.display());
                Ok(Served {
                    request,
                    path: output,
                    cached: true,
                })
            }
            Resolution::Stale { output, sources } => {
                let (path, cached) = self.build_once(&request, &matched, output, sources).await?;
                Ok(Served {
                    request,
                    path,
                    cached,
                })
            }
        }
    }

    /// Compile as the leader for `output`, or wait for the build already running for it. Returns
    /// the artifact path and whether it turned out to be fresh without compiling.
    async fn build_once(
        &self,
        request: &RequestPath,
        tasks: &[&Task],
        output: PathBuf,
        sources: Vec<PathBuf>,
    ) -> Result<(PathBuf, bool), ForgeError> {
        let absolute: Vec<PathBuf> = sources
            .iter()
            .map(|source| self.config.root.join(source))
            .collect();
        loop {
            match self.inflight.claim(&output) {
                Claim::Leader(guard) => {
                    // A previous leader may have finished between resolution and this claim.
                    if self.resolver.is_fresh(&output, &absolute).await? {
                        tracing::debug!("{}: using cached {}", Stage::Cached, output.display());
                        guard.finish(Ok(output.clone()));
                        return Ok((output, true));
                    }
                    let result = self.compile(request, tasks, &output, &sources).await;
                    guard.finish(result.clone());
                    return result.map(|path| (path, false));
                }
                Claim::Follower(follower) => {
                    tracing::debug!("Waiting for in-flight build of {}", output.display());
                    if let Some(result) = follower.wait().await {
                        return result.map(|path| (path, false));
                    }
                    // The leader was cancelled before finishing; try to lead.
                }
            }
        }
    }

    async fn compile(
        &self,
        request: &RequestPath,
        tasks: &[&Task],
        output: &Path,
        sources: &[PathBuf],
    ) -> Result<PathBuf, ForgeError> {
        let pipeline = Pipeline::assemble(&self.global, tasks);
        pipeline.accepts(sources.len())?;
        tracing::debug!(
            "{} {request} from {:?} via [{}]",
            Stage::Compiling,
            sources,
            pipeline.step_names().join(", ")
        );

        let mut files = Vec::with_capacity(sources.len());
        for source in sources {
            let contents = tokio::fs::read(self.config.root.join(source)).await?;
            files.push(AssetFile::new(source.clone(), contents));
        }
        let artifact = pipeline.run(files).await?;

        tracing::trace!("{} {} bytes", Stage::Writing, artifact.contents.len());
        let written = self.writer.write(&artifact.contents, output).await?;
        tracing::info!("Compiled {request}");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_log::test;

    fn server(root: &Path) -> AssetServer {
        AssetServer::new(ServerConfig::new(root)).unwrap()
    }

    #[test]
    fn test_setup_chaining() {
        let tmp = TempDir::new().unwrap();
        let mut server = server(tmp.path());
        server.alias("js", "ts").alias(".js", "jsx");
        server
            .get("**/*.js")
            .unwrap()
            .use_plugin(Plugin::from_fn("noop", |f, _| Ok(f)), Vec::<String>::new());
        server.use_plugin(Plugin::from_fn("banner", |f, _| Ok(f)), ["/* hi */"]);

        assert_eq!(
            server.aliases().get("js").unwrap(),
            &["coffee".to_string(), "ts".to_string(), "jsx".to_string()]
        );
        assert_eq!(server.tasks().len(), 1);
        assert_eq!(
            server.tasks().iter().next().unwrap().request_pattern(),
            "**/*.{js,coffee,ts,jsx}"
        );
        assert_eq!(server.global_plugins()[0].args, vec!["/* hi */".to_string()]);
    }

    #[test(tokio::test)]
    async fn test_unmatched_request_is_not_found() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("index.js"), "x").unwrap();
        let server = server(tmp.path());
        let err = server.serve("/index.js").await.unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
    }

    #[test(tokio::test)]
    async fn test_hidden_and_directory_requests_are_not_found() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("css")).unwrap();
        std::fs::write(tmp.path().join("css/a.css"), "x").unwrap();
        std::fs::write(tmp.path().join(".env"), "x").unwrap();
        let mut server = server(tmp.path());
        server.task("**").unwrap();

        for path in ["/css", "/.env", "/css/.a.css"] {
            let err = server.serve(path).await.unwrap_err();
            assert!(matches!(err, ForgeError::NotFound(_)), "{path}: {err:?}");
        }
        let err = server.serve("/../etc/passwd").await.unwrap_err();
        assert!(matches!(err, ForgeError::Forbidden(_)));
    }

    #[test(tokio::test)]
    async fn test_pass_through_then_cached() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("passthrough.js"), "let hi = 5;").unwrap();
        let mut server = server(tmp.path());
        server.task("passthrough.js").unwrap();

        let first = server.serve("/passthrough.js").await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.path, tmp.path().join(".cache/passthrough.js"));
        assert_eq!(std::fs::read_to_string(&first.path).unwrap(), "let hi = 5;");

        let second = server.serve("passthrough.js").await.unwrap();
        assert!(second.cached);
        assert_eq!(second.path, first.path);
    }
}
