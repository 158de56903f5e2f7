//! Server configuration.
//!
//! [`ServerConfig`] carries the directories a server works in. [`ForgeConfig`] is the TOML file
//! format used by the `forge` binary to declare aliases, tasks and plugins without writing Rust:
//!
//! ```toml
//! [server]
//! root = "assets"
//!
//! [aliases]
//! css = ["scss"]
//!
//! [[tasks]]
//! request = "**/*.css"
//! source = "**/*.scss"
//! plugins = [{ command = "sassc", args = ["--stdin"] }]
//!
//! [[tasks]]
//! request = "libraries.js"
//! source = "js/libraries/*.js"
//! plugins = [{ concat = { name = "libraries.js" } }]
//! ```

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::read_to_string,
    path::{Path, PathBuf},
};

use crate::{
    error::ForgeError,
    plugin::{CommandTransform, Concat, Plugin},
    server::AssetServer,
};

/// Default cache directory name under the root.
pub const CACHE_DIR_NAME: &str = ".cache";
/// Default compiler dependency directory name under the root.
pub const DEPENDENCIES_DIR_NAME: &str = ".dependencies";
/// Environment variables consulted, in order, for `when` conditions.
pub const ENV_VARS: [&str; 2] = ["FORGE_ENV", "NODE_ENV"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub dependencies_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ServerConfig {
            root: root.into(),
            cache_dir: None,
            dependencies_dir: None,
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_dependencies_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dependencies_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.root.as_os_str().is_empty() {
            return Err(ForgeError::Config("root must be set".to_string()));
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.root.join(CACHE_DIR_NAME))
    }

    pub fn dependencies_dir(&self) -> PathBuf {
        self.dependencies_dir
            .clone()
            .unwrap_or_else(|| self.root.join(DEPENDENCIES_DIR_NAME))
    }

    /// Resolve relative directories against `base`.
    fn rebase(mut self, base: &Path) -> Self {
        self.root = base.join(&self.root);
        self.cache_dir = self.cache_dir.map(|dir| base.join(dir));
        self.dependencies_dir = self.dependencies_dir.map(|dir| base.join(dir));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatOptions {
    /// Logical file name of the merged output.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub separator: Option<String>,
}

/// One pipeline step. Exactly one of `command` or `concat` must be given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginEntry {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub concat: Option<ConcatOptions>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Only register this step when the environment (see [`ENV_VARS`]) equals this value.
    #[serde(default)]
    pub when: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskEntry {
    pub request: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgeConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

/// The current environment name, from the first set variable in [`ENV_VARS`].
pub fn current_env() -> Option<String> {
    ENV_VARS.iter().find_map(|var| std::env::var(var).ok())
}

impl ForgeConfig {
    /// Read a config file. Relative directories in it are resolved against the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ForgeConfig, ForgeError> {
        let path = path.as_ref();
        tracing::debug!("Reading configuration from {:?}", path);
        let content = read_to_string(path)
            .map_err(|e| ForgeError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = ForgeConfig::parse(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(ForgeConfig {
            server: config.server.rebase(base),
            ..config
        })
    }

    pub fn parse(content: &str) -> Result<ForgeConfig, ForgeError> {
        let config: ForgeConfig = toml::from_str(content)?;
        config.server.validate()?;
        Ok(config)
    }

    /// Register everything this config declares on a new server.
    pub fn build(&self, env: Option<&str>) -> Result<AssetServer, ForgeError> {
        let mut server = AssetServer::new(self.server.clone())?;
        server.merge_aliases(&self.aliases);

        for entry in self.plugins.iter() {
            if let Some(plugin) = self.plugin(entry, env)? {
                server.use_plugin(plugin, entry.args.clone());
            }
        }
        for task_entry in self.tasks.iter() {
            let mut steps = Vec::with_capacity(task_entry.plugins.len());
            for entry in task_entry.plugins.iter() {
                if let Some(plugin) = self.plugin(entry, env)? {
                    steps.push((plugin, plugin_args(entry)));
                }
            }
            let task = server.task(&task_entry.request)?;
            if let Some(source) = &task_entry.source {
                task.src(source)?;
            }
            for (plugin, args) in steps {
                task.use_plugin(plugin, args);
            }
        }
        tracing::debug!(
            "Configured {} tasks and {} global plugins",
            server.tasks().len(),
            server.global_plugins().len()
        );
        Ok(server)
    }

    fn plugin(&self, entry: &PluginEntry, env: Option<&str>) -> Result<Option<Plugin>, ForgeError> {
        if let Some(expected) = &entry.when {
            if env != Some(expected.as_str()) {
                return Ok(None);
            }
        }
        match (&entry.command, &entry.concat) {
            (Some(program), None) => Ok(Some(Plugin::transform(
                CommandTransform::new(program)
                    .working_dir(self.server.root.clone())
                    .dependencies_dir(self.server.dependencies_dir()),
            ))),
            (None, Some(options)) => {
                let concat = match &options.separator {
                    Some(separator) => Concat::with_separator(separator.as_bytes()),
                    None => Concat::default(),
                };
                Ok(Some(Plugin::merge(concat)))
            }
            _ => Err(ForgeError::Config(format!(
                "a plugin entry needs exactly one of `command` or `concat`: {entry:?}"
            ))),
        }
    }
}

fn plugin_args(entry: &PluginEntry) -> Vec<String> {
    match entry.concat.as_ref().and_then(|c| c.name.clone()) {
        Some(name) => std::iter::once(name).chain(entry.args.iter().cloned()).collect(),
        None => entry.args.clone(),
    }
}
