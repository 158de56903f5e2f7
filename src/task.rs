//! Build rules.
//!
//! A [`Task`] pairs a request pattern (which requests it applies to) with a source pattern (where
//! on disk its inputs live) and an ordered pipeline of [`PluginSpec`]s. Tasks are kept in
//! registration order in a [`TaskRegistry`]; every task whose request pattern matches a request
//! contributes its pipeline, in that order.

use globset::{Glob, GlobBuilder, GlobMatcher};

use crate::{
    alias::AliasTable,
    error::ForgeError,
    plugin::{Arity, Plugin, PluginSpec},
};

/// Compile a glob the way request and source patterns are interpreted: `*` stays within one path
/// segment and `**` spans segments.
pub(crate) fn build_glob(pattern: &str) -> Result<Glob, ForgeError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| ForgeError::Pattern(format!("'{pattern}': {e}")))
}

#[derive(Debug, Clone)]
pub struct Task {
    request_pattern: String,
    request_matcher: GlobMatcher,
    source_pattern: String,
    source_glob: Glob,
    plugins: Vec<PluginSpec>,
}

impl Task {
    /// Create a task for `pattern`. The request pattern gets alias expansion; the default source
    /// pattern is `pattern` as written.
    pub fn new(pattern: &str, aliases: &AliasTable) -> Result<Task, ForgeError> {
        let pattern = pattern.trim_matches('/');
        let request_pattern = aliases.expand(pattern);
        tracing::debug!("Registering task {pattern:?} as {request_pattern:?}");
        let request_matcher = build_glob(&request_pattern)?.compile_matcher();
        let source_glob = build_glob(pattern)?;
        Ok(Task {
            request_pattern,
            request_matcher,
            source_pattern: pattern.to_string(),
            source_glob,
            plugins: Vec::new(),
        })
    }

    /// Override the glob used to locate source files, relative to the server root.
    pub fn src(&mut self, glob: &str) -> Result<&mut Self, ForgeError> {
        let glob = glob.trim_start_matches('/');
        self.source_glob = build_glob(glob)?;
        self.source_pattern = glob.to_string();
        Ok(self)
    }

    /// Append a pipeline step bound to `args`.
    pub fn use_plugin<I, S>(&mut self, plugin: Plugin, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plugins.push(PluginSpec::new(plugin, args));
        self
    }

    /// Append a pipeline step only if `condition` holds.
    pub fn when<I, S>(&mut self, condition: bool, plugin: Plugin, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if condition {
            self.use_plugin(plugin, args)
        } else {
            self
        }
    }

    pub fn matches(&self, request_path: &str) -> bool {
        self.request_matcher.is_match(request_path)
    }

    pub fn request_pattern(&self) -> &str {
        &self.request_pattern
    }

    pub fn source_pattern(&self) -> &str {
        &self.source_pattern
    }

    pub(crate) fn source_glob(&self) -> &Glob {
        &self.source_glob
    }

    pub fn plugins(&self) -> &[PluginSpec] {
        &self.plugins
    }

    /// [`Arity::Multi`] when the pipeline contains a merge step and can therefore accept several
    /// source files.
    pub fn arity(&self) -> Arity {
        if self
            .plugins
            .iter()
            .any(|spec| spec.plugin.arity() == Arity::Multi)
        {
            Arity::Multi
        } else {
            Arity::Single
        }
    }
}

/// Ordered collection of tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        TaskRegistry::default()
    }

    pub fn register(&mut self, pattern: &str, aliases: &AliasTable) -> Result<&mut Task, ForgeError> {
        let task = Task::new(pattern, aliases)?;
        self.tasks.push(task);
        let idx = self.tasks.len() - 1;
        Ok(&mut self.tasks[idx])
    }

    /// Tasks whose request pattern matches `request_path`, in registration order.
    pub fn matching(&self, request_path: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.matches(request_path))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Concat;
    use test_log::test;

    #[test]
    fn test_request_pattern_is_alias_expanded() {
        let aliases = AliasTable::with_defaults();
        let task = Task::new("**/*.css", &aliases).unwrap();
        assert_eq!(task.request_pattern(), "**/*.{css,scss,sass,less}");
        assert_eq!(task.source_pattern(), "**/*.css");
        assert!(task.matches("styles.css"));
        assert!(task.matches("styles.scss"));
        assert!(task.matches("css/another.css"));
        assert!(!task.matches("index.js"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let task = Task::new("*.css", &AliasTable::new()).unwrap();
        assert!(task.matches("styles.css"));
        assert!(!task.matches("css/another.css"));
    }

    #[test]
    fn test_src_overrides_source_pattern() {
        let mut task = Task::new("libraries.js", &AliasTable::with_defaults()).unwrap();
        task.src("/js/libraries/*.js").unwrap();
        assert_eq!(task.source_pattern(), "js/libraries/*.js");
        assert_eq!(task.request_pattern(), "libraries.{js,coffee}");
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let err = Task::new("a[.js", &AliasTable::new()).unwrap_err();
        assert!(matches!(err, ForgeError::Pattern(_)));
    }

    #[test]
    fn test_when_and_arity() {
        let mut task = Task::new("libraries.js", &AliasTable::new()).unwrap();
        let noop = Plugin::from_fn("noop", |file, _| Ok(file));
        task.when(false, noop.clone(), Vec::<String>::new());
        assert!(task.plugins().is_empty());
        task.when(true, noop, Vec::<String>::new());
        assert_eq!(task.plugins().len(), 1);
        assert_eq!(task.arity(), Arity::Single);
        task.use_plugin(Plugin::merge(Concat::default()), ["libraries.js"]);
        assert_eq!(task.arity(), Arity::Multi);
    }

    #[test]
    fn test_registry_matches_in_registration_order() {
        let aliases = AliasTable::with_defaults();
        let mut registry = TaskRegistry::new();
        registry.register("**/*.css", &aliases).unwrap();
        registry.register("index.js", &aliases).unwrap();
        registry.register("*.css", &aliases).unwrap();

        let matched = registry.matching("styles.css");
        let patterns: Vec<&str> = matched.iter().map(|t| t.source_pattern()).collect();
        assert_eq!(patterns, vec!["**/*.css", "*.css"]);
        assert!(registry.matching("yo/hi.js").is_empty());
        assert_eq!(registry.len(), 3);
    }
}
