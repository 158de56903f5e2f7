//! Pipeline assembly and execution.
//!
//! The steps applied to a request are the server-wide plugins followed by the plugins of every
//! matched task, in task registration order and then in each task's own order. A matched task with
//! no plugins contributes nothing, so a request matched only by such tasks passes its source
//! through unchanged.
//!
//! While the pipeline holds several files (a multi-source request before its merge step), each
//! single-file transform is applied to every file in turn. A [`Merge`](crate::plugin::Merge) step
//! collapses the set into one file.

use crate::{
    error::ForgeError,
    plugin::{Arity, AssetFile, Plugin, PluginSpec},
    task::Task,
};

#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<PluginSpec>,
    arity: Arity,
}

impl Pipeline {
    pub fn assemble(global: &[PluginSpec], tasks: &[&Task]) -> Pipeline {
        let steps = global
            .iter()
            .chain(tasks.iter().flat_map(|task| task.plugins().iter()))
            .cloned()
            .collect();
        let merges = global.iter().any(|spec| spec.plugin.arity() == Arity::Multi)
            || tasks.iter().any(|task| task.arity() == Arity::Multi);
        let arity = if merges { Arity::Multi } else { Arity::Single };
        Pipeline { steps, arity }
    }

    pub fn steps(&self) -> &[PluginSpec] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Check that this pipeline can turn `source_count` files into one artifact.
    pub fn accepts(&self, source_count: usize) -> Result<(), ForgeError> {
        match (source_count, self.arity()) {
            (0, _) => Err(ForgeError::Pipeline("no source files to compile".to_string())),
            (1, _) | (_, Arity::Multi) => Ok(()),
            (n, Arity::Single) => Err(ForgeError::Pipeline(format!(
                "{n} source files resolved but the pipeline [{}] has no merge step",
                self.step_names().join(", ")
            ))),
        }
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|spec| spec.name()).collect()
    }

    /// Run every step in order. The first failing step aborts the run with
    /// [`ForgeError::TransformFailed`] naming that step's plugin.
    pub async fn run(&self, sources: Vec<AssetFile>) -> Result<AssetFile, ForgeError> {
        self.accepts(sources.len())?;
        let mut files = sources;
        for spec in self.steps.iter() {
            files = match &spec.plugin {
                Plugin::Transform(transform) => {
                    let mut out = Vec::with_capacity(files.len());
                    for file in files {
                        tracing::trace!("[{}] {:?}", spec.name(), file.path);
                        let file = transform
                            .transform(file, &spec.args)
                            .await
                            .map_err(|e| attribute(spec, e))?;
                        out.push(file);
                    }
                    out
                }
                Plugin::Merge(merge) => {
                    tracing::trace!("[{}] merging {} files", spec.name(), files.len());
                    let merged = merge
                        .merge(files, &spec.args)
                        .await
                        .map_err(|e| attribute(spec, e))?;
                    vec![merged]
                }
            };
        }

        let count = files.len();
        match files.pop() {
            Some(file) if count == 1 => Ok(file),
            _ => Err(ForgeError::Pipeline(format!(
                "pipeline finished with {count} files instead of one"
            ))),
        }
    }
}

fn attribute(spec: &PluginSpec, err: ForgeError) -> ForgeError {
    let message = match err {
        ForgeError::TransformFailed { message, .. } => message,
        other => other.to_string(),
    };
    ForgeError::transform(spec.name(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alias::AliasTable, plugin::Concat};
    use test_log::test;

    fn tag(marker: &'static str) -> Plugin {
        Plugin::from_fn(marker, move |mut file: AssetFile, _: &[String]| {
            file.contents.extend_from_slice(marker.as_bytes());
            Ok(file)
        })
    }

    fn failing(name: &'static str) -> Plugin {
        Plugin::from_fn(name, |_: AssetFile, _: &[String]| {
            Err(ForgeError::Io("compiler crashed".to_string()))
        })
    }

    fn task(pattern: &str) -> Task {
        Task::new(pattern, &AliasTable::new()).unwrap()
    }

    #[test(tokio::test)]
    async fn test_global_then_task_order() {
        let mut first = task("*.js");
        first.use_plugin(tag("[1]"), Vec::<String>::new());
        first.use_plugin(tag("[2]"), Vec::<String>::new());
        let mut second = task("a.js");
        second.use_plugin(tag("[3]"), Vec::<String>::new());
        let global = vec![PluginSpec::new(tag("[g]"), Vec::<String>::new())];

        let pipeline = Pipeline::assemble(&global, &[&first, &second]);
        assert_eq!(pipeline.step_names(), vec!["[g]", "[1]", "[2]", "[3]"]);
        let out = pipeline.run(vec![AssetFile::new("a.js", "src")]).await.unwrap();
        assert_eq!(out.text(), "src[g][1][2][3]");
    }

    #[test(tokio::test)]
    async fn test_empty_pipeline_passes_through() {
        let passthrough = task("passthrough.js");
        let pipeline = Pipeline::assemble(&[], &[&passthrough]);
        assert!(pipeline.is_empty());
        let source = AssetFile::new("passthrough.js", vec![0u8, 159, 146, 150]);
        assert_eq!(pipeline.run(vec![source.clone()]).await.unwrap(), source);
    }

    #[test(tokio::test)]
    async fn test_transforms_apply_per_file_before_merge() {
        let mut libs = task("libraries.js");
        libs.use_plugin(tag(";"), Vec::<String>::new());
        libs.use_plugin(Plugin::merge(Concat::default()), ["libraries.js"]);
        libs.use_plugin(tag("!"), Vec::<String>::new());

        let pipeline = Pipeline::assemble(&[], &[&libs]);
        let out = pipeline
            .run(vec![
                AssetFile::new("js/libraries/a.js", "a"),
                AssetFile::new("js/libraries/b.js", "b"),
            ])
            .await
            .unwrap();
        assert_eq!(out.text(), "a;\nb;!");
    }

    #[test(tokio::test)]
    async fn test_multiple_sources_need_a_merge_step() {
        let mut single = task("a.js");
        single.use_plugin(tag("x"), Vec::<String>::new());
        let pipeline = Pipeline::assemble(&[], &[&single]);
        let err = pipeline
            .run(vec![AssetFile::new("a.js", ""), AssetFile::new("lib/a.js", "")])
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Pipeline(_)));
        assert!(pipeline.accepts(1).is_ok());
        assert!(pipeline.accepts(0).is_err());
    }

    #[test]
    fn test_arity_comes_from_any_merging_task_or_global_step() {
        let plain = task("libraries.js");
        let mut merging = task("libraries.js");
        merging.use_plugin(Plugin::merge(Concat::default()), ["libraries.js"]);
        let global_merge = vec![PluginSpec::new(
            Plugin::merge(Concat::default()),
            ["libraries.js"],
        )];

        assert_eq!(Pipeline::assemble(&[], &[&plain]).arity(), Arity::Single);
        assert_eq!(
            Pipeline::assemble(&[], &[&plain, &merging]).arity(),
            Arity::Multi
        );
        assert_eq!(Pipeline::assemble(&global_merge, &[&plain]).arity(), Arity::Multi);
        assert!(Pipeline::assemble(&[], &[&plain, &merging]).accepts(2).is_ok());
    }

    #[test(tokio::test)]
    async fn test_failure_names_the_failing_plugin() {
        let mut styles = task("*.css");
        styles.use_plugin(tag("ok"), Vec::<String>::new());
        styles.use_plugin(failing("sass"), Vec::<String>::new());
        let mut scripts = task("*.css");
        scripts.use_plugin(failing("coffee"), Vec::<String>::new());

        let err = Pipeline::assemble(&[], &[&styles, &scripts])
            .run(vec![AssetFile::new("a.css", "")])
            .await
            .unwrap_err();
        assert_eq!(err.plugin(), Some("sass"));

        let err = Pipeline::assemble(&[], &[&scripts])
            .run(vec![AssetFile::new("a.css", "")])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ForgeError::transform("coffee", "File System error: compiler crashed")
        );
    }
}
