//! Extension aliasing.
//!
//! An alias declares that a request for `<name>.<ext>` may be served from a source with one of a
//! set of equivalent extensions, e.g. a request for `styles.css` compiled from `styles.scss`.
//! Task request patterns are rewritten once, at registration, so that a pattern ending in `.css`
//! becomes a brace alternation: `**/*.css` → `**/*.{css,scss,sass,less}`.

use std::collections::BTreeMap;

/// Mapping from an extension token (no leading dot) to its ordered, duplicate-free equivalents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable(BTreeMap<String, Vec<String>>);

fn trim_dot(ext: &str) -> &str {
    ext.trim_start_matches('.')
}

impl AliasTable {
    pub fn new() -> Self {
        AliasTable::default()
    }

    /// The aliases every server starts with.
    pub fn with_defaults() -> Self {
        let mut table = AliasTable::new();
        table
            .alias("css", "scss")
            .alias("css", "sass")
            .alias("css", "less")
            .alias("js", "coffee");
        table
    }

    /// Register `equivalent` as an acceptable source extension for requests ending in `extension`.
    /// Registering the same pair twice is a no-op.
    pub fn alias(&mut self, extension: &str, equivalent: &str) -> &mut Self {
        let extension = trim_dot(extension);
        let equivalent = trim_dot(equivalent);
        if extension.is_empty() || equivalent.is_empty() {
            tracing::warn!("Ignoring empty alias {extension:?} -> {equivalent:?}");
            return self;
        }
        let entry = self.0.entry(extension.to_string()).or_default();
        if !entry.iter().any(|e| e == equivalent) {
            entry.push(equivalent.to_string());
        }
        self
    }

    /// Bulk-merge a mapping of extension to equivalents.
    pub fn merge<I, K, V, S>(&mut self, mapping: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (extension, equivalents) in mapping {
            for equivalent in equivalents {
                self.alias(extension.as_ref(), equivalent.as_ref());
            }
        }
        self
    }

    pub fn get(&self, extension: &str) -> Option<&[String]> {
        self.0.get(trim_dot(extension)).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Rewrite a trailing `.ext` of `pattern` into a brace alternation of the extension and all of
    /// its registered equivalents. Patterns with no aliased trailing extension are returned as-is.
    ///
    /// The table is only read: expanding the same pattern any number of times yields the same
    /// alternation.
    pub fn expand(&self, pattern: &str) -> String {
        // The longest registered extension wins, so `min.js` is preferred over `js`.
        let matched = self
            .0
            .iter()
            .filter_map(|(extension, equivalents)| {
                let stem = pattern.strip_suffix(extension.as_str())?.strip_suffix('.')?;
                Some((stem, extension, equivalents))
            })
            .max_by_key(|(_, extension, _)| extension.len());
        let Some((stem, extension, equivalents)) = matched else {
            return pattern.to_string();
        };
        let mut group = vec![extension.as_str()];
        for equivalent in equivalents {
            if !group.contains(&equivalent.as_str()) {
                group.push(equivalent);
            }
        }
        if group.len() == 1 {
            return pattern.to_string();
        }
        format!("{stem}.{{{}}}", group.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_alias_deduplicates_and_trims_dots() {
        let mut table = AliasTable::new();
        table.alias("css", "scss").alias("css", ".scss").alias(".css", "less");
        assert_eq!(
            table.get("css").unwrap(),
            &["scss".to_string(), "less".to_string()]
        );
    }

    #[test]
    fn test_merge() {
        let mut table = AliasTable::new();
        table.merge([("js", vec!["coffee", "ts"]), ("css", vec!["scss"])]);
        table.merge([("js", vec!["ts"])]);
        assert_eq!(table.get("js").unwrap().len(), 2);
        assert_eq!(table.get("css").unwrap(), &["scss".to_string()]);
    }

    #[test]
    fn test_expand_trailing_extension() {
        let table = AliasTable::with_defaults();
        assert_eq!(table.expand("**/*.css"), "**/*.{css,scss,sass,less}");
        assert_eq!(table.expand("index.js"), "index.{js,coffee}");
        assert_eq!(table.expand("images/*.png"), "images/*.png");
    }

    #[test]
    fn test_expand_requires_dot_boundary() {
        let mut table = AliasTable::new();
        table.alias("js", "coffee");
        // "json" ends in "js" only if the dot is ignored
        assert_eq!(table.expand("data.json"), "data.json");
        assert_eq!(table.expand("js"), "js");
    }

    #[test]
    fn test_expand_is_idempotent_across_tasks() {
        let table = AliasTable::with_defaults();
        let first = table.expand("*.css");
        for _ in 0..10 {
            assert_eq!(table.expand("*.css"), first);
        }
        assert_eq!(table, AliasTable::with_defaults());
    }

    #[test]
    fn test_expand_self_alias_is_not_duplicated() {
        let mut table = AliasTable::new();
        table.alias("css", "css").alias("css", "scss");
        assert_eq!(table.expand("a.css"), "a.{css,scss}");
    }

    #[test]
    fn test_expand_prefers_longest_extension() {
        let mut table = AliasTable::new();
        table.alias("js", "coffee").alias("min.js", "js");
        assert_eq!(table.expand("vendor/*.min.js"), "vendor/*.{min.js,js}");
        assert_eq!(table.expand("app.js"), "app.{js,coffee}");

        let mut reversed = AliasTable::new();
        reversed.alias("min.js", "js").alias("js", "coffee");
        assert_eq!(reversed.expand("vendor/*.min.js"), "vendor/*.{min.js,js}");
    }
}
