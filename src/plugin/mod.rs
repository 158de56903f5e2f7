//! Transform plugins.
//!
//! A plugin is one step of a task's pipeline. Two capabilities exist:
//!
//! - [`Transform`] - receives one [`AssetFile`] and returns the updated file (1:1)
//! - [`Merge`] - receives the ordered set of source files and returns a single file (N:1)
//!
//! Both are bound to a fixed argument list when they are registered on a task, which is what a
//! [`PluginSpec`] records. Any error a plugin returns is reported as
//! [`ForgeError::TransformFailed`] carrying the plugin's [`name`](Plugin::name).
//!
//! ## Built-in Plugins
//!
//! - [`Concat`] - merge the source set with a separator
//! - [`CommandTransform`] - pipe the file through an external program
//!
//! Custom plugins implement one of the traits, or wrap a closure with [`Plugin::from_fn`]:
//!
//! ```rust
//! use asset_forge::plugin::{AssetFile, Plugin};
//!
//! let banner = Plugin::from_fn("banner", |mut file: AssetFile, args: &[String]| {
//!     let mut contents = args.join(" ").into_bytes();
//!     contents.extend_from_slice(&file.contents);
//!     file.contents = contents;
//!     Ok(file)
//! });
//! assert_eq!(banner.name(), "banner");
//! ```

use async_trait::async_trait;
use std::{
    borrow::Cow,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::ForgeError;

pub mod command;
pub mod concat;

pub use command::CommandTransform;
pub use concat::Concat;

/// The unit a pipeline operates on: file contents plus the logical path (relative to the source
/// root) they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl AssetFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        AssetFile {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.contents)
    }
}

#[async_trait]
pub trait Transform: Send + Sync {
    /// Identity reported when this plugin fails.
    fn name(&self) -> &str;

    async fn transform(&self, file: AssetFile, args: &[String]) -> Result<AssetFile, ForgeError>;
}

#[async_trait]
pub trait Merge: Send + Sync {
    fn name(&self) -> &str;

    /// `files` are in source resolution order and never empty.
    async fn merge(&self, files: Vec<AssetFile>, args: &[String]) -> Result<AssetFile, ForgeError>;
}

/// How many inputs a plugin consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Single,
    Multi,
}

#[derive(Clone)]
pub enum Plugin {
    Transform(Arc<dyn Transform>),
    Merge(Arc<dyn Merge>),
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plugin::Transform(t) => write!(f, "Transform({})", t.name()),
            Plugin::Merge(m) => write!(f, "Merge({})", m.name()),
        }
    }
}

impl Plugin {
    pub fn transform<T: Transform + 'static>(transform: T) -> Self {
        Plugin::Transform(Arc::new(transform))
    }

    pub fn merge<M: Merge + 'static>(merge: M) -> Self {
        Plugin::Merge(Arc::new(merge))
    }

    /// Wrap a synchronous closure as a single-file transform.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(AssetFile, &[String]) -> Result<AssetFile, ForgeError> + Send + Sync + 'static,
    {
        Plugin::transform(FnTransform {
            name: name.into(),
            f,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Plugin::Transform(t) => t.name(),
            Plugin::Merge(m) => m.name(),
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Plugin::Transform(_) => Arity::Single,
            Plugin::Merge(_) => Arity::Multi,
        }
    }
}

/// A plugin partially applied to the arguments it was registered with.
#[derive(Debug, Clone)]
pub struct PluginSpec {
    pub plugin: Plugin,
    pub args: Vec<String>,
}

impl PluginSpec {
    pub fn new<I, S>(plugin: Plugin, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PluginSpec {
            plugin,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }
}

struct FnTransform<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Transform for FnTransform<F>
where
    F: Fn(AssetFile, &[String]) -> Result<AssetFile, ForgeError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn transform(&self, file: AssetFile, args: &[String]) -> Result<AssetFile, ForgeError> {
        (self.f)(file, args)
    }
}
