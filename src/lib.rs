//! # asset-forge
//!
//! An on-demand asset build cache. Requests for build artifacts (`/styles.css`,
//! `/libraries.js`) are matched against registered tasks, resolved to source files under a root
//! directory, compiled through a pipeline of transform plugins, and written to a cache directory.
//! A cached artifact is served again for as long as it is at least as new as all of its sources.
//!
//! ## Overview
//!
//! ```text
//! request path -> TaskRegistry (glob match, alias expanded)
//!              -> Resolver     (source glob walk + cache freshness)
//!              -> Pipeline     (global plugins, then task plugins in order)
//!              -> CacheWriter  (atomic write under the cache directory)
//! ```
//!
//! - **[`alias`]**: Extension equivalences (`css` served from `scss`, `sass`, `less`)
//! - **[`task`]**: Build rules and the ordered registry
//! - **[`resolver`]**: Source lookup and the freshness decision
//! - **[`pipeline`]**: Pipeline assembly and execution
//! - **[`plugin`]**: Plugin traits and the built-in `concat` and external command plugins
//! - **[`cache`]**: Cache writes
//! - **[`server`]**: The request orchestrator tying the above together
//! - **[`config`]**: `forge.toml` loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use asset_forge::{
//!     config::ServerConfig,
//!     plugin::{Concat, Plugin},
//!     server::AssetServer,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = AssetServer::new(ServerConfig::new("./assets"))?;
//!     server
//!         .task("libraries.js")?
//!         .src("js/libraries/*.js")?
//!         .use_plugin(Plugin::merge(Concat::default()), ["libraries.js"]);
//!
//!     let served = server.serve("/libraries.js").await?;
//!     println!("{} (cached: {})", served.path.display(), served.cached);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: The library: tasks, resolution, pipelines and caching
//! - **service**: [`http`] router serving artifacts over HTTP (`axum`, `tower-http`)
//! - **bin**: The `forge` command line tool

pub mod alias;
pub mod cache;
pub mod config;
pub mod error;
#[cfg(feature = "service")]
pub mod http;
pub mod inflight;
pub mod pipeline;
pub mod plugin;
pub mod request;
pub mod resolver;
pub mod server;
pub mod task;

pub use error::*;
