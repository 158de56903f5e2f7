//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use asset_forge::{
    config::ServerConfig,
    plugin::{AssetFile, Concat, Plugin},
    server::AssetServer,
    ForgeError,
};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

/// Create the sample asset tree under `<temp_dir>/assets` and return its path.
///
/// ```text
/// assets/
///   styles.scss
///   css/another.scss
///   css/.test
///   index.js
///   invalid.js
///   passthrough.js
///   date.js
///   js/libraries/a.js
///   js/libraries/b.js
/// ```
#[allow(dead_code)]
pub fn create_test_assets(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("assets");
    write_file(&root, "styles.scss", "body { color: red; }");
    write_file(&root, "css/another.scss", "p { margin: 0; }");
    write_file(&root, "css/.test", "hidden");
    write_file(&root, "index.js", "const x = () => 1;");
    write_file(&root, "invalid.js", "x = ->\n  y +");
    write_file(&root, "passthrough.js", "let hi = 5;");
    write_file(&root, "date.js", "0");
    write_file(&root, "js/libraries/a.js", "var a = 5;");
    write_file(&root, "js/libraries/b.js", "var b = 8;");
    root
}

/// A transform appending `marker` to the file contents.
#[allow(dead_code)]
pub fn tag(marker: &'static str) -> Plugin {
    Plugin::from_fn(marker, move |mut file: AssetFile, _: &[String]| {
        file.contents.extend_from_slice(marker.as_bytes());
        Ok(file)
    })
}

/// A pass-through transform counting its invocations.
#[allow(dead_code)]
pub fn counting(name: &'static str, calls: Arc<AtomicUsize>) -> Plugin {
    Plugin::from_fn(name, move |file: AssetFile, _: &[String]| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(file)
    })
}

/// A transform that always fails.
#[allow(dead_code)]
pub fn failing(name: &'static str) -> Plugin {
    Plugin::from_fn(name, |file: AssetFile, _: &[String]| {
        Err(ForgeError::transform(
            "ignored",
            format!("unexpected token in {}", file.path.display()),
        ))
    })
}

/// The task layout the HTTP and orchestrator tests share.
#[allow(dead_code)]
pub fn sample_server(root: &Path) -> AssetServer {
    let mut server = AssetServer::new(ServerConfig::new(root)).unwrap();
    server
        .task("**/*.css")
        .unwrap()
        .src("**/*.scss")
        .unwrap()
        .use_plugin(tag("[sass]"), Vec::<String>::new());
    server
        .task("*.css")
        .unwrap()
        .src("**/*.scss")
        .unwrap()
        .use_plugin(tag("[autoprefix]"), Vec::<String>::new())
        .when(false, tag("[csso]"), Vec::<String>::new());
    server
        .task("libraries.js")
        .unwrap()
        .src("js/libraries/*.js")
        .unwrap()
        .use_plugin(Plugin::merge(Concat::default()), ["libraries.js"]);
    server
        .task("index.js")
        .unwrap()
        .use_plugin(tag("[es6]"), Vec::<String>::new());
    server
        .task("invalid.js")
        .unwrap()
        .use_plugin(failing("coffee"), Vec::<String>::new());
    server.task("passthrough.js").unwrap();
    server
        .task("date.js")
        .unwrap()
        .use_plugin(Plugin::merge(Concat::default()), ["date.js"]);
    server
}
