//! forge CLI tool
//!
//! Command-line interface for building and serving assets declared in a `forge.toml`.
//!
//! ## Commands
//!
//! - `serve`: Serve assets over HTTP, building them on request
//! - `build <path>...`: Build the given request paths once
//! - `clean`: Remove every cached artifact
//!
//! Plugins with a `when` condition are registered only when `FORGE_ENV` (or `NODE_ENV`) matches.

use asset_forge::{
    config::{current_env, ForgeConfig},
    http::HttpServer,
    server::AssetServer,
};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Parser)]
#[command(name = "forge")]
#[command(author, version, about = "An on-demand asset build cache", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "forge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve assets over HTTP until Ctrl-C
    Serve {
        /// Port to bind on 127.0.0.1
        #[arg(short, long, default_value_t = 9037)]
        port: u16,
    },

    /// Build request paths once and print where each artifact was written
    Build {
        /// Request paths, e.g. `/styles.css`
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Remove every cached artifact
    Clean,
}

fn load_server(config: &Path) -> Result<AssetServer, Box<dyn std::error::Error>> {
    let env = current_env();
    tracing::debug!("Environment: {:?}", env);
    let server = ForgeConfig::load(config)?.build(env.as_deref())?;
    Ok(server)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let server = load_server(&cli.config)?;

    match cli.command {
        Commands::Serve { port } => {
            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                println!("\nShutting down...");
                r.store(false, Ordering::SeqCst);
            })?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async move {
                let shutdown = async move {
                    while running.load(Ordering::SeqCst) {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                };
                HttpServer::new(Arc::new(server), port)
                    .serve(shutdown)
                    .await
            })?;
            println!("Shutdown complete");
            Ok(())
        }

        Commands::Build { paths } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async move {
                for path in paths.iter() {
                    let served = server.serve(path).await?;
                    let state = if served.cached { "cached" } else { "fresh" };
                    println!("{state} {}", served.path.display());
                }
                Ok::<(), asset_forge::ForgeError>(())
            })?;
            Ok(())
        }

        Commands::Clean => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server.clear_cache())?;
            println!("Removed {}", server.config().cache_dir().display());
            Ok(())
        }
    }
}
