//! HTTP delivery of built assets.
//!
//! Every `GET`/`HEAD` request is handed to [`AssetServer::serve`] with its URI path. A successful
//! build is answered with the cached file; failures are answered with the error's status code and
//! a JSON body:
//!
//! ```json
//! { "error": "Internal Server Error", "plugin": "sass", "message": "undefined variable" }
//! ```

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceExt;
use tower_http::{services::ServeFile, trace::TraceLayer};

use crate::{error::ForgeError, server::AssetServer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    pub message: String,
}

impl From<&ForgeError> for ErrorBody {
    fn from(err: &ForgeError) -> Self {
        let status = err.status_code();
        let (plugin, message) = match err {
            ForgeError::TransformFailed { plugin, message } => {
                (Some(plugin.clone()), message.clone())
            }
            other => (None, other.to_string()),
        };
        ErrorBody {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            plugin,
            message,
        }
    }
}

fn error_response(err: ForgeError) -> Response {
    let status = err.status_code();
    (status, Json(ErrorBody::from(&err))).into_response()
}

/// Router answering every path from `server`.
pub fn router(server: Arc<AssetServer>) -> Router {
    Router::new()
        .fallback(asset_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

async fn asset_handler(State(server): State<Arc<AssetServer>>, request: Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let path = request.uri().path().to_string();

    // Run detached: a client hanging up must not cancel a build other requests may be waiting on.
    let build = tokio::spawn(async move { server.serve(&path).await });
    let served = match build.await {
        Ok(Ok(served)) => served,
        Ok(Err(e)) => return error_response(e),
        Err(e) => return error_response(ForgeError::Io(format!("build task failed: {e}"))),
    };

    match ServeFile::new(&served.path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(infallible) => match infallible {},
    }
}

/// Binds [`router`] to a local port.
pub struct HttpServer {
    server: Arc<AssetServer>,
    port: u16,
}

impl HttpServer {
    pub fn new(server: Arc<AssetServer>, port: u16) -> Self {
        HttpServer { server, port }
    }

    /// Serve until `shutdown_signal` resolves.
    pub async fn serve(
        self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let root = self.server.config().root.clone();
        let app = router(self.server);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Asset server listening on http://{}", addr);
        println!("\nServing assets at http://{}", addr);
        println!("Source root: {}\n", root.display());

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        tracing::info!("Asset server shut down");
        Ok(())
    }
}
