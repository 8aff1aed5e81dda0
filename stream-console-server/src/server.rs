use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::future::Future;
use std::path::Path;
use stream_console_core::config::ServerConfig;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::handlers::{console_socket_handler, status_handler};
use crate::state::AppState;

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unusable origin {}", origin);
                None
            }
        })
        .collect();

    let static_dir = Path::new(&config.static_dir);
    let index = static_dir.join(&config.index_file);

    Router::new()
        .route("/msg", get(console_socket_handler))
        .route("/api/status", get(status_handler))
        .route_service("/", ServeFile::new(index))
        .fallback_service(ServeDir::new(static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Server shutting down signal received");
        })
        .await?;

    Ok(())
}
