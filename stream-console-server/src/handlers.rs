use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::state::{AppState, ModuleStatus, StatusResponse};
use crate::ws;

/// Upgrade `/msg` to a console connection
pub async fn console_socket_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origin_allowed(origin) {
        warn!(origin = ?origin, "Rejected console connection from disallowed origin");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    upgrade
        .on_failed_upgrade(|e| warn!(error = %e, "Console websocket upgrade failed"))
        .on_upgrade(move |socket| attach_console(state, socket))
}

async fn attach_console(state: AppState, socket: WebSocket) {
    let (sink, source) = ws::split(socket);
    let handle = state.hub.create_handle(Box::new(sink));

    match state.hub.register(&handle).await {
        Ok(active) => {
            info!(handle = %handle.id(), active, "Console connected");
            handle.clone().read_loop(Box::new(source)).await;
            info!(handle = %handle.id(), "Console disconnected");
        }
        Err(e) => {
            warn!(handle = %handle.id(), error = %e, "Could not register console");
            handle.close().await;
        }
    }
}

pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let hub = state.hub.snapshot().await;

    let mut modules = Vec::new();
    for id in state.modules.list_modules().await {
        modules.push(ModuleStatus {
            id,
            running: state.modules.is_module_running(id).await,
        });
    }

    Json(StatusResponse { hub, modules })
}
