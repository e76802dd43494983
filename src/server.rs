//! HTTP surface: WebSocket endpoint, relay info, and health checks.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::relay::Relay;
use crate::ws;

#[derive(Serialize, Deserialize)]
struct Health {
    status: String,
}

/// Basic NIP-11 relay information document.
#[derive(Serialize, Deserialize)]
struct RelayInfo {
    name: String,
    software: String,
    version: String,
    supported_nips: Vec<u32>,
}

/// Serve the relay on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    relay: Arc<Relay>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "relay listening");
    let app = router(relay);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .with_state(relay)
}

/// Upgrade to the event stream, or answer with the relay info document.
async fn root(ws: Option<WebSocketUpgrade>, State(relay): State<Arc<Relay>>) -> Response {
    match ws {
        Some(upgrade) => upgrade
            .on_upgrade(move |socket| ws::process(socket, relay))
            .into_response(),
        None => relay_info().into_response(),
    }
}

fn relay_info() -> impl IntoResponse {
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(RelayInfo {
            name: "strtr".into(),
            software: "strtr".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            supported_nips: vec![1, 9, 11],
        }),
    )
}

/// Health check endpoint.
async fn healthz() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}
