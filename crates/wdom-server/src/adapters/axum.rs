//! Axum transport: WebSocket upgrade on the configured path plus `/health`
//! and `/metrics`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt, future};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use wdom_core::errors::ServerError;
use wdom_settings::AdapterKind;

use crate::adapter::{ListenerHandle, ServerAdapter, ServerHandle, bind};
use crate::health::{self, HealthResponse};
use crate::state::LiveState;
use crate::websocket::session::{Frame, run_session};

/// Serves the document with axum.
#[derive(Clone, Copy, Debug, Default)]
pub struct AxumAdapter;

#[async_trait]
impl ServerAdapter for AxumAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Axum
    }

    async fn listen(
        &self,
        state: Arc<LiveState>,
        address: &str,
        port: u16,
    ) -> Result<Arc<dyn ServerHandle>, ServerError> {
        let listener = bind(address, port).await?;
        let local_addr = listener.local_addr()?;
        let handle = Arc::new(ListenerHandle::new(AdapterKind::Axum, local_addr));
        let stop = handle.stop_token();
        let app = router(state);

        info!(addr = %local_addr, "axum listener started");
        let _ = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
            {
                error!(error = %e, "axum server failed");
            }
        });
        Ok(handle)
    }
}

/// Build the router: WebSocket endpoint, `/health`, `/metrics`.
pub fn router(state: Arc<LiveState>) -> Router {
    let ws_path = state.config.ws_path.clone();
    Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET `<ws_path>`: WebSocket upgrade.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<LiveState>>) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<LiveState>) {
    let (sink, stream) = socket.split();
    let incoming = stream.map(|msg| msg.map(into_frame));
    let outgoing = sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));
    run_session(state, incoming, outgoing).await;
}

fn into_frame(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => match std::str::from_utf8(&data) {
            Ok(text) => Frame::Text(text.to_owned()),
            Err(_) => Frame::Other,
        },
        Message::Close(_) => Frame::Close,
        Message::Ping(_) | Message::Pong(_) => Frame::Other,
    }
}

/// GET /health
async fn health_handler(State(state): State<Arc<LiveState>>) -> Json<HealthResponse> {
    let doc = &state.document;
    Json(health::health_check(
        state.start_time,
        state.lifecycle.is_terminated(),
        doc.registry().connection_count(),
        doc.element_count(),
        doc.queue().len(),
    ))
}

/// GET /metrics, 404 when no recorder is installed.
async fn metrics_handler(State(state): State<Arc<LiveState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::config::SyncConfig;
    use crate::document::Document;

    fn make_state() -> Arc<LiveState> {
        Arc::new(LiveState::new(
            Arc::new(Document::new()),
            SyncConfig::default(),
            CancellationToken::new(),
            None,
        ))
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let state = make_state();
        let _ = state.document.create_element("div");
        let app = router(state);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["elements"], 1);
    }

    #[tokio::test]
    async fn ws_path_without_upgrade_is_rejected() {
        let status = get_status(router(make_state()), "/rimo_ws").await;
        assert!(status.is_client_error());
        assert_ne!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        assert_eq!(get_status(router(make_state()), "/metrics").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        assert_eq!(get_status(router(make_state()), "/nope").await, StatusCode::NOT_FOUND);
    }

    #[test]
    fn frame_conversion() {
        assert_eq!(into_frame(Message::Text("hi".into())), Frame::Text("hi".into()));
        assert_eq!(
            into_frame(Message::Binary(b"{}".to_vec().into())),
            Frame::Text("{}".into())
        );
        assert_eq!(into_frame(Message::Binary(vec![0xff, 0xfe].into())), Frame::Other);
        assert_eq!(into_frame(Message::Close(None)), Frame::Close);
        assert_eq!(into_frame(Message::Ping(Vec::new().into())), Frame::Other);
    }
}
