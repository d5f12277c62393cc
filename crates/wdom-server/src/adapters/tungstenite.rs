//! Bare `tokio-tungstenite` transport: a TCP accept loop that only speaks
//! WebSocket on the configured path.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wdom_core::errors::ServerError;
use wdom_settings::AdapterKind;

use crate::adapter::{ListenerHandle, ServerAdapter, ServerHandle, bind};
use crate::state::LiveState;
use crate::websocket::session::{Frame, run_session};

/// Serves the document with a plain tungstenite accept loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteAdapter;

#[async_trait]
impl ServerAdapter for TungsteniteAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Tungstenite
    }

    async fn listen(
        &self,
        state: Arc<LiveState>,
        address: &str,
        port: u16,
    ) -> Result<Arc<dyn ServerHandle>, ServerError> {
        let listener = bind(address, port).await?;
        let local_addr = listener.local_addr()?;
        let handle = Arc::new(ListenerHandle::new(AdapterKind::Tungstenite, local_addr));

        info!(addr = %local_addr, "tungstenite listener started");
        let _ = tokio::spawn(accept_loop(listener, state, handle.stop_token()));
        Ok(handle)
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<LiveState>, stop: CancellationToken) {
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = tokio::spawn(handle_stream(stream, peer, Arc::clone(&state)));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
    info!("tungstenite listener stopped");
}

async fn handle_stream(stream: TcpStream, peer: SocketAddr, state: Arc<LiveState>) {
    let ws_path = state.config.ws_path.clone();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == ws_path {
            Ok(resp)
        } else {
            let mut rejection = ErrorResponse::new(Some("not found".to_owned()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let socket = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };

    let (sink, stream) = socket.split();
    let incoming = stream.map(|msg| msg.map(into_frame));
    let outgoing = sink.with(|text: String| {
        future::ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::Text(
            text.into(),
        )))
    });
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
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Frame::Other,
    }
}
