//! WebSocket gateway (`GET /ws`).
//!
//! One writer task per connection serialises [`Outbound`] messages onto the
//! socket; the read loop decodes frames and starts a pipeline session for
//! every `image` message. Sessions run as their own tasks, so a connection
//! keeps reading while its sessions are in flight, and they run to
//! completion even if the client goes away.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use futures::{Sink, SinkExt, Stream, StreamExt};
use reimagine_core::{Inbound, Outbound, Pipeline};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::state::AppState;

/// Outbound messages buffered per connection before sessions wait.
const OUTBOUND_BUFFER: usize = 64;

/// Register the WebSocket route.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(upgrade))
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: Arc<AppState>) {
    let (sink, stream) = socket.split();
    serve_connection(sink, stream, peer, Arc::clone(&state.pipeline)).await;
}

/// Drive one connection until the client closes it or the transport fails.
pub(crate) async fn serve_connection<Si, St, E>(
    sink: Si,
    mut stream: St,
    peer: SocketAddr,
    pipeline: Arc<Pipeline>,
) where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    info!(%peer, "client connected");

    let (tx, rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);
    tokio::spawn(write_outbound(sink, rx, peer));

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%peer, error = %e, "websocket receive error");
                break;
            }
        };

        match frame {
            Message::Text(text) => match Inbound::parse(text.as_str()) {
                Ok(Inbound::Image { data }) => {
                    debug!(%peer, payload_chars = data.len(), "image received");
                    let pipeline = Arc::clone(&pipeline);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        // Already reported to the client by the pipeline.
                        if let Err(e) = pipeline.run(&data, tx).await {
                            debug!(%peer, error = %e, "session ended with error");
                        }
                    });
                }
                Err(e) => reply(&tx, GatewayError::from(e).into()).await,
            },
            Message::Binary(_) => reply(&tx, GatewayError::BinaryFrame.into()).await,
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
        }
    }

    info!(%peer, "client disconnected");
}

async fn reply(tx: &mpsc::Sender<Outbound>, message: Outbound) {
    if tx.send(message).await.is_err() {
        debug!("writer gone; reply dropped");
    }
}

/// Forward queued messages to the socket. Ends once every sender (the read
/// loop and all of its sessions) is gone, or when the socket stops accepting.
async fn write_outbound<Si>(mut sink: Si, mut rx: mpsc::Receiver<Outbound>, peer: SocketAddr)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(Message::Text(message.to_json().into())).await {
            debug!(%peer, error = %e, "websocket send failed; dropping further messages");
            return;
        }
    }
    let _ = sink.close().await;
}
