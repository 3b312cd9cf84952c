//! WebSocket bridge between a client and a session driver.
//!
//! Text frames carry JSON channel requests and status messages; binary
//! frames carry terminal bytes in both directions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::handlers::{user_from_headers, AppState};
use super::types::api_error;
use crate::error::ConsoleError;
use crate::session::{
    run_session, ChannelEvent, ChannelOutput, ChannelRequest, SessionGuard, StatusMessage,
};
use crate::Result;

/// Frames buffered between the socket and the driver in each direction.
const CHANNEL_CAPACITY: usize = 64;

/// How long queued output is still delivered after the client stops sending.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// `GET /api/v1/console`.
///
/// The session is admitted before the upgrade, so a full server answers
/// with a plain HTTP error instead of an accepted socket.
pub async fn console_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let user = user_from_headers(&headers);
    match state.manager.open(&user, Some(remote)) {
        Ok(guard) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, guard))
            .into_response(),
        Err(e) => {
            warn!(%user, %remote, error = %e, "session rejected");
            api_error(&e).into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, guard: SessionGuard) {
    let (sink, stream) = socket.split();
    bridge(sink, stream, state, guard).await;
}

/// Pump frames between a split socket and a session driver until the
/// driver has sent its closing status.
///
/// When the client stops sending, output already queued by the driver is
/// still flushed, for at most [`FLUSH_TIMEOUT`].
async fn bridge<Si, St, E>(mut sink: Si, mut stream: St, state: AppState, guard: SessionGuard)
where
    Si: Sink<Message> + Unpin,
    St: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let session = Arc::clone(guard.session());
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (output_tx, mut output_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let driver = tokio::spawn(run_session(
        guard,
        state.shell.clone(),
        state.driver.clone(),
        event_rx,
        output_tx,
    ));

    let writer = async {
        while let Some(output) = output_rx.recv().await {
            let last = matches!(output, ChannelOutput::Status(StatusMessage::Closed { .. }));
            let frame = match encode_output(output) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(session = %session.id(), error = %e, "failed to encode output");
                    continue;
                }
            };
            if sink.send(frame).await.is_err() {
                break;
            }
            if last {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    };

    let reader_session = Arc::clone(&session);
    let reader = async move {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(session = %reader_session.id(), error = %e, "socket read failed");
                    break;
                }
            };
            match decode_frame(frame) {
                Ok(Some(event)) => {
                    let closed = event == ChannelEvent::Closed;
                    if event_tx.send(event).await.is_err() || closed {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(session = %reader_session.id(), error = %e, "malformed channel request");
                    let _ = event_tx.send(ChannelEvent::Malformed(e.to_string())).await;
                    return;
                }
            }
        }
        let _ = event_tx.send(ChannelEvent::Closed).await;
    };

    tokio::pin!(writer);
    let flushed = tokio::select! {
        _ = &mut writer => true,
        _ = reader => false,
    };
    if !flushed && tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
        debug!(session = %session.id(), "gave up flushing session output");
    }
    if let Err(e) = driver.await {
        warn!(session = %session.id(), error = %e, "session task failed");
    }
}

/// Translate a client frame. Ping and pong frames yield nothing.
pub fn decode_frame(frame: Message) -> Result<Option<ChannelEvent>> {
    let event = match frame {
        Message::Text(text) => {
            let request: ChannelRequest = serde_json::from_str(text.as_str())
                .map_err(|e| ConsoleError::Protocol(e.to_string()))?;
            ChannelEvent::Request(request)
        }
        Message::Binary(bytes) => ChannelEvent::Data(bytes.to_vec()),
        Message::Close(_) => ChannelEvent::Closed,
        Message::Ping(_) | Message::Pong(_) => return Ok(None),
    };
    Ok(Some(event))
}

/// Translate driver output into a frame.
pub fn encode_output(output: ChannelOutput) -> Result<Message> {
    match output {
        ChannelOutput::Data(bytes) => Ok(Message::Binary(bytes.into())),
        ChannelOutput::Status(status) => {
            let json = serde_json::to_string(&status)
                .map_err(|e| ConsoleError::Protocol(e.to_string()))?;
            Ok(Message::Text(json.into()))
        }
    }
}
