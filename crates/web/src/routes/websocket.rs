//! WebSocket stream of counter updates: GET /counter/{key}/ws
//!
//! On upgrade the socket joins the key's connection set and receives the
//! current count, then one `{"type":"update","count":n}` text frame per
//! committed mutation. Inbound text and binary frames are ignored. An inbound
//! close is echoed with the same code and reason.

use super::super::error::{AppError, Result};
use super::super::state::AppState;
use super::parse_key;
use axum::{
    extract::{
        Path, State,
        ws::{
            CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code,
            rejection::WebSocketUpgradeRejection,
        },
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tally_core::{CounterKey, UpdateMessage};
use tally_objects::virtual_objects::{Connection, ConnectionId, Outbound};
use tracing::{debug, info, warn};

/// What the socket loop does after one event.
enum Step {
    Continue,
    Stop,
}

/// GET /counter/{key}/ws - WebSocket upgrade endpoint
///
/// A request that is not a valid upgrade is rejected with 400 and nothing is
/// registered.
pub async fn counter_socket(
    State(state): State<AppState>,
    Path(key): Path<String>,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response> {
    let key = parse_key(&key)?;
    let ws = upgrade.map_err(|rejection| {
        debug!(key = %key, reason = %rejection.body_text(), "Rejected non-upgrade request");
        AppError::Protocol(rejection.body_text())
    })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, key, state)))
}

/// Connection lifecycle: join -> stream -> leave
async fn handle_socket(socket: WebSocket, key: CounterKey, state: AppState) {
    let (connection, mut outbound) = Connection::channel(state.router.connection_buffer());
    let id = connection.id();
    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = state.router.join(&key, connection).await {
        warn!(key = %key, connection = %id, error = %e, "Join failed, closing socket");
        let frame = CloseFrame {
            code: close_code::ERROR,
            reason: e.to_string().into(),
        };
        if sender.send(Message::Close(Some(frame))).await.is_err() {
            debug!(key = %key, connection = %id, "Socket already gone");
        }
        return;
    }
    info!(key = %key, connection = %id, "WebSocket connection joined");

    loop {
        let step = tokio::select! {
            frame = outbound.recv() => forward(&mut sender, frame).await,
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(frame))) => {
                    on_peer_close(&state, &key, id, frame).await;
                    Step::Continue
                }
                Some(Ok(_)) => Step::Continue,
                Some(Err(e)) => {
                    debug!(key = %key, connection = %id, error = %e, "WebSocket read failed");
                    Step::Stop
                }
                None => Step::Stop,
            },
        };

        if matches!(step, Step::Stop) {
            break;
        }
    }

    state.router.leave(&key, id).await;
    info!(key = %key, connection = %id, "WebSocket connection closed");
}

/// Write one outbound frame to the socket.
async fn forward(sender: &mut SplitSink<WebSocket, Message>, frame: Option<Outbound>) -> Step {
    match frame {
        Some(Outbound::Update(update)) => match send_update(sender, &update).await {
            Ok(()) => Step::Continue,
            Err(e) => {
                debug!(error = %e, "Failed to send update");
                Step::Stop
            }
        },
        Some(Outbound::Close { code, reason }) => {
            let frame = CloseFrame {
                code,
                reason: reason.into(),
            };
            if let Err(e) = sender.send(Message::Close(Some(frame))).await {
                debug!(error = %e, "Close frame not sent");
            }
            Step::Stop
        }
        // Removed from the connection set after a failed delivery.
        None => Step::Stop,
    }
}

async fn send_update(
    sender: &mut SplitSink<WebSocket, Message>,
    update: &UpdateMessage,
) -> Result<()> {
    let json = update
        .to_json()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| AppError::Internal(format!("Failed to send message: {e}")))
}

async fn on_peer_close(
    state: &AppState,
    key: &CounterKey,
    id: ConnectionId,
    frame: Option<CloseFrame>,
) {
    let (code, reason) = frame.map_or_else(
        || (close_code::NORMAL, String::new()),
        |f| (f.code, f.reason.to_string()),
    );
    debug!(key = %key, connection = %id, code, "Peer closed");
    state.router.close(key, id, code, reason).await;
}
