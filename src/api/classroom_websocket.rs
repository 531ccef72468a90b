use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::classroom::{ConnectionId, HubHandle, InboundMessage, Participant};
use crate::error::{HubError, Result};

/// How long the outbound loop gets to flush its close frame after the
/// participant has been unregistered
const OUTBOUND_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

enum Flow {
    Continue,
    Close,
}

/// Connection actor: bridges one socket to the hub with an inbound loop and
/// an outbound loop fed by a bounded queue.
pub async fn handle_classroom_websocket(
    websocket: WebSocket,
    hub: HubHandle,
    name: String,
    queue_capacity: usize,
) {
    let (tx, mut rx) = mpsc::channel::<String>(queue_capacity);
    let participant = Participant::new(name, tx);
    let connection_id = participant.connection_id;
    let participant_id = participant.id.clone();

    tracing::info!(
        participant_id = %participant_id,
        connection_id = %connection_id,
        "New classroom WebSocket connection established"
    );

    let (mut ws_sender, mut ws_receiver) = websocket.split();

    if let Err(e) = hub.connect(participant).await {
        tracing::error!(error = %e, "Cannot register participant");
        let _ = ws_sender.send(Message::close()).await;
        return;
    }

    // Outbound loop. Ends when the hub drops our queue (unregister or eviction).
    let mut outbound = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = ws_sender.send(Message::text(payload)).await {
                tracing::error!(error = %e, "Failed to send WebSocket message");
                return;
            }
        }
        let _ = ws_sender.send(Message::close()).await;
        let _ = ws_sender.close().await;
    });
    let mut outbound_done = false;

    // Inbound loop
    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(message)) => {
                    match handle_websocket_message(&hub, connection_id, &participant_id, message).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Close) => break,
                        Err(e) => {
                            tracing::warn!(
                                participant_id = %participant_id,
                                connection_id = %connection_id,
                                error = %e,
                                "Closing connection"
                            );
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "WebSocket error");
                    break;
                }
                None => break,
            },
            _ = &mut outbound, if !outbound_done => {
                outbound_done = true;
                tracing::debug!(connection_id = %connection_id, "Outbound queue closed");
                break;
            }
        }
    }

    let _ = hub.disconnect(connection_id).await;

    if !outbound_done && tokio::time::timeout(OUTBOUND_DRAIN_TIMEOUT, &mut outbound).await.is_err() {
        outbound.abort();
    }

    tracing::info!(
        participant_id = %participant_id,
        connection_id = %connection_id,
        "Classroom WebSocket connection closed"
    );
}

/// Decodes one frame and hands it to the hub. Waits while the hub's event
/// queue is full, which stops this socket from being read any further.
async fn handle_websocket_message(
    hub: &HubHandle,
    connection_id: ConnectionId,
    participant_id: &str,
    message: Message,
) -> Result<Flow> {
    if message.is_close() {
        return Ok(Flow::Close);
    }
    if message.is_ping() || message.is_pong() {
        return Ok(Flow::Continue);
    }

    let text = message
        .to_str()
        .map_err(|_| HubError::protocol("only text frames are accepted"))?;

    let inbound = InboundMessage::decode(text).map_err(|e| {
        tracing::error!(error = %e, raw_message = %text, "Failed to parse classroom message");
        e
    })?;

    hub.dispatch(connection_id, participant_id, inbound).await?;
    Ok(Flow::Continue)
}

/// Display name from the `name` query parameter, taken as given. Only a
/// missing or empty name falls back to "Anonymous".
pub fn display_name(raw: Option<&str>) -> String {
    match raw {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "Anonymous".to_string(),
    }
}
