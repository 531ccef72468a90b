use std::collections::BTreeMap;
use tokio::sync::mpsc::error::TrySendError;

use super::protocol::OutboundMessage;
use super::room::{ConnectionId, Participant, Room};

/// Outcome of a single non-blocking enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Queue at capacity: the consumer is not keeping up
    Full,
    /// Outbound loop already gone
    Closed,
}

pub fn deliver(participant: &Participant, payload: String) -> Delivery {
    match participant.sender.try_send(payload) {
        Ok(()) => Delivery::Delivered,
        Err(TrySendError::Full(_)) => Delivery::Full,
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}

/// Enqueues `payload` on every live queue and returns the connections that
/// could not take it.
pub fn fan_out(
    participants: &BTreeMap<ConnectionId, Participant>,
    payload: &str,
) -> Vec<ConnectionId> {
    participants
        .iter()
        .filter_map(|(connection_id, participant)| {
            match deliver(participant, payload.to_string()) {
                Delivery::Delivered => None,
                Delivery::Full => {
                    tracing::warn!(
                        participant_id = %participant.id,
                        connection_id = %connection_id,
                        "Outbound queue full, evicting participant"
                    );
                    Some(*connection_id)
                }
                Delivery::Closed => Some(*connection_id),
            }
        })
        .collect()
}

pub fn task_list(room: &Room) -> OutboundMessage {
    OutboundMessage::TaskList(room.sanitized_tasks())
}

pub fn global_stats(room: &Room) -> OutboundMessage {
    OutboundMessage::GlobalStats(room.progress_snapshot())
}

/// Sends `message` to every live participant, then drops the ones that could
/// not keep up. Dropping the sender closes their queue; no further broadcast
/// is triggered by the eviction itself.
pub fn broadcast(room: &mut Room, message: &OutboundMessage) -> Vec<ConnectionId> {
    let payload = match message.encode() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, kind = message.kind(), "Failed to encode broadcast");
            return Vec::new();
        }
    };

    let evicted = fan_out(room.participants(), &payload);
    for connection_id in &evicted {
        room.unregister(*connection_id);
    }
    evicted
}

pub fn broadcast_task_list(room: &mut Room) -> Vec<ConnectionId> {
    let message = task_list(room);
    broadcast(room, &message)
}

pub fn broadcast_stats(room: &mut Room) -> Vec<ConnectionId> {
    let message = global_stats(room);
    broadcast(room, &message)
}

/// Direct delivery to one connection under the same eviction policy.
/// Returns false if the connection is unknown or was evicted.
pub fn send_to(room: &mut Room, connection_id: ConnectionId, message: &OutboundMessage) -> bool {
    let Some(participant) = room.participant(connection_id) else {
        return false;
    };

    let payload = match message.encode() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, kind = message.kind(), "Failed to encode message");
            return false;
        }
    };

    match deliver(participant, payload) {
        Delivery::Delivered => true,
        Delivery::Full | Delivery::Closed => {
            tracing::warn!(
                connection_id = %connection_id,
                kind = message.kind(),
                "Direct delivery failed, evicting participant"
            );
            room.unregister(connection_id);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn join(room: &mut Room, name: &str, capacity: usize) -> (ConnectionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = room.register(Participant::new(name, tx));
        (id, rx)
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let mut room = Room::with_seed_catalog();
        let (_, mut alex) = join(&mut room, "Alex", 4);
        let (_, mut mia) = join(&mut room, "Mia", 4);

        let evicted = broadcast_stats(&mut room);
        assert!(evicted.is_empty());

        for rx in [&mut alex, &mut mia] {
            let text = rx.try_recv().unwrap();
            match OutboundMessage::decode(&text).unwrap() {
                OutboundMessage::GlobalStats(records) => assert_eq!(records.len(), 2),
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[test]
    fn test_full_queue_is_evicted() {
        let mut room = Room::with_seed_catalog();
        let (slow_id, mut slow) = join(&mut room, "Slow", 1);
        let (_, mut fast) = join(&mut room, "Fast", 8);

        assert!(broadcast_stats(&mut room).is_empty());
        let evicted = broadcast_stats(&mut room);
        assert_eq!(evicted, vec![slow_id]);
        assert!(room.participant(slow_id).is_none());
        assert_eq!(room.live_count(), 1);

        // Slow got the first message, then its queue was closed
        assert!(slow.try_recv().is_ok());
        assert!(matches!(
            slow.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        broadcast_stats(&mut room);
        assert_eq!(std::iter::from_fn(|| fast.try_recv().ok()).count(), 3);
        // Progress survives eviction
        assert!(room.progress("Slow").is_some());
    }

    #[test]
    fn test_closed_queue_is_dropped() {
        let mut room = Room::with_seed_catalog();
        let (gone_id, gone) = join(&mut room, "Gone", 4);
        drop(gone);

        let evicted = broadcast_task_list(&mut room);
        assert_eq!(evicted, vec![gone_id]);
        assert_eq!(room.live_count(), 0);
    }

    #[test]
    fn test_task_list_is_sanitized() {
        let mut room = Room::with_seed_catalog();
        let (_, mut rx) = join(&mut room, "Alex", 4);
        broadcast_task_list(&mut room);

        let text = rx.try_recv().unwrap();
        assert!(!text.contains("test_cases"));
        assert!(!text.contains("assert hello()"));
        assert_eq!(room.tasks()[0].test_cases.len(), 1);
    }

    #[test]
    fn test_send_to_single_connection() {
        let mut room = Room::with_seed_catalog();
        let (alex_id, mut alex) = join(&mut room, "Alex", 4);
        let (_, mut mia) = join(&mut room, "Mia", 4);

        let message = task_list(&room);
        assert!(send_to(&mut room, alex_id, &message));
        assert!(alex.try_recv().is_ok());
        assert!(mia.try_recv().is_err());

        assert!(!send_to(&mut room, ConnectionId::next(), &message));
    }
}
