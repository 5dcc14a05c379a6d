use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::info;

use super::room::{JoinOutcome, LeaveOutcome, ParticipantId, Room};
use crate::models::ServerMessage;

/// Process-wide table of live rooms.
///
/// A room is created lazily on the first join for its identifier and removed
/// when its participant set becomes empty. Join and leave run under the
/// table's write lock, so concurrent first-joins resolve to a single room
/// instance and removal cannot race a join into a zombie room. Content and
/// transfer traffic never touches the table: connections operate on the
/// `Arc<Room>` handed out at join time, so rooms proceed fully in parallel.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

/// Counters reported by the diagnostics endpoint.
#[derive(Default)]
pub struct RegistryStats {
    pub rooms: u32,
    pub connections: u32,
    pub active_writers: u32,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the room for `room_id`, creating it on first use, and admit
    /// the given outbound channel as a participant.
    pub async fn join(
        &self,
        room_id: &str,
        capacity: usize,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> (Arc<Room>, JoinOutcome) {
        let mut rooms = self.rooms.write().await;
        let created = !rooms.contains_key(room_id);
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Room::new(room_id)))
            .clone();
        if created {
            info!("Created room {}", room_id);
        }

        let outcome = room.join(capacity, tx).await;
        if created && matches!(outcome, JoinOutcome::Full) {
            rooms.remove(room_id);
        }
        (room, outcome)
    }

    /// Remove a participant from a room, dropping the room once empty. A
    /// later join with the same identifier starts from a fresh room.
    pub async fn leave(&self, room_id: &str, participant_id: ParticipantId) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(room_id).cloned() else {
            return;
        };
        if let LeaveOutcome::Emptied = room.leave(participant_id).await {
            rooms.remove(room_id);
            info!("Removed empty room {}", room_id);
        }
    }

    pub async fn stats(&self) -> RegistryStats {
        let rooms = self.rooms.read().await;
        let mut stats = RegistryStats {
            rooms: rooms.len() as u32,
            ..RegistryStats::default()
        };
        for room in rooms.values() {
            let room_stats = room.stats().await;
            stats.connections += room_stats.participants as u32;
            if room_stats.has_writer {
                stats.active_writers += 1;
            }
        }
        stats
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    const CAPACITY: usize = 2;

    async fn join(
        registry: &RoomRegistry,
        room_id: &str,
    ) -> (Arc<Room>, ParticipantId, UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (room, outcome) = registry.join(room_id, CAPACITY, tx).await;
        match outcome {
            JoinOutcome::Joined(id) => (room, id, rx),
            JoinOutcome::Full => panic!("room unexpectedly full"),
        }
    }

    #[tokio::test]
    async fn resolves_a_single_instance_per_identifier() {
        let registry = RoomRegistry::new();
        let (room_a, _, _rx_a) = join(&registry, "r1").await;
        let (room_b, _, _rx_b) = join(&registry, "r1").await;
        assert!(Arc::ptr_eq(&room_a, &room_b));
        assert_eq!(registry.stats().await.rooms, 1);
    }

    #[tokio::test]
    async fn distinct_identifiers_get_distinct_rooms() {
        let registry = RoomRegistry::new();
        let (room_a, _, _rx_a) = join(&registry, "r1").await;
        let (room_b, _, _rx_b) = join(&registry, "r2").await;
        assert!(!Arc::ptr_eq(&room_a, &room_b));

        let stats = registry.stats().await;
        assert_eq!(stats.rooms, 2);
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.active_writers, 2);
    }

    #[tokio::test]
    async fn last_leave_removes_the_room() {
        let registry = RoomRegistry::new();
        let (_, id, _rx) = join(&registry, "r1").await;
        registry.leave("r1", id).await;
        assert_eq!(registry.stats().await.rooms, 0);
    }

    #[tokio::test]
    async fn leave_for_unknown_room_is_ignored() {
        let registry = RoomRegistry::new();
        registry.leave("nowhere", 1).await;
        assert_eq!(registry.stats().await.rooms, 0);
    }

    #[tokio::test]
    async fn recreated_room_starts_fresh() {
        let registry = RoomRegistry::new();
        let (room, id, _rx) = join(&registry, "r1").await;
        room.submit_content(id, "draft".to_string()).await;
        registry.leave("r1", id).await;

        // Same identifier, fresh state: empty content and a restarted
        // identifier sequence.
        let (_, new_id, mut rx) = join(&registry, "r1").await;
        assert_eq!(new_id, 1);
        let msgs: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        match &msgs[1] {
            ServerMessage::InitialContent(init) => assert_eq!(init.content, ""),
            other => panic!("expected initialContent, got {:?}", other),
        }
    }
}
