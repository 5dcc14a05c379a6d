use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::models::{
    ContentBroadcastMessage, InitialContentMessage, ServerMessage, SetEditingUserMessage,
    UserIdMessage,
};

/// Room-scoped participant identifier, assigned monotonically starting at 1.
/// Identifiers are never reused within the lifetime of a room.
pub type ParticipantId = u32;

const FIRST_PARTICIPANT_ID: ParticipantId = 1;

/// One connected participant as the coordinator sees it. The coordinator only
/// holds the sending half of the connection's outbound channel; the gateway
/// owns the socket itself.
struct Participant {
    id: ParticipantId,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Per-room coordinator state. Participants are kept in join order, content is
/// the full buffer (never a diff log), and `writer` names the single
/// participant currently allowed to mutate it.
struct RoomState {
    participants: Vec<Participant>,
    content: String,
    writer: Option<ParticipantId>,
    next_id: ParticipantId,
}

/// An isolated collaborative session. All operations lock the room state for
/// their full duration, so operations on the same room apply one-at-a-time in
/// arrival order and every participant observes the same event order.
pub struct Room {
    id: String,
    state: Mutex<RoomState>,
}

pub enum JoinOutcome {
    Joined(ParticipantId),
    Full,
}

pub enum LeaveOutcome {
    /// The last participant left; the registry entry should be dropped.
    Emptied,
    Remaining(usize),
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    NotWriter,
}

/// Counters reported by the diagnostics endpoint.
pub struct RoomStats {
    pub participants: usize,
    pub has_writer: bool,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(RoomState {
                participants: Vec::new(),
                content: String::new(),
                writer: None,
                next_id: FIRST_PARTICIPANT_ID,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Admit a participant, handing back its assigned identifier.
    ///
    /// The joiner receives its identity and the current buffer as unicasts.
    /// The first joiner is designated writer; on any later join the current
    /// writer is re-announced to the whole room so everyone agrees who may
    /// write.
    pub async fn join(
        &self,
        capacity: usize,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> JoinOutcome {
        let mut state = self.state.lock().await;

        if state.participants.len() >= capacity {
            info!(
                "Rejecting join for room {}: capacity {} reached",
                self.id, capacity
            );
            return JoinOutcome::Full;
        }

        let id = state.next_id;
        state.next_id += 1;

        let existing_writer = state.writer;
        if existing_writer.is_none() {
            // First joiner gets initial write access
            state.writer = Some(id);
        }
        state.participants.push(Participant { id, tx });

        // Sync the joiner before announcing the writer
        self.unicast(&state, id, ServerMessage::UserId(UserIdMessage { participant_id: id }));
        self.unicast(
            &state,
            id,
            ServerMessage::InitialContent(InitialContentMessage {
                content: state.content.clone(),
            }),
        );
        if let Some(writer) = existing_writer {
            self.broadcast(
                &state,
                ServerMessage::SetEditingUser(SetEditingUserMessage {
                    participant_id: writer,
                }),
            );
        }

        info!(
            "Participant {} joined room {} ({}/{} participants)",
            id,
            self.id,
            state.participants.len(),
            capacity
        );
        JoinOutcome::Joined(id)
    }

    /// Remove a participant. If the departing participant held the write
    /// token, the pen passes to the next participant in join order.
    pub async fn leave(&self, participant_id: ParticipantId) -> LeaveOutcome {
        let mut state = self.state.lock().await;

        let Some(pos) = state
            .participants
            .iter()
            .position(|p| p.id == participant_id)
        else {
            // Already removed, e.g. an explicit leave followed by the
            // connection-close path.
            return LeaveOutcome::Remaining(state.participants.len());
        };
        state.participants.remove(pos);
        info!("Participant {} left room {}", participant_id, self.id);

        if state.participants.is_empty() {
            state.writer = None;
            return LeaveOutcome::Emptied;
        }

        if state.writer == Some(participant_id) {
            let next = state.participants[0].id;
            state.writer = Some(next);
            self.broadcast(
                &state,
                ServerMessage::SetEditingUser(SetEditingUserMessage {
                    participant_id: next,
                }),
            );
            info!(
                "Writer left room {}, promoted participant {}",
                self.id, next
            );
        }
        LeaveOutcome::Remaining(state.participants.len())
    }

    /// Accept a full-buffer submission from the current writer and broadcast
    /// it to every participant, the writer included. Submissions from anyone
    /// else are dropped: a stale writer's in-flight edit after losing the
    /// token is a normal outcome of a hand-off race, not an error.
    pub async fn submit_content(
        &self,
        participant_id: ParticipantId,
        content: String,
    ) -> SubmitOutcome {
        let mut state = self.state.lock().await;

        if state.writer != Some(participant_id) {
            debug!(
                "Dropping content from participant {} in room {}: not the current writer",
                participant_id, self.id
            );
            return SubmitOutcome::NotWriter;
        }

        state.content = content;
        self.broadcast(
            &state,
            ServerMessage::ContentChange(ContentBroadcastMessage {
                content: state.content.clone(),
            }),
        );
        SubmitOutcome::Accepted
    }

    /// Grant the write token to a requesting participant and announce the new
    /// writer. First request wins; there is no queuing or veto. A request from
    /// the current writer is a no-op.
    pub async fn request_transfer(&self, participant_id: ParticipantId) {
        let mut state = self.state.lock().await;

        if state.writer == Some(participant_id) {
            return;
        }
        if !state.participants.iter().any(|p| p.id == participant_id) {
            warn!(
                "Ignoring transfer request from participant {} in room {}: not a member",
                participant_id, self.id
            );
            return;
        }

        state.writer = Some(participant_id);
        self.broadcast(
            &state,
            ServerMessage::SetEditingUser(SetEditingUserMessage { participant_id }),
        );
        info!(
            "Write permission in room {} transferred to participant {}",
            self.id, participant_id
        );
    }

    pub async fn stats(&self) -> RoomStats {
        let state = self.state.lock().await;
        RoomStats {
            participants: state.participants.len(),
            has_writer: state.writer.is_some(),
        }
    }

    /// Deliver an event to every participant of the room. Sends are
    /// non-blocking; a closed channel means the connection is going away and
    /// the gateway's disconnect handling will issue the leave.
    fn broadcast(&self, state: &RoomState, msg: ServerMessage) {
        for participant in &state.participants {
            if participant.tx.send(msg.clone()).is_err() {
                warn!(
                    "Failed to deliver event to participant {} in room {}",
                    participant.id, self.id
                );
            }
        }
    }

    /// Deliver an event to a single participant of the room.
    fn unicast(&self, state: &RoomState, participant_id: ParticipantId, msg: ServerMessage) {
        if let Some(participant) = state.participants.iter().find(|p| p.id == participant_id) {
            if participant.tx.send(msg).is_err() {
                warn!(
                    "Failed to deliver event to participant {} in room {}",
                    participant_id, self.id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    const CAPACITY: usize = 2;

    async fn join(room: &Room) -> (ParticipantId, UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        match room.join(CAPACITY, tx).await {
            JoinOutcome::Joined(id) => (id, rx),
            JoinOutcome::Full => panic!("room unexpectedly full"),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn assert_content(msg: &ServerMessage, expected: &str) {
        match msg {
            ServerMessage::ContentChange(change) => assert_eq!(change.content, expected),
            other => panic!("expected contentChange, got {:?}", other),
        }
    }

    fn assert_editing_user(msg: &ServerMessage, expected: ParticipantId) {
        match msg {
            ServerMessage::SetEditingUser(set) => assert_eq!(set.participant_id, expected),
            other => panic!("expected setEditingUser, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn first_joiner_gets_identity_and_empty_buffer() {
        let room = Room::new("r1");
        let (id, mut rx) = join(&room).await;
        assert_eq!(id, 1);

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 2);
        match &msgs[0] {
            ServerMessage::UserId(user) => assert_eq!(user.participant_id, 1),
            other => panic!("expected userId, got {:?}", other),
        }
        match &msgs[1] {
            ServerMessage::InitialContent(init) => assert_eq!(init.content, ""),
            other => panic!("expected initialContent, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn join_beyond_capacity_is_rejected() {
        let room = Room::new("r1");
        let (_a, _rx_a) = join(&room).await;
        let (_b, _rx_b) = join(&room).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(matches!(room.join(CAPACITY, tx).await, JoinOutcome::Full));
        // The rejected connection was not added and receives nothing from the
        // coordinator; the gateway unicasts the rejection itself.
        assert!(rx.try_recv().is_err());
        assert_eq!(room.stats().await.participants, 2);
    }

    #[tokio::test]
    async fn second_join_announces_the_writer_to_everyone() {
        let room = Room::new("r1");
        let (a, mut rx_a) = join(&room).await;
        drain(&mut rx_a);

        let (_b, mut rx_b) = join(&room).await;
        let msgs_b = drain(&mut rx_b);
        assert_eq!(msgs_b.len(), 3);
        assert_editing_user(&msgs_b[2], a);

        let msgs_a = drain(&mut rx_a);
        assert_eq!(msgs_a.len(), 1);
        assert_editing_user(&msgs_a[0], a);
    }

    #[tokio::test]
    async fn stale_writer_write_is_dropped_without_broadcast() {
        let room = Room::new("r1");
        let (_a, mut rx_a) = join(&room).await;
        let (b, mut rx_b) = join(&room).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        let outcome = room.submit_content(b, "sneaky".to_string()).await;
        assert_eq!(outcome, SubmitOutcome::NotWriter);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn writer_submission_reaches_everyone_verbatim() {
        let room = Room::new("r1");
        let (a, mut rx_a) = join(&room).await;
        let (_b, mut rx_b) = join(&room).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        let outcome = room.submit_content(a, "hello".to_string()).await;
        assert_eq!(outcome, SubmitOutcome::Accepted);

        // Everyone converges on the authoritative value, the writer included.
        assert_content(&drain(&mut rx_a)[0], "hello");
        assert_content(&drain(&mut rx_b)[0], "hello");
    }

    #[tokio::test]
    async fn transfer_moves_the_write_token() {
        let room = Room::new("r1");
        let (a, mut rx_a) = join(&room).await;
        let (b, mut rx_b) = join(&room).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        room.request_transfer(b).await;
        assert_editing_user(&drain(&mut rx_a)[0], b);
        assert_editing_user(&drain(&mut rx_b)[0], b);

        // The old writer is now rejected, the new one accepted.
        assert_eq!(
            room.submit_content(a, "ignored".to_string()).await,
            SubmitOutcome::NotWriter
        );
        assert_eq!(
            room.submit_content(b, "hello world".to_string()).await,
            SubmitOutcome::Accepted
        );
        assert_content(&drain(&mut rx_b)[0], "hello world");
    }

    #[tokio::test]
    async fn transfer_request_from_writer_is_a_no_op() {
        let room = Room::new("r1");
        let (a, mut rx_a) = join(&room).await;
        let (_b, mut rx_b) = join(&room).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        room.request_transfer(a).await;
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn writer_leave_promotes_next_in_join_order() {
        let room = Room::new("r1");
        let (a, mut rx_a) = join(&room).await;
        let (b, mut rx_b) = join(&room).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        assert!(matches!(
            room.leave(a).await,
            LeaveOutcome::Remaining(1)
        ));
        assert_editing_user(&drain(&mut rx_b)[0], b);

        assert_eq!(
            room.submit_content(b, "mine now".to_string()).await,
            SubmitOutcome::Accepted
        );
    }

    #[tokio::test]
    async fn last_leave_empties_the_room() {
        let room = Room::new("r1");
        let (a, _rx_a) = join(&room).await;
        assert!(matches!(room.leave(a).await, LeaveOutcome::Emptied));
        assert_eq!(room.stats().await.participants, 0);
        assert!(!room.stats().await.has_writer);
    }

    #[tokio::test]
    async fn identifiers_are_never_reused_within_a_room() {
        let room = Room::new("r1");
        let (a, _rx_a) = join(&room).await;
        let (b, _rx_b) = join(&room).await;
        room.leave(a).await;

        // A free slot exists again, but the departed identifier stays burned.
        let (c, _rx_c) = join(&room).await;
        assert_eq!((a, b, c), (1, 2, 3));
    }

    /// The end-to-end coordination flow for a two-party room.
    #[tokio::test]
    async fn two_party_session_flow() {
        let room = Room::new("r1");

        let (a, mut rx_a) = join(&room).await;
        assert_eq!(a, 1);
        let msgs = drain(&mut rx_a);
        match &msgs[1] {
            ServerMessage::InitialContent(init) => assert_eq!(init.content, ""),
            other => panic!("expected initialContent, got {:?}", other),
        }

        let (b, mut rx_b) = join(&room).await;
        assert_eq!(b, 2);
        let msgs_b = drain(&mut rx_b);
        assert_editing_user(&msgs_b[2], 1);
        assert_editing_user(&drain(&mut rx_a)[0], 1);

        room.submit_content(a, "hello".to_string()).await;
        assert_content(&drain(&mut rx_a)[0], "hello");
        assert_content(&drain(&mut rx_b)[0], "hello");

        room.request_transfer(b).await;
        assert_editing_user(&drain(&mut rx_a)[0], 2);
        assert_editing_user(&drain(&mut rx_b)[0], 2);

        room.submit_content(a, "ignored".to_string()).await;
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());

        room.submit_content(b, "hello world".to_string()).await;
        assert_content(&drain(&mut rx_a)[0], "hello world");
        assert_content(&drain(&mut rx_b)[0], "hello world");

        let (tx, _rx_c) = mpsc::unbounded_channel();
        assert!(matches!(room.join(CAPACITY, tx).await, JoinOutcome::Full));
    }
}
