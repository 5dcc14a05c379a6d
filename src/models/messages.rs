use serde::{Deserialize, Serialize};

use crate::ws::room::ParticipantId;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomMessage {
    pub room_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ContentChangeMessage {
    pub room_id: String,
    pub content: String,
    /// Last typed character. Advisory only, carries no protocol authority.
    #[serde(default)]
    pub last_char: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionMessage {
    pub room_id: String,
}

/// Messages a client may send over its WebSocket connection.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "joinRoom")]
    JoinRoom(JoinRoomMessage),
    #[serde(rename = "contentChange")]
    ContentChange(ContentChangeMessage),
    #[serde(rename = "requestEditPermission")]
    RequestEditPermission(RequestPermissionMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserIdMessage {
    pub participant_id: ParticipantId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitialContentMessage {
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ContentBroadcastMessage {
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SetEditingUserMessage {
    pub participant_id: ParticipantId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}

/// Messages the server delivers to clients, unicast or broadcast.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "userId")]
    UserId(UserIdMessage),
    #[serde(rename = "roomFull")]
    RoomFull,
    #[serde(rename = "initialContent")]
    InitialContent(InitialContentMessage),
    #[serde(rename = "contentChange")]
    ContentChange(ContentBroadcastMessage),
    #[serde(rename = "setEditingUser")]
    SetEditingUser(SetEditingUserMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}
