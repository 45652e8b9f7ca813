use serde::{Deserialize, Serialize};
use thiserror::Error;
use warp::ws::Message;

use crate::{identity::Identity, registry::RoomId};

pub const JOINED: &str = "has joined the room.";
pub const LEFT: &str = "has left the room.";

/// An inbound chat event. A room is always present; frames without one never
/// become events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Join { room: RoomId },
    Leave { room: RoomId },
    Message { room: RoomId, text: String },
}

impl ChatEvent {
    pub fn room(&self) -> &RoomId {
        match self {
            ChatEvent::Join { room } | ChatEvent::Leave { room } | ChatEvent::Message { room, .. } => {
                room
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomPayload {
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Wire form of an inbound event: `{"event": "join", "data": {"room_id": "..."}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientFrame {
    Join(RoomPayload),
    Leave(RoomPayload),
    Message(MessagePayload),
}

impl ClientFrame {
    /// `None` when the room id is missing or empty.
    pub fn into_event(self) -> Option<ChatEvent> {
        match self {
            ClientFrame::Join(p) => Some(ChatEvent::Join {
                room: RoomId::new(p.room_id?)?,
            }),
            ClientFrame::Leave(p) => Some(ChatEvent::Leave {
                room: RoomId::new(p.room_id?)?,
            }),
            ClientFrame::Message(p) => Some(ChatEvent::Message {
                room: RoomId::new(p.room_id?)?,
                text: p.message.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("not a text frame")]
    NotText,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Decodes a websocket frame. `Ok(None)` means the frame was well formed but
/// named no room, and is to be dropped.
pub fn decode(msg: &Message) -> Result<Option<ChatEvent>, FrameError> {
    let text = msg.to_str().map_err(|_| FrameError::NotText)?;
    let frame: ClientFrame = serde_json::from_str(text)?;
    Ok(frame.into_event())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub username: String,
    pub message: String,
}

/// Outbound events, encoded like the inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerEvent {
    Status(Notice),
    Message(Notice),
}

impl ServerEvent {
    pub fn status(identity: &Identity, message: &str) -> ServerEvent {
        ServerEvent::Status(Notice {
            username: identity.to_string(),
            message: message.to_owned(),
        })
    }

    pub fn message(identity: &Identity, text: String) -> ServerEvent {
        ServerEvent::Message(Notice {
            username: identity.to_string(),
            message: text,
        })
    }

    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::text(serde_json::to_string(self)?))
    }
}
