use tokio::sync::mpsc;

use crate::{
    event::{ChatEvent, ServerEvent},
    identity::Identity,
    registry::{Connection, ConnectionId, RoomId},
    relay::{Broadcast, RelayError, RelayHandle},
};

/// One client's presence. Rooms are kept in join order; a connection may sit
/// in several rooms at once.
#[derive(Debug)]
pub struct ConnectionSession {
    connection: Connection,
    rooms: Vec<RoomId>,
    relay: RelayHandle,
}

impl ConnectionSession {
    pub fn new(
        relay: RelayHandle,
        identity: Option<Identity>,
        outbox: mpsc::Sender<ServerEvent>,
    ) -> ConnectionSession {
        ConnectionSession {
            connection: Connection::new(identity.unwrap_or_default(), outbox),
            rooms: Vec::new(),
            relay,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id
    }

    pub fn identity(&self) -> &Identity {
        &self.connection.identity
    }

    /// Takes effect for subsequent events and for the rooms already joined.
    pub async fn attach_identity(&mut self, name: impl Into<String>) {
        self.connection.identity = Identity::new(name);
        self.relay
            .registry()
            .rename(&self.rooms, self.connection.id, &self.connection.identity)
            .await;
    }

    /// The room most recently joined and not yet left.
    pub fn current_room(&self) -> Option<&RoomId> {
        self.rooms.last()
    }

    pub fn rooms(&self) -> &[RoomId] {
        &self.rooms
    }

    pub async fn handle(&mut self, event: ChatEvent) -> Result<Broadcast, RelayError> {
        let room = event.room().clone();
        let is_join = matches!(event, ChatEvent::Join { .. });
        let is_leave = matches!(event, ChatEvent::Leave { .. });

        let report = self.relay.dispatch(self.connection.clone(), event).await?;

        if is_join || is_leave {
            self.rooms.retain(|r| *r != room);
        }
        if is_join {
            self.rooms.push(room);
        }
        Ok(report)
    }

    /// Leaves every room, most recent first.
    pub async fn close(mut self) -> Result<(), RelayError> {
        while let Some(room) = self.rooms.pop() {
            self.relay
                .dispatch(self.connection.clone(), ChatEvent::Leave { room })
                .await?;
        }
        log::debug!("session {} closed", self.connection.id);
        Ok(())
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        if self.rooms.is_empty() {
            return;
        }
        log::warn!(
            "session {} dropped without closing, leaving {} room(s)",
            self.connection.id,
            self.rooms.len()
        );
        while let Some(room) = self.rooms.pop() {
            if self
                .relay
                .enqueue(self.connection.clone(), ChatEvent::Leave { room })
                .is_err()
            {
                break;
            }
        }
    }
}
