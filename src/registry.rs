use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::{event::ServerEvent, identity::Identity};

/// Our global unique connection id counter.
static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(1);

/// Opaque room token. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Returns `None` for an empty id.
    pub fn new(id: impl Into<String>) -> Option<RoomId> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(RoomId(id))
        }
    }

    /// Mints a fresh id for a room that doesn't exist yet.
    pub fn generate() -> RoomId {
        RoomId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(usize);

impl ConnectionId {
    fn next() -> ConnectionId {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered member of a room: who it is and where its outbound events go.
///
/// The stored identity follows [`RoomRegistry::rename`].
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Identity,
    pub outbox: mpsc::Sender<ServerEvent>,
}

impl Connection {
    /// Allocates a new connection id.
    pub fn new(identity: Identity, outbox: mpsc::Sender<ServerEvent>) -> Connection {
        Connection {
            id: ConnectionId::next(),
            identity,
            outbox,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub members: usize,
}

/// Our state of currently occupied rooms.
///
/// - Key is the room id
/// - Value is the room's members keyed by connection id
type Rooms = HashMap<RoomId, HashMap<ConnectionId, Connection>>;

/// Room membership. Every method takes the lock once and never awaits while
/// holding it.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<Rooms>,
}

impl RoomRegistry {
    pub fn new() -> RoomRegistry {
        RoomRegistry::default()
    }

    /// Adds `connection` to `room`, creating the room if needed.
    ///
    /// Returns `false` if the connection was already a member; its stored
    /// snapshot is refreshed either way.
    pub async fn register(&self, room: &RoomId, connection: Connection) -> bool {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.clone()).or_insert_with(|| {
            log::debug!("room created: {}", room);
            HashMap::new()
        });
        members.insert(connection.id, connection).is_none()
    }

    /// Removes the connection from `room`, dropping the room once empty.
    ///
    /// Returns whether the connection was a member.
    pub async fn unregister(&self, room: &RoomId, id: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&id).is_some();
        if members.is_empty() {
            rooms.remove(room);
            log::debug!("room destroyed: {}", room);
        }
        removed
    }

    /// Snapshot of the current members. Unknown rooms have no members.
    pub async fn members_of(&self, room: &RoomId) -> Vec<Connection> {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Updates the stored identity of `id` in each of `rooms` it belongs to.
    pub async fn rename(&self, rooms: &[RoomId], id: ConnectionId, identity: &Identity) {
        let mut all = self.rooms.write().await;
        for room in rooms {
            if let Some(member) = all.get_mut(room).and_then(|members| members.get_mut(&id)) {
                member.identity = identity.clone();
            }
        }
    }

    pub async fn contains(&self, room: &RoomId) -> bool {
        self.rooms.read().await.contains_key(room)
    }

    pub async fn rooms(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> = self
            .rooms
            .read()
            .await
            .iter()
            .map(|(room_id, members)| RoomSummary {
                room_id: room_id.clone(),
                members: members.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }

    /// Number of live rooms.
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
