//! Room chat relay.
//!
//! Clients open a websocket, join rooms by id and every message sent to a
//! room is fanned out to everyone currently in it. Membership lives only in
//! memory; nothing is persisted.

pub mod api;
pub mod config;
pub mod event;
pub mod identity;
pub mod registry;
pub mod relay;
pub mod session;
pub mod ws;

pub use api::ChatContext;
pub use config::Config;
pub use event::{ChatEvent, ServerEvent};
pub use identity::{Identity, IdentityResolver};
pub use registry::{Connection, ConnectionId, RoomId, RoomRegistry};
pub use relay::{Broadcast, Relay, RelayHandle};
pub use session::ConnectionSession;
