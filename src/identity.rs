use std::{collections::HashMap, fmt};

use serde::Serialize;
use warp::http::{header::HeaderName, HeaderMap};

/// Display name used when the session layer supplied none.
pub const UNKNOWN_USER: &str = "Unknown User";

/// A connection's display name. Not unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Blank names fall back to [`UNKNOWN_USER`].
    pub fn new(name: impl Into<String>) -> Identity {
        let name = name.into();
        if name.trim().is_empty() {
            Identity::default()
        } else {
            Identity(name)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity(UNKNOWN_USER.to_owned())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the websocket upgrade request carried.
#[derive(Debug, Default)]
pub struct Handshake {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
}

/// Maps an upgrade request to a display name. Authentication lives in front
/// of this service; resolvers only read what that layer forwarded.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, handshake: &Handshake) -> Option<Identity>;
}

impl fmt::Debug for dyn IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{IdentityResolver}}")
    }
}

/// Reads the name from a query parameter, e.g. `/ws?username=alice`.
#[derive(Debug, Clone)]
pub struct QueryParam(pub String);

impl IdentityResolver for QueryParam {
    fn resolve(&self, handshake: &Handshake) -> Option<Identity> {
        handshake
            .query
            .get(&self.0)
            .filter(|name| !name.trim().is_empty())
            .map(Identity::new)
    }
}

/// Reads the name from a request header set by a fronting proxy.
#[derive(Debug, Clone)]
pub struct Header(pub HeaderName);

impl IdentityResolver for Header {
    fn resolve(&self, handshake: &Handshake) -> Option<Identity> {
        handshake
            .headers
            .get(&self.0)
            .and_then(|value| value.to_str().ok())
            .filter(|name| !name.trim().is_empty())
            .map(Identity::new)
    }
}

/// Everyone is [`UNKNOWN_USER`].
#[derive(Debug, Clone, Copy)]
pub struct Anonymous;

impl IdentityResolver for Anonymous {
    fn resolve(&self, _handshake: &Handshake) -> Option<Identity> {
        None
    }
}
