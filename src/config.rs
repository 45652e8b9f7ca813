use std::{net::SocketAddr, sync::Arc};

use clap::{Parser, ValueEnum};
use thiserror::Error;
use warp::http::header::{HeaderName, InvalidHeaderName};

use crate::identity::{Anonymous, Header, IdentityResolver, QueryParam};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdentitySource {
    /// `?<key>=name` on the websocket url
    Query,
    /// `<key>: name` header set by a fronting proxy
    Header,
    /// everyone is "Unknown User"
    Anonymous,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid identity header: {0}")]
    Header(#[from] InvalidHeaderName),
}

/// Room chat relay over websockets.
#[derive(Debug, Clone, Parser)]
#[command(name = "roomcast", version)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "ROOMCAST_BIND", default_value = "127.0.0.1:3030")]
    pub bind: SocketAddr,

    /// Outbound events buffered per connection. A client that falls this far
    /// behind misses events until it catches up.
    #[arg(long, env = "ROOMCAST_OUTBOX_CAPACITY", default_value_t = 64)]
    pub outbox_capacity: usize,

    /// Where the display name of a connecting client comes from
    #[arg(long, env = "ROOMCAST_IDENTITY_SOURCE", value_enum, default_value_t = IdentitySource::Query)]
    pub identity_source: IdentitySource,

    /// Query parameter or header name carrying the display name
    #[arg(long, env = "ROOMCAST_IDENTITY_KEY", default_value = "username")]
    pub identity_key: String,
}

impl Config {
    pub fn identity_resolver(&self) -> Result<Arc<dyn IdentityResolver>, ConfigError> {
        Ok(match self.identity_source {
            IdentitySource::Query => Arc::new(QueryParam(self.identity_key.clone())),
            IdentitySource::Header => {
                Arc::new(Header(HeaderName::from_bytes(self.identity_key.as_bytes())?))
            }
            IdentitySource::Anonymous => Arc::new(Anonymous),
        })
    }
}
