use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError, UnboundedReceiver, UnboundedSender},
    oneshot,
};

use crate::{
    event::{ChatEvent, ServerEvent, JOINED, LEFT},
    registry::{Connection, ConnectionId, RoomId, RoomRegistry},
};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("recipient {0} outbox is full, event dropped")]
    Full(ConnectionId),
    #[error("recipient {0} has gone away")]
    Closed(ConnectionId),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay task is not running")]
    Stopped,
}

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Broadcast {
    pub recipients: usize,
    pub delivered: usize,
}

impl Broadcast {
    pub fn failed(&self) -> usize {
        self.recipients - self.delivered
    }
}

/// Turns chat events into registry updates and room broadcasts.
#[derive(Debug, Clone)]
pub struct Relay {
    registry: Arc<RoomRegistry>,
}

impl Relay {
    pub fn new(registry: Arc<RoomRegistry>) -> Relay {
        Relay { registry }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Applies `event` on behalf of `from` and broadcasts the result to the
    /// room. Everyone in the room hears it, `from` included.
    pub async fn process(&self, from: &Connection, event: ChatEvent) -> Broadcast {
        match event {
            ChatEvent::Join { room } => {
                self.registry.register(&room, from.clone()).await;
                log::info!("{} ({}) joined {}", from.identity, from.id, room);
                self.broadcast(&room, ServerEvent::status(&from.identity, JOINED))
                    .await
            }
            ChatEvent::Leave { room } => {
                self.registry.unregister(&room, from.id).await;
                log::info!("{} ({}) left {}", from.identity, from.id, room);
                self.broadcast(&room, ServerEvent::status(&from.identity, LEFT))
                    .await
            }
            ChatEvent::Message { room, text } => {
                self.broadcast(&room, ServerEvent::message(&from.identity, text))
                    .await
            }
        }
    }

    /// Delivers `event` to a snapshot of the room's members. Delivery never
    /// waits: a recipient whose outbox is full or closed misses the event.
    pub async fn broadcast(&self, room: &RoomId, event: ServerEvent) -> Broadcast {
        let members = self.registry.members_of(room).await;
        if members.is_empty() {
            log::debug!("nobody in {}, dropping {:?}", room, event);
            return Broadcast::default();
        }

        let mut report = Broadcast {
            recipients: members.len(),
            delivered: 0,
        };
        for member in &members {
            match deliver(member, event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => log::warn!("delivery in {} failed: {}", room, e),
            }
        }
        report
    }

    /// Moves the relay onto its own task. Events from every handle are
    /// processed one at a time in the order they were queued. The task ends
    /// once the last handle is dropped.
    pub fn spawn(self) -> RelayHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = RelayHandle {
            tx,
            registry: self.registry.clone(),
        };
        tokio::task::spawn(self.run(rx));
        handle
    }

    async fn run(self, mut rx: UnboundedReceiver<Command>) {
        while let Some(Command { from, event, done }) = rx.recv().await {
            let report = self.process(&from, event).await;
            if let Some(done) = done {
                // caller may have given up waiting
                let _ = done.send(report);
            }
        }
        log::debug!("relay stopped");
    }
}

fn deliver(to: &Connection, event: ServerEvent) -> Result<(), DeliveryError> {
    to.outbox.try_send(event).map_err(|e| match e {
        TrySendError::Full(_) => DeliveryError::Full(to.id),
        TrySendError::Closed(_) => DeliveryError::Closed(to.id),
    })
}

#[derive(Debug)]
struct Command {
    from: Connection,
    event: ChatEvent,
    done: Option<oneshot::Sender<Broadcast>>,
}

/// Cheap, cloneable entry point into a spawned [`Relay`].
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: UnboundedSender<Command>,
    registry: Arc<RoomRegistry>,
}

impl RelayHandle {
    /// Queues `event` and waits until the relay has broadcast it.
    pub async fn dispatch(&self, from: Connection, event: ChatEvent) -> Result<Broadcast, RelayError> {
        let (done, report) = oneshot::channel();
        self.tx
            .send(Command {
                from,
                event,
                done: Some(done),
            })
            .map_err(|_| RelayError::Stopped)?;
        report.await.map_err(|_| RelayError::Stopped)
    }

    /// Queues `event` without waiting for it.
    pub fn enqueue(&self, from: Connection, event: ChatEvent) -> Result<(), RelayError> {
        self.tx
            .send(Command {
                from,
                event,
                done: None,
            })
            .map_err(|_| RelayError::Stopped)
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}
