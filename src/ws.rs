use futures::{SinkExt, StreamExt, TryFutureExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use warp::ws::WebSocket;

use crate::{event, identity::Identity, relay::RelayHandle, session::ConnectionSession};

/// Drives one websocket until the client goes away.
pub async fn client_connected(
    ws: WebSocket,
    identity: Option<Identity>,
    relay: RelayHandle,
    outbox_capacity: usize,
) {
    // Split the socket into a sender and receive of messages.
    let (mut client_ws_tx, mut client_ws_rx) = ws.split();

    // The outbox buffers events between the relay and the socket. It is
    // bounded so a client that stops reading eventually times out the relay's
    // sends instead of growing without limit.
    let (tx, rx) = mpsc::channel(outbox_capacity);
    let mut rx = ReceiverStream::new(rx);

    let mut session = ConnectionSession::new(relay, identity, tx);
    let my_id = session.id();
    log::info!("new chat client {}: {}", my_id, session.identity());

    tokio::task::spawn(async move {
        while let Some(event) = rx.next().await {
            let message = match event.to_message() {
                Ok(message) => message,
                Err(e) => {
                    log::error!("encode error(cid={}): {}", my_id, e);
                    continue;
                }
            };
            client_ws_tx
                .send(message)
                .unwrap_or_else(|e| {
                    log::warn!("websocket send error(cid={}): {}", my_id, e);
                })
                .await;
        }
    });

    while let Some(result) = client_ws_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("websocket error(cid={}): {}", my_id, e);
                break;
            }
        };
        if msg.is_close() {
            break;
        }
        // Skip pings and pongs...
        if msg.is_ping() || msg.is_pong() {
            continue;
        }
        let event = match event::decode(&msg) {
            Ok(Some(event)) => event,
            Ok(None) => {
                log::debug!("no room in frame from {}, dropped", my_id);
                continue;
            }
            Err(e) => {
                log::debug!("bad frame from {}: {}", my_id, e);
                continue;
            }
        };
        if let Err(e) = session.handle(event).await {
            log::error!("client {}: {}", my_id, e);
            break;
        }
    }

    // client_ws_rx stream will keep processing as long as the client stays
    // connected. Once they disconnect, then...
    log::info!("good bye client: {}", my_id);
    if let Err(e) = session.close().await {
        log::error!("client {} could not leave its rooms: {}", my_id, e);
    }
}
