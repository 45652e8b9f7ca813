use std::{collections::HashMap, convert::Infallible, sync::Arc};

use serde::{Deserialize, Serialize};
use warp::{
    http::{HeaderMap, StatusCode},
    hyper::body::Bytes,
    Filter,
};

use crate::{
    identity::{Handshake, IdentityResolver},
    registry::RoomId,
    relay::RelayHandle,
    ws::client_connected,
};

/// Everything a request handler needs.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub relay: RelayHandle,
    pub identity: Arc<dyn IdentityResolver>,
    pub outbox_capacity: usize,
}

impl ChatContext {
    pub fn new(
        relay: RelayHandle,
        identity: Arc<dyn IdentityResolver>,
        outbox_capacity: usize,
    ) -> ChatContext {
        ChatContext {
            relay,
            identity,
            outbox_capacity,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CreateRoom {
    #[serde(default)]
    room_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatedRoom {
    room_id: RoomId,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct RoomMembers {
    room_id: String,
    members: Vec<String>,
}

fn with_context(
    context: ChatContext,
) -> impl Filter<Extract = (ChatContext,), Error = Infallible> + Clone {
    warp::any().map(move || context.clone())
}

fn mint_room(body: Bytes) -> warp::reply::WithStatus<warp::reply::Json> {
    let request: CreateRoom = if body.is_empty() {
        CreateRoom::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return warp::reply::with_status(
                    warp::reply::json(&ErrorBody {
                        error: e.to_string(),
                    }),
                    StatusCode::BAD_REQUEST,
                )
            }
        }
    };
    if matches!(&request.room_name, Some(name) if name.trim().is_empty()) {
        return warp::reply::with_status(
            warp::reply::json(&ErrorBody {
                error: "room_name must not be blank".to_owned(),
            }),
            StatusCode::BAD_REQUEST,
        );
    }

    let room_id = RoomId::generate();
    log::debug!("minted room id {} ({:?})", room_id, request.room_name);
    warp::reply::with_status(
        warp::reply::json(&CreatedRoom {
            room_id,
            room_name: request.room_name,
        }),
        StatusCode::CREATED,
    )
}

// POST /rooms [{room_name}] -> fresh room id; the room itself appears on
// first join. The name is only echoed back, rooms are known by id alone.
fn create_room() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("rooms")
        .and(warp::post())
        .and(warp::body::bytes())
        .map(mint_room)
}

async fn list_rooms(context: ChatContext) -> Result<impl warp::Reply, Infallible> {
    let rooms = context.relay.registry().rooms().await;
    Ok(warp::reply::json(&rooms))
}

// GET /rooms -> [{room_id, members}]
fn rooms(
    context: ChatContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("rooms")
        .and(warp::get())
        .and(with_context(context))
        .and_then(list_rooms)
}

async fn show_room(room_id: String, context: ChatContext) -> Result<impl warp::Reply, Infallible> {
    let mut members: Vec<String> = match RoomId::new(room_id.clone()) {
        Some(room) => context
            .relay
            .registry()
            .members_of(&room)
            .await
            .into_iter()
            .map(|member| member.identity.to_string())
            .collect(),
        None => Vec::new(),
    };
    members.sort();
    Ok(warp::reply::json(&RoomMembers { room_id, members }))
}

// GET /rooms/{room_id} -> {room_id, members: [username]}, names as currently
// attached to each member's session
fn room(
    context: ChatContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("rooms" / String)
        .and(warp::get())
        .and(with_context(context))
        .and_then(show_room)
}

async fn upgrade_connection(
    ws: warp::ws::Ws,
    query: HashMap<String, String>,
    headers: HeaderMap,
    context: ChatContext,
) -> Result<impl warp::Reply, Infallible> {
    let identity = context.identity.resolve(&Handshake { headers, query });
    // This will call our function if the handshake succeeds.
    Ok(ws.on_upgrade(move |socket| {
        client_connected(socket, identity, context.relay, context.outbox_capacity)
    }))
}

// GET /ws -> websocket upgrade
fn ws_upgrade(
    context: ChatContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("ws")
        // The `ws()` filter will prepare Websocket handshake...
        .and(warp::ws())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::headers_cloned())
        .and(with_context(context))
        .and_then(upgrade_connection)
}

pub fn build_filters(
    context: ChatContext,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    create_room()
        .or(rooms(context.clone()))
        .or(room(context.clone()))
        .or(ws_upgrade(context))
        .with(warp::log("roomcast"))
}

#[cfg(test)]
mod tests {
    use std::{future::Future, sync::Arc, time::Duration};

    use serde_json::{json, Value};
    use warp::test::WsClient;

    use super::{build_filters, ChatContext};
    use crate::{
        identity::QueryParam,
        registry::{RoomId, RoomRegistry},
        relay::Relay,
    };

    fn context() -> ChatContext {
        let relay = Relay::new(Arc::new(RoomRegistry::new())).spawn();
        ChatContext::new(relay, Arc::new(QueryParam("username".to_owned())), 16)
    }

    async fn connect(context: &ChatContext, path: &str) -> WsClient {
        warp::test::ws()
            .path(path)
            .handshake(build_filters(context.clone()))
            .await
            .expect("handshake")
    }

    async fn send(client: &mut WsClient, frame: Value) {
        client.send_text(frame.to_string()).await;
    }

    async fn recv(client: &mut WsClient) -> Value {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("websocket closed");
        serde_json::from_str(msg.to_str().expect("text frame")).unwrap()
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never held");
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    #[tokio::test]
    async fn create_room_endpoint() {
        let filter = build_filters(context());
        let reply = warp::test::request()
            .method("POST")
            .path("/rooms")
            .reply(&filter)
            .await;
        assert_eq!(reply.status(), 201);

        let body: Value = serde_json::from_slice(reply.body()).unwrap();
        let room_id = body["room_id"].as_str().unwrap();
        assert_eq!(room_id.len(), 36);
        assert!(body.get("room_name").is_none());

        let named = warp::test::request()
            .method("POST")
            .path("/rooms")
            .json(&json!({"room_name": "Lobby"}))
            .reply(&filter)
            .await;
        assert_eq!(named.status(), 201);
        let body: Value = serde_json::from_slice(named.body()).unwrap();
        assert_eq!(body["room_name"], "Lobby");
        assert_ne!(body["room_id"].as_str().unwrap(), room_id);

        let blank = warp::test::request()
            .method("POST")
            .path("/rooms")
            .json(&json!({"room_name": "  "}))
            .reply(&filter)
            .await;
        assert_eq!(blank.status(), 400);

        let garbage = warp::test::request()
            .method("POST")
            .path("/rooms")
            .body("{not json")
            .reply(&filter)
            .await;
        assert_eq!(garbage.status(), 400);

        let wrong_method = warp::test::request()
            .method("PUT")
            .path("/rooms")
            .reply(&filter)
            .await;
        assert_eq!(wrong_method.status(), 405);
    }

    #[tokio::test]
    async fn unknown_room_is_empty() {
        let filter = build_filters(context());
        let reply = warp::test::request()
            .path("/rooms/nowhere")
            .reply(&filter)
            .await;
        assert_eq!(reply.status(), 200);
        let body: Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(body, json!({"room_id": "nowhere", "members": []}));

        let too_deep = warp::test::request()
            .path("/rooms/a/b")
            .reply(&filter)
            .await;
        assert_eq!(too_deep.status(), 404);
    }

    #[tokio::test]
    async fn chat_upgrade_endpoint() {
        let context = context();
        assert!(warp::test::ws()
            .path("/ws")
            .handshake(build_filters(context.clone()))
            .await
            .is_ok());

        let no_ws = warp::test::ws()
            .path("/chat")
            .handshake(build_filters(context))
            .await;
        assert!(no_ws.is_err());
    }

    #[tokio::test]
    async fn room_conversation() {
        let context = context();
        let registry = context.relay.registry().clone();

        let mut a = connect(&context, "/ws?username=A").await;
        let mut b = connect(&context, "/ws?username=B").await;

        send(&mut a, json!({"event": "join", "data": {"room_id": "r1"}})).await;
        assert_eq!(
            recv(&mut a).await,
            json!({"event": "status", "data": {"username": "A", "message": "has joined the room."}})
        );

        send(&mut b, json!({"event": "join", "data": {"room_id": "r1"}})).await;
        let b_joined =
            json!({"event": "status", "data": {"username": "B", "message": "has joined the room."}});
        assert_eq!(recv(&mut a).await, b_joined);
        assert_eq!(recv(&mut b).await, b_joined);

        // dropped: no room named
        send(&mut a, json!({"event": "message", "data": {"message": "lost"}})).await;
        send(&mut a, json!({"event": "message", "data": {"room_id": "r1", "message": "hi"}})).await;
        let hi = json!({"event": "message", "data": {"username": "A", "message": "hi"}});
        assert_eq!(recv(&mut a).await, hi);
        assert_eq!(recv(&mut b).await, hi);

        let reply = warp::test::request()
            .path("/rooms/r1")
            .reply(&build_filters(context.clone()))
            .await;
        let body: Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(body, json!({"room_id": "r1", "members": ["A", "B"]}));

        send(&mut b, json!({"event": "leave", "data": {"room_id": "r1"}})).await;
        assert_eq!(
            recv(&mut a).await,
            json!({"event": "status", "data": {"username": "B", "message": "has left the room."}})
        );
        let members = registry.members_of(&room("r1")).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].identity.as_str(), "A");

        drop(a);
        eventually(|| {
            let registry = registry.clone();
            async move { !registry.contains(&room("r1")).await }
        })
        .await;
        assert!(registry.is_empty().await);

        let reply = warp::test::request()
            .path("/rooms")
            .reply(&build_filters(context))
            .await;
        let body: Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(body, json!([]));
    }
}
