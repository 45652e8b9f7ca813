use std::sync::Arc;

use clap::Parser;
use roomcast::{api, ChatContext, Config, Relay, RoomRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let config = Config::parse();

    // Keep track of all rooms and their respective members
    let registry = Arc::new(RoomRegistry::new());
    let relay = Relay::new(registry).spawn();
    let context = ChatContext::new(relay, config.identity_resolver()?, config.outbox_capacity);

    let routes = api::build_filters(context);

    let (addr, server) =
        warp::serve(routes).try_bind_with_graceful_shutdown(config.bind, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for ctrl-c: {}", e);
            }
        })?;
    log::info!("listening on {}", addr);

    server.await;
    log::info!("shut down");
    Ok(())
}
