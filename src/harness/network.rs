//! Harness adapter for the `network.*` routes (spec §4.9).

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::ipc::Server;
use crate::message::Message;
use crate::network::NetworkService;

pub fn register(server: &Server, network: Arc<NetworkService>) {
    {
        let network = network.clone();
        server.register("network.state", move |msg| {
            let network = network.clone();
            async move { state(&network, msg).await }
        });
    }
    {
        let network = network.clone();
        server.register("network.allocate", move |msg| {
            let network = network.clone();
            async move { allocate(&network, msg).await }
        });
    }
    {
        let network = network.clone();
        server.register("network.deallocate", move |msg| {
            let network = network.clone();
            async move { deallocate(&network, msg).await }
        });
    }
    {
        let network = network.clone();
        server.register("network.lookup", move |msg| {
            let network = network.clone();
            async move { lookup(&network, msg).await }
        });
    }
    server.register("network.disableAllocator", move |msg| {
        let network = network.clone();
        async move {
            network.disable_allocator().await;
            msg.reply()
        }
    });
}

async fn state(network: &NetworkService, request: Message) -> AppResult<Message> {
    let mut reply = request.reply()?;
    let state_str = match network.state().await {
        crate::network::NetworkState::Running => "running",
        crate::network::NetworkState::Disabled => "disabled",
    };
    reply.set("state", crate::message::Value::Str(state_str.to_string()));
    Ok(reply)
}

async fn allocate(network: &NetworkService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?;
    let allocation = network.allocate(name).await?;

    let mut reply = request.reply()?;
    reply.set_json("allocation", &allocation)?;
    Ok(reply)
}

async fn deallocate(network: &NetworkService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?;
    network.deallocate(name).await?;
    request.reply()
}

async fn lookup(network: &NetworkService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?;
    let allocation = network.lookup(name).await;

    let mut reply = request.reply()?;
    reply.set_json("allocation", &allocation)?;
    Ok(reply)
}
