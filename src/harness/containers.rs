//! Harness adapter for the `containers.*` routes (spec §4.9). `logs` and
//! `event` are opaque to this core per spec §1/§4.8 and reply
//! `unsupported` rather than modeling the real sandbox event stream.

use std::sync::Arc;

use crate::containers::{Container, ContainersService};
use crate::error::{AppError, AppResult};
use crate::ipc::Server;
use crate::message::Message;

pub fn register(server: &Server, containers: Arc<ContainersService>) {
    {
        let containers = containers.clone();
        server.register("containers.list", move |msg| {
            let containers = containers.clone();
            async move { list(&containers, msg).await }
        });
    }
    {
        let containers = containers.clone();
        server.register("containers.create", move |msg| {
            let containers = containers.clone();
            async move { create(&containers, msg).await }
        });
    }
    {
        let containers = containers.clone();
        server.register("containers.delete", move |msg| {
            let containers = containers.clone();
            async move { delete(&containers, msg).await }
        });
    }
    server.register("containers.logs", |msg| async move { unsupported(msg, "logs") });
    server.register("containers.event", |msg| async move { unsupported(msg, "event") });
}

async fn list(containers: &ContainersService, request: Message) -> AppResult<Message> {
    let mut reply = request.reply()?;
    reply.set_json("containers", &containers.list().await)?;
    Ok(reply)
}

async fn create(containers: &ContainersService, request: Message) -> AppResult<Message> {
    let container: Container = request
        .get_json("containerConfig")?
        .ok_or_else(|| AppError::invalid_argument("missing required field containerConfig"))?;
    containers.create(container).await?;
    request.reply()
}

async fn delete(containers: &ContainersService, request: Message) -> AppResult<Message> {
    let id = request
        .get_str("id")
        .ok_or_else(|| AppError::invalid_argument("missing required field id"))?;
    containers.delete(id).await?;
    request.reply()
}

fn unsupported(_request: Message, what: &str) -> AppResult<Message> {
    Err(AppError::unsupported(format!("containers.{what} is not implemented by this core")))
}
