//! Harness adapter for the `volumes.*` routes (spec §4.9).

use std::collections::HashMap;
use std::sync::Arc;

use crate::containers::ContainersService;
use crate::error::{AppError, AppResult};
use crate::ipc::Server;
use crate::message::Message;
use crate::volumes::{Volume, VolumesService};

pub fn register(server: &Server, volumes: Arc<VolumesService>, containers: Arc<ContainersService>) {
    {
        let volumes = volumes.clone();
        server.register("volumes.list", move |msg| {
            let volumes = volumes.clone();
            async move { list(&volumes, msg).await }
        });
    }
    {
        let volumes = volumes.clone();
        server.register("volumes.create", move |msg| {
            let volumes = volumes.clone();
            async move { create(&volumes, msg).await }
        });
    }
    {
        let volumes = volumes.clone();
        server.register("volumes.inspect", move |msg| {
            let volumes = volumes.clone();
            async move { inspect(&volumes, msg).await }
        });
    }
    server.register("volumes.delete", move |msg| {
        let volumes = volumes.clone();
        let containers = containers.clone();
        async move { delete(&volumes, &containers, msg).await }
    });
}

async fn list(volumes: &VolumesService, request: Message) -> AppResult<Message> {
    let mut reply = request.reply()?;
    reply.set_json("volumes", &volumes.list().await)?;
    Ok(reply)
}

async fn create(volumes: &VolumesService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?;
    let driver = request.get_str("driver");
    let labels: HashMap<String, String> = request.get_json("volumeLabels")?.unwrap_or_default();
    let driver_opts: HashMap<String, String> = request.get_json("volumeDriverOpts")?.unwrap_or_default();

    let volume: Volume = volumes.create(name, driver, driver_opts, labels).await?;

    let mut reply = request.reply()?;
    reply.set_json("volume", &volume)?;
    Ok(reply)
}

async fn inspect(volumes: &VolumesService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?;
    let volume = volumes.inspect(name).await?;

    let mut reply = request.reply()?;
    reply.set_json("volume", &volume)?;
    Ok(reply)
}

async fn delete(volumes: &VolumesService, containers: &ContainersService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?
        .to_string();
    volumes.delete(&name, containers).await?;
    request.reply()
}
