//! Harness adapter for the `plugins.*` routes (spec §4.9).

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::ipc::Server;
use crate::message::Message;
use crate::plugins::PluginsService;

pub fn register(server: &Server, plugins: Arc<PluginsService>) {
    {
        let plugins = plugins.clone();
        server.register("plugins.list", move |msg| {
            let plugins = plugins.clone();
            async move { list(&plugins, msg).await }
        });
    }
    {
        let plugins = plugins.clone();
        server.register("plugins.get", move |msg| {
            let plugins = plugins.clone();
            async move { get(&plugins, msg).await }
        });
    }
    {
        let plugins = plugins.clone();
        server.register("plugins.load", move |msg| {
            let plugins = plugins.clone();
            async move { load(&plugins, msg).await }
        });
    }
    {
        let plugins = plugins.clone();
        server.register("plugins.restart", move |msg| {
            let plugins = plugins.clone();
            async move { restart(&plugins, msg).await }
        });
    }
    server.register("plugins.unload", move |msg| {
        let plugins = plugins.clone();
        async move { unload(&plugins, msg).await }
    });
}

fn instance_id(request: &Message) -> Option<String> {
    request.get_str("instanceId").map(str::to_owned)
}

async fn list(plugins: &PluginsService, request: Message) -> AppResult<Message> {
    let mut reply = request.reply()?;
    reply.set_json("plugins", &plugins.list().await)?;
    Ok(reply)
}

async fn get(plugins: &PluginsService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?;
    let plugin = plugins.get(name).await?;

    let mut reply = request.reply()?;
    reply.set_json("plugin", &plugin)?;
    Ok(reply)
}

async fn load(plugins: &PluginsService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?
        .to_string();
    let instance = instance_id(&request);
    plugins.load(&name, instance.as_deref()).await?;
    request.reply()
}

async fn restart(plugins: &PluginsService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?
        .to_string();
    let instance = instance_id(&request);
    plugins.restart(&name, instance.as_deref()).await?;
    request.reply()
}

async fn unload(plugins: &PluginsService, request: Message) -> AppResult<Message> {
    let name = request
        .get_str("name")
        .ok_or_else(|| AppError::invalid_argument("missing required field name"))?
        .to_string();
    let instance = instance_id(&request);
    plugins.unload(&name, instance.as_deref()).await?;
    request.reply()
}
