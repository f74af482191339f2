//! Harness Adapters (spec §4.9): thin per-service glue mapping IPC routes
//! to service operations. Each submodule owns one namespace from the
//! route table in spec §4.9.

pub mod containers;
pub mod network;
pub mod plugins;
pub mod volumes;

use std::sync::Arc;

use crate::containers::ContainersService;
use crate::ipc::Server;
use crate::network::NetworkService;
use crate::plugins::PluginsService;
use crate::volumes::VolumesService;

/// Registers every harness namespace against `server`.
pub fn register_all(
    server: &Server,
    containers_service: Arc<ContainersService>,
    volumes_service: Arc<VolumesService>,
    plugins_service: Arc<PluginsService>,
    network_service: Arc<NetworkService>,
) {
    containers::register(server, containers_service.clone());
    volumes::register(server, volumes_service, containers_service);
    plugins::register(server, plugins_service);
    network::register(server, network_service);
}
