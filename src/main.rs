use std::sync::Arc;

use container_hostd::config::HostConfig;
use container_hostd::containers::ContainersService;
use container_hostd::dns::composite::Composite;
use container_hostd::dns::container_lookup::ContainerLookup;
use container_hostd::dns::nxdomain::NxDomainResolver;
use container_hostd::dns::validator::StandardQueryValidator;
use container_hostd::dns::{DnsServer, Handler};
use container_hostd::harness;
use container_hostd::ipc::Server;
use container_hostd::network::NetworkService;
use container_hostd::plugins::supervisor::InMemorySupervisor;
use container_hostd::plugins::PluginsService;
use container_hostd::volumes::{Mkfs, VolumesService};
use container_hostd::{error::AppResult, logging};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> AppResult<()> {
    logging::init();
    let config = HostConfig::from_env()?;
    info!(socket = %config.socket_path.display(), "starting container-hostd");

    let containers = Arc::new(ContainersService::new());
    let network = Arc::new(NetworkService::new());
    let volumes = Arc::new(VolumesService::open(config.volumes_dir(), Arc::new(Mkfs)).await?);
    let plugins = Arc::new(PluginsService::new(config.plugin_dirs.clone(), InMemorySupervisor::new()));

    let ipc_server = Server::new(&config.socket_path)?;
    harness::register_all(&ipc_server, containers, volumes, plugins, network.clone());
    let ipc_handle = ipc_server.spawn()?;
    info!(path = %ipc_handle.path().display(), "ipc server listening");

    let dns_root: Arc<dyn Handler> = Arc::new(StandardQueryValidator::new(Composite::new(vec![
        Box::new(ContainerLookup::new((*network).clone())),
        Box::new(NxDomainResolver::default()),
    ])));
    let dns_server = DnsServer::new(dns_root);
    let (dns_shutdown_tx, dns_shutdown_rx) = watch::channel(false);
    let dns_listen = config.dns_listen.clone();
    let dns_task = tokio::spawn(async move {
        if let Err(e) = dns_server.serve(&dns_listen, dns_shutdown_rx).await {
            tracing::error!(error = %e, "dns server exited");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| container_hostd::error::AppError::internal(format!("failed to wait for ctrl-c: {e}")))?;

    info!("shutting down");
    let _ = dns_shutdown_tx.send(true);
    let _ = dns_task.await;
    ipc_handle.shutdown().await;
    Ok(())
}
