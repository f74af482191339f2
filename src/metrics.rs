//! Periodic container resource metrics (SPEC_FULL.md §2): collects
//! `docker stats` the same way the rest of this codebase shells out to
//! `docker`, but pushes each sample over the IPC client instead of a
//! separate WebSocket connection — this system already has one transport
//! and metrics don't need a second.

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::{self, Duration};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::ipc::Client;
use crate::message::Message;

const METRICS_ROUTE: &str = "metrics.push";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub container_id: String,
    pub name: String,
    pub timestamp: i64,
    pub cpu_usage: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
}

/// Polls `docker stats` on an interval and pushes each container's sample
/// to the IPC endpoint identified by `client`. Runs until the process
/// exits; collection failures for one container are logged and skipped
/// rather than aborting the whole tick.
pub async fn run(client: Client, interval: Duration) -> AppResult<()> {
    let mut ticker = time::interval(interval);
    loop {
        ticker.tick().await;
        let container_ids = match running_container_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to list running containers");
                continue;
            }
        };

        for container_id in container_ids {
            match collect_container_metrics(&container_id).await {
                Ok(metrics) => {
                    if let Err(e) = push(&client, &metrics).await {
                        warn!(container_id, error = %e, "failed to push container metrics");
                    }
                }
                Err(e) => warn!(container_id, error = %e, "failed to collect container metrics"),
            }
        }
    }
}

async fn push(client: &Client, metrics: &ContainerMetrics) -> AppResult<()> {
    let mut msg = Message::new(METRICS_ROUTE);
    msg.set_json("metrics", metrics)?;
    client.send(msg, Some(Duration::from_secs(5))).await?;
    Ok(())
}

async fn running_container_ids() -> AppResult<Vec<String>> {
    let output = Command::new("docker")
        .args(["ps", "-q"])
        .output()
        .await
        .map_err(|e| AppError::internal(format!("failed to spawn docker: {e}")))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().map(str::to_string).collect())
}

async fn collect_container_metrics(container_id: &str) -> AppResult<ContainerMetrics> {
    let output = Command::new("docker")
        .args([
            "stats",
            container_id,
            "--no-stream",
            "--format",
            "{{.Container}}\t{{.Name}}\t{{.CPUPerc}}\t{{.MemUsage}}\t{{.NetIO}}",
        ])
        .output()
        .await
        .map_err(|e| AppError::internal(format!("failed to spawn docker: {e}")))?;

    let stats = String::from_utf8(output.stdout).map_err(|e| AppError::internal(e.to_string()))?;
    let parts: Vec<&str> = stats.trim().split('\t').collect();
    if parts.len() < 5 {
        return Err(AppError::internal("invalid docker stats format"));
    }

    let mem_parts: Vec<&str> = parts[3].split('/').collect();
    let memory_usage = parse_bytes(mem_parts[0])?;
    let memory_limit = parse_bytes(mem_parts.get(1).copied().unwrap_or("0"))?;

    let net_parts: Vec<&str> = parts[4].split('/').collect();
    let network_rx_bytes = parse_bytes(net_parts[0])?;
    let network_tx_bytes = parse_bytes(net_parts.get(1).copied().unwrap_or("0"))?;

    let cpu_usage = parts[2]
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok(ContainerMetrics {
        container_id: parts[0].to_string(),
        name: parts[1].to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        cpu_usage,
        memory_usage,
        memory_limit,
        network_rx_bytes,
        network_tx_bytes,
    })
}

fn parse_bytes(s: &str) -> AppResult<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }

    let parts: Vec<&str> = s.split_inclusive(char::is_alphabetic).collect();
    if parts.len() != 2 {
        return Err(AppError::internal(format!("invalid byte format: {s}")));
    }

    let number = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|e| AppError::internal(e.to_string()))?;
    let unit = parts[1].trim().to_uppercase();

    let multiplier = match unit.as_str() {
        "B" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        _ => return Err(AppError::internal(format!("unknown byte unit: {unit}"))),
    };

    Ok((number * multiplier) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_byte_units() {
        assert_eq!(parse_bytes("1.5KiB").unwrap(), 1536);
        assert_eq!(parse_bytes("2.5MiB").unwrap(), 2621440);
        assert_eq!(parse_bytes("1GiB").unwrap(), 1073741824);
        assert!(parse_bytes("invalid").is_err());
    }

    #[test]
    fn empty_field_is_zero() {
        assert_eq!(parse_bytes("").unwrap(), 0);
    }
}
