//! Background loops that keep the registry fed and drained.
//!
//! * the report loop inspects local containers and sends a
//!   [`NodeRequest`] down a channel;
//! * the apply loop merges received reports into the registry;
//! * the sweep loop drops containers whose host stopped reporting;
//! * the router loop republishes routes of changed applications.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::inspector::ContainerInspector;
use crate::model::{Node, NodeRequest};
use crate::router::{sync_routes, RouteSink};
use crate::safe::SafeRealState;

pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Parses the `MemAvailable` line of `/proc/meminfo`, in bytes.
pub fn parse_mem_available(meminfo: &str) -> Option<u64> {
    let line = meminfo
        .lines()
        .find(|l| l.starts_with("MemAvailable:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    kb.checked_mul(1024)
}

/// Cutoff below which a container counts as stale. Saturates instead of
/// overflowing for TTLs beyond the `i64` range.
pub fn stale_cutoff(now: i64, ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    now.saturating_sub(ttl)
}

async fn mem_free() -> u64 {
    match tokio::fs::read_to_string("/proc/meminfo").await {
        Ok(meminfo) => parse_mem_available(&meminfo).unwrap_or_default(),
        Err(e) => {
            warn!("Failed to read /proc/meminfo: {}", e);
            0
        }
    }
}

/// Inspects local containers every `every` and sends the report.
/// Returns once the receiving side is gone.
pub async fn run_reporter<I>(
    inspector: I,
    node_ip: String,
    every: Duration,
    report_tx: mpsc::Sender<NodeRequest>,
) -> Result<()>
where
    I: ContainerInspector,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;

        let containers = match inspector.containers().await {
            Ok(containers) => containers,
            Err(e) => {
                error!("Inspection failed: {:#}. Retrying next cycle", anyhow!(e));
                continue;
            }
        };
        let req = NodeRequest {
            node: Node {
                ip: node_ip.clone(),
                mem_free: mem_free().await,
                update_at: epoch_secs(),
            },
            containers,
        };
        debug!("Reporting {}", req);

        if report_tx.send(req).await.is_err() {
            return Err(anyhow!("Report channel closed"));
        }
    }
}

/// Merges reports into the registry until the channel closes.
pub async fn run_applier(state: Arc<SafeRealState>, mut report_rx: mpsc::Receiver<NodeRequest>) {
    while let Some(req) = report_rx.recv().await {
        let tracked = state.apply_report(&req);
        debug!(
            "Tracked {} of {} containers from {}",
            tracked,
            req.containers.len(),
            req.node.ip
        );
    }
    info!("Report channel closed, shutting down");
}

/// Expires containers not seen within `ttl`, every `every`.
pub async fn run_sweeper(state: Arc<SafeRealState>, every: Duration, ttl: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let before = stale_cutoff(epoch_secs(), ttl);
        let removed = state.delete_stale(before);
        if removed > 0 {
            info!("Expired {} containers last seen before {}", removed, before);
        }
    }
}

/// Republishes changed routes every `every`.
pub async fn run_router<S>(state: Arc<SafeRealState>, sink: S, every: Duration)
where
    S: RouteSink,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        sync_routes(&state, &sink).await;
    }
}
