//! Router sync.
//!
//! Publishes the route table of every application whose dirty bit is
//! set, then clears the bit. A failed publish leaves the bit set so the
//! next cycle retries.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;

use crate::model::Container;
use crate::safe::SafeRealState;

#[async_trait]
pub trait RouteSink: Send + Sync {
    /// Replace the published routes of `app` with `containers`.
    async fn publish(&self, app: &str, containers: &[Container]) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
struct RouteTable<'a> {
    app: &'a str,
    routes: Vec<String>,
}

/// `ip:port` of every container's primary port.
pub fn routes_of(containers: &[Container]) -> Vec<String> {
    let mut routes: Vec<String> = containers
        .iter()
        .filter_map(|c| c.primary_port().map(|port| format!("{}:{}", c.ip, port)))
        .collect();
    routes.sort();
    routes
}

/// Writes route tables to the log as JSON.
#[derive(Debug, Default)]
pub struct LogRouteSink;

#[async_trait]
impl RouteSink for LogRouteSink {
    async fn publish(&self, app: &str, containers: &[Container]) -> anyhow::Result<()> {
        let table = RouteTable {
            app,
            routes: routes_of(containers),
        };
        info!("Publishing routes: {}", serde_json::to_string(&table)?);
        Ok(())
    }
}

/// Runs one sync pass over every application. Returns how many apps were
/// published.
pub async fn sync_routes<S>(state: &SafeRealState, sink: &S) -> usize
where
    S: RouteSink + ?Sized,
{
    let mut published = 0;
    for name in state.keys() {
        let Some(app) = state.get_safe_app(&name) else {
            continue;
        };
        if !app.is_need_update_router() {
            continue;
        }

        let containers = app.containers();
        match sink.publish(&name, &containers).await {
            Ok(()) => {
                app.need_update_router(false);
                published += 1;
            }
            Err(e) => {
                warn!("Failed to publish routes for {}: {}", name, e);
            }
        }
    }
    debug!("Router sync published {} apps", published);
    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Port;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<HashMap<String, Vec<String>>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl RouteSink for RecordingSink {
        async fn publish(&self, app: &str, containers: &[Container]) -> anyhow::Result<()> {
            if self.fail_for.as_deref() == Some(app) {
                anyhow::bail!("store unavailable");
            }
            self.published
                .lock()
                .unwrap()
                .insert(app.to_string(), routes_of(containers));
            Ok(())
        }
    }

    fn container(app: &str, ip: &str, id: &str, port: u16) -> Container {
        Container {
            id: id.into(),
            ip: ip.into(),
            image: format!("{}:1", app),
            app_name: app.into(),
            ports: vec![Port::new(port), Port::new(9999)],
            status: "Up".into(),
            update_at: 1,
        }
    }

    #[tokio::test]
    async fn dirty_apps_are_published_then_cleared() {
        let state = SafeRealState::new();
        state.update_container(container("web", "10.0.0.2", "b", 81));
        state.update_container(container("web", "10.0.0.1", "a", 80));
        let sink = RecordingSink::default();

        assert_eq!(sync_routes(&state, &sink).await, 1);
        assert_eq!(
            sink.published.lock().unwrap()["web"],
            vec!["10.0.0.1:80", "10.0.0.2:81"]
        );
        assert!(!state.get_safe_app("web").unwrap().is_need_update_router());

        // nothing changed, nothing to publish
        assert_eq!(sync_routes(&state, &sink).await, 0);
    }

    #[tokio::test]
    async fn failed_publish_keeps_app_dirty() {
        let state = SafeRealState::new();
        state.update_container(container("web", "10.0.0.1", "a", 80));
        state.update_container(container("api", "10.0.0.1", "c", 90));
        let sink = RecordingSink {
            fail_for: Some("api".into()),
            ..Default::default()
        };

        assert_eq!(sync_routes(&state, &sink).await, 1);
        assert!(state.get_safe_app("api").unwrap().is_need_update_router());
        assert!(!state.get_safe_app("web").unwrap().is_need_update_router());
    }

    #[tokio::test]
    async fn emptied_app_publishes_empty_table() {
        let state = SafeRealState::new();
        state.update_container(container("web", "10.0.0.1", "a", 80));
        let sink = RecordingSink::default();
        sync_routes(&state, &sink).await;

        state.delete_by_ip("10.0.0.1");
        assert_eq!(sync_routes(&state, &sink).await, 1);
        assert!(sink.published.lock().unwrap()["web"].is_empty());
    }

    #[tokio::test]
    async fn log_sink_accepts_any_table() {
        let sink = LogRouteSink;
        sink.publish("web", &[container("web", "10.0.0.1", "a", 80)])
            .await
            .unwrap();
    }
}
