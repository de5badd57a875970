use async_trait::async_trait;
use thiserror::Error;

use crate::model::ContainerDto;

pub mod docker;
pub use docker::{DockerEndpoint, DockerInspector};

/// Failures that abort a whole inspection cycle on one host.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("unsupported container runtime endpoint: {0}")]
    Endpoint(String),

    #[error("failed to connect to container runtime")]
    Connect(#[source] bollard::errors::Error),

    #[error("failed to list containers")]
    List(#[source] bollard::errors::Error),
}

#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Snapshot every application container running on this host.
    /// Containers that cannot be inspected are skipped.
    async fn containers(&self) -> Result<Vec<ContainerDto>, InspectError>;
}
