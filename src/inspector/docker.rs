use super::{ContainerInspector, InspectError};
use crate::model::{ContainerDto, Port};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::Docker;
use log::{debug, error};

/// Environment variable naming the application a container belongs to.
const APP_NAME_ENV: &str = "APP_NAME=";

/// Seconds before a request to the Docker daemon times out.
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// How to reach the Docker daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    /// Socket or `DOCKER_HOST` resolved by bollard.
    LocalDefaults,
    Unix(String),
    Http(String),
}

impl DockerEndpoint {
    /// Picks the connection method from the endpoint's URL scheme.
    pub fn parse(endpoint: Option<&str>) -> Result<Self, InspectError> {
        let Some(endpoint) = endpoint.map(str::trim).filter(|e| !e.is_empty()) else {
            return Ok(DockerEndpoint::LocalDefaults);
        };
        if endpoint.starts_with("unix://") {
            Ok(DockerEndpoint::Unix(endpoint.to_string()))
        } else if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") {
            Ok(DockerEndpoint::Http(endpoint.to_string()))
        } else {
            Err(InspectError::Endpoint(endpoint.to_string()))
        }
    }
}

pub struct DockerInspector {
    docker: Docker,
}

impl DockerInspector {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the Docker daemon at `endpoint`, or to the local daemon
    /// using default settings when none is given.
    pub fn connect(endpoint: Option<&str>) -> Result<Self, InspectError> {
        let docker = match DockerEndpoint::parse(endpoint)? {
            DockerEndpoint::LocalDefaults => Docker::connect_with_local_defaults(),
            #[cfg(unix)]
            DockerEndpoint::Unix(path) => {
                Docker::connect_with_unix(
                    &path,
                    DOCKER_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )
            }
            #[cfg(not(unix))]
            DockerEndpoint::Unix(path) => return Err(InspectError::Endpoint(path)),
            DockerEndpoint::Http(addr) => {
                Docker::connect_with_http(
                    &addr,
                    DOCKER_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )
            }
        };
        docker.map(Self::new).map_err(InspectError::Connect)
    }
}

#[async_trait]
impl ContainerInspector for DockerInspector {
    async fn containers(&self) -> Result<Vec<ContainerDto>, InspectError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(opts))
            .await
            .map_err(InspectError::List)?;

        let mut containers = Vec::with_capacity(summaries.len());
        for c in summaries {
            let Some(id) = c.id else {
                continue;
            };

            // The app name only lives in the container's environment.
            let detail = match self.docker.inspect_container(&id, None).await {
                Ok(detail) => detail,
                Err(e) => {
                    error!("Failed to inspect container {}: {}", id, e);
                    continue;
                }
            };
            let env = detail.config.and_then(|cfg| cfg.env);
            let Some(app_name) = app_name_from_env(env.as_deref()) else {
                debug!("Container {} has no APP_NAME, skipping", id);
                continue;
            };

            containers.push(ContainerDto {
                id,
                image: c.image.unwrap_or_default(),
                app_name,
                ports: build_ports(c.ports.as_deref().unwrap_or_default()),
                status: c.status.unwrap_or_default(),
            });
        }

        Ok(containers)
    }
}

/// Finds the first `APP_NAME=` entry of a container environment.
pub fn app_name_from_env(env: Option<&[String]>) -> Option<String> {
    env?.iter()
        .find_map(|var| var.strip_prefix(APP_NAME_ENV))
        .map(str::to_string)
}

/// Maps published ports in listing order. Unpublished ports map to `0`.
pub fn build_ports(ports: &[bollard::models::Port]) -> Vec<Port> {
    ports
        .iter()
        .map(|p| Port::new(p.public_port.unwrap_or_default()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[&str]) -> Vec<String> {
        vars.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn app_name_is_read_from_environment() {
        let vars = env(&["PATH=/usr/bin", "APP_NAME=web", "APP_NAME=other"]);
        assert_eq!(app_name_from_env(Some(vars.as_slice())), Some("web".to_string()));
    }

    #[test]
    fn missing_app_name_yields_none() {
        let vars = env(&["PATH=/usr/bin", "MY_APP_NAME=web"]);
        assert_eq!(app_name_from_env(Some(vars.as_slice())), None);
        assert_eq!(app_name_from_env(Some(&[][..])), None);
        assert_eq!(app_name_from_env(None), None);
    }

    #[test]
    fn endpoint_scheme_selects_connection() {
        assert_eq!(DockerEndpoint::parse(None).unwrap(), DockerEndpoint::LocalDefaults);
        assert_eq!(DockerEndpoint::parse(Some("  ")).unwrap(), DockerEndpoint::LocalDefaults);
        assert_eq!(
            DockerEndpoint::parse(Some("unix:///var/run/docker.sock")).unwrap(),
            DockerEndpoint::Unix("unix:///var/run/docker.sock".into())
        );
        assert_eq!(
            DockerEndpoint::parse(Some("tcp://10.0.0.5:2375")).unwrap(),
            DockerEndpoint::Http("tcp://10.0.0.5:2375".into())
        );
        assert_eq!(
            DockerEndpoint::parse(Some("http://10.0.0.5:2375")).unwrap(),
            DockerEndpoint::Http("http://10.0.0.5:2375".into())
        );
        assert!(matches!(
            DockerEndpoint::parse(Some("ftp://10.0.0.5")),
            Err(InspectError::Endpoint(_))
        ));
    }

    #[test]
    fn ports_keep_listing_order() {
        let ports = vec![
            bollard::models::Port {
                private_port: 8080,
                public_port: Some(32768),
                ..Default::default()
            },
            bollard::models::Port {
                private_port: 9000,
                public_port: None,
                ..Default::default()
            },
        ];
        assert_eq!(build_ports(&ports), vec![Port::new(32768), Port::new(0)]);
        assert!(build_ports(&[]).is_empty());
    }
}
