//! Data structures shared by the registry and its collaborators.
//!
//! These types are serialised using [`serde`](https://serde.rs/) so a
//! host's report can travel as JSON.  `Container` is the authoritative
//! registry record; `ContainerDto` is what an inspector sees on one host
//! before the host address and observation time are attached.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A published port of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub public_port: u16,
}

impl Port {
    pub fn new(public_port: u16) -> Self {
        Self { public_port }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<PublicPort:{}>", self.public_port)
    }
}

/// Snapshot of a container as reported by an inspector, without the
/// host address or observation timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDto {
    pub id: String,
    pub image: String,
    pub app_name: String,
    pub ports: Vec<Port>,
    pub status: String,
}

impl fmt::Display for ContainerDto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Id:{}, Image:{}, AppName:{}, Status:{}, Ports:{}>",
            self.id,
            self.image,
            self.app_name,
            self.status,
            PortList(&self.ports)
        )
    }
}

/// A container instance known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub ip: String,
    pub image: String,
    pub app_name: String,
    pub ports: Vec<Port>,
    pub status: String,
    /// Last time the container was observed, in Unix seconds.
    pub update_at: i64,
}

impl Container {
    /// Attach the reporting host and observation time to an inspected container.
    pub fn from_dto(dto: ContainerDto, ip: impl Into<String>, update_at: i64) -> Self {
        Self {
            id: dto.id,
            ip: ip.into(),
            image: dto.image,
            app_name: dto.app_name,
            ports: dto.ports,
            status: dto.status,
            update_at,
        }
    }

    pub fn key(&self) -> ContainerKey {
        ContainerKey::new(&self.ip, &self.id)
    }

    /// The first published port, used to detect routing changes.
    pub fn primary_port(&self) -> Option<u16> {
        self.ports.first().map(|p| p.public_port)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Id:{}, Ip:{}, Image:{}, AppName:{}, Status:{}, Ports:{}>",
            self.id,
            self.ip,
            self.image,
            self.app_name,
            self.status,
            PortList(&self.ports)
        )
    }
}

struct PortList<'a>(&'a [Port]);

impl fmt::Display for PortList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, port) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", port)?;
        }
        f.write_str("]")
    }
}

/// Identity of a container instance: host address and container id
/// joined by `-`.
///
/// Docker ids are hex and neither IPv4 nor IPv6 addresses contain a
/// hyphen, so distinct (ip, id) pairs never produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerKey(String);

impl ContainerKey {
    pub const SEPARATOR: char = '-';

    pub fn new(ip: &str, container_id: &str) -> Self {
        Self(format!("{}{}{}", ip, Self::SEPARATOR, container_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary of one cluster host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub ip: String,
    pub mem_free: u64,
    pub update_at: i64,
}

impl Node {
    /// Orders nodes with more free memory first.
    pub fn cmp_mem_free_desc(a: &Node, b: &Node) -> Ordering {
        b.mem_free.cmp(&a.mem_free)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Ip:{}, MemFree:{}, UpdateAt:{}>",
            self.ip, self.mem_free, self.update_at
        )
    }
}

/// Sort nodes by descending free memory. Ties keep their input order.
pub fn sort_nodes_by_mem_free(nodes: &mut [Node]) {
    nodes.sort_by(Node::cmp_mem_free_desc);
}

/// One host's report: its own summary plus every container it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRequest {
    pub node: Node,
    pub containers: Vec<ContainerDto>,
}

impl fmt::Display for NodeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Node:{}, Containers:[", self.node)?;
        for (i, c) in self.containers.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", c)?;
        }
        f.write_str("]>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResponse {
    pub code: i32,
}

/// Outcome of the last deployment attempt of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum AppStatus {
    #[default]
    Success,
    CreateContainerFail,
    PullImageFail,
    StartContainerFail,
}

impl AppStatus {
    pub fn code(self) -> i32 {
        match self {
            AppStatus::Success => 0,
            AppStatus::CreateContainerFail => 1,
            AppStatus::PullImageFail => 2,
            AppStatus::StartContainerFail => 3,
        }
    }
}

impl From<AppStatus> for i32 {
    fn from(status: AppStatus) -> i32 {
        status.code()
    }
}

impl TryFrom<i32> for AppStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(AppStatus::Success),
            1 => Ok(AppStatus::CreateContainerFail),
            2 => Ok(AppStatus::PullImageFail),
            3 => Ok(AppStatus::StartContainerFail),
            other => Err(format!("unknown app status code: {}", other)),
        }
    }
}

/// Deployment descriptor of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    pub memory: u64,
    pub instance_cnt: u32,
    pub image: String,
    pub status: AppStatus,
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Name:{}, Memory:{}, InstanceCnt:{}, Image:{}, Status:{}>",
            self.name,
            self.memory,
            self.instance_cnt,
            self.image,
            self.status.code()
        )
    }
}
