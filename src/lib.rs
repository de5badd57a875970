//! Real-state registry of a cluster container manager.
//!
//! [`SafeRealState`] records which application containers run on which
//! hosts, with which ports, and when they were last seen. Reporting hosts
//! feed it, the router sync drains its per-application dirty bits, and
//! maintenance sweeps expire hosts that went quiet.

pub mod agent;
pub mod config;
pub mod inspector;
pub mod model;
pub mod router;
pub mod safe;

pub use model::{
    sort_nodes_by_mem_free, App, AppStatus, Container, ContainerDto, ContainerKey, Node,
    NodeRequest, NodeResponse, Port,
};
pub use safe::{SafeApp, SafeRealState};
