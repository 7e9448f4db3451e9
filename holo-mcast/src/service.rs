//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Interfaces of the collaborators consumed by the multicast handler.
//!
//! All of them are provided by the host platform. The `testing` feature
//! ships in-memory implementations under `test::stub`.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use derive_new::new;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::DeviceConfigError;
use crate::fabric::{
    ConnectPoint, DeviceId, Link, MacAddr, Path, PortNumber, VlanId,
};
use crate::objective::{FilteringObjective, ForwardingObjective, NextObjective};

// Controller cluster node identifier.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

// Multicast route as tracked by the route service.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[derive(new)]
pub struct McastRoute {
    pub group: IpAddr,
    pub source: Option<ConnectPoint>,
    #[new(default)]
    pub sinks: BTreeSet<ConnectPoint>,
}

// Path computation over the current topology snapshot.
pub trait TopologyService: Send + Sync {
    // Returns the shortest loop-free paths between the two devices.
    fn paths(&self, src: &DeviceId, dst: &DeviceId) -> Vec<Path>;
}

pub trait LinkService: Send + Sync {
    // Returns the infrastructure links leaving the given connect point.
    fn egress_links(&self, cp: &ConnectPoint) -> Vec<Link>;
}

// Asynchronous device programming.
//
// Completion is reported through the objective context, if any.
pub trait FlowObjectiveService: Send + Sync {
    fn allocate_next_id(&self) -> u32;

    fn next(&self, device_id: &DeviceId, objective: NextObjective);

    fn forward(&self, device_id: &DeviceId, objective: ForwardingObjective);

    fn filter(&self, device_id: &DeviceId, objective: FilteringObjective);
}

pub trait MastershipService: Send + Sync {
    fn is_local_master(&self, device_id: &DeviceId) -> bool;
}

pub trait LeadershipService: Send + Sync {
    fn local_node(&self) -> NodeId;

    // Joins the election for the given topic and returns the current leader.
    fn run_for_leadership(&self, topic: &str) -> Option<NodeId>;
}

// Segment routing device configuration.
pub trait DeviceConfigService: Send + Sync {
    fn is_configured(&self, device_id: &DeviceId) -> bool;

    fn is_edge_device(
        &self,
        device_id: &DeviceId,
    ) -> Result<bool, DeviceConfigError>;

    fn pair_device_id(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<DeviceId>, DeviceConfigError>;

    fn pair_local_port(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<PortNumber>, DeviceConfigError>;

    // Subnets configured on the given port. Empty for fabric-facing ports.
    fn port_subnets(&self, cp: &ConnectPoint) -> Vec<IpNetwork>;

    // Internal VLAN assigned to the given port, if any.
    fn internal_vlan(&self, cp: &ConnectPoint) -> Option<VlanId>;

    fn device_mac(
        &self,
        device_id: &DeviceId,
    ) -> Result<MacAddr, DeviceConfigError>;
}

pub trait RouteService: Send + Sync {
    fn routes(&self) -> Vec<McastRoute>;

    fn route(&self, group: IpAddr) -> Option<McastRoute> {
        self.routes().into_iter().find(|route| route.group == group)
    }
}

// Bundle of all collaborators.
#[derive(Clone)]
pub struct Services {
    pub topology: Arc<dyn TopologyService>,
    pub links: Arc<dyn LinkService>,
    pub flow_objectives: Arc<dyn FlowObjectiveService>,
    pub mastership: Arc<dyn MastershipService>,
    pub leadership: Arc<dyn LeadershipService>,
    pub device_config: Arc<dyn DeviceConfigService>,
    pub routes: Arc<dyn RouteService>,
}

// ===== impl NodeId =====

impl From<&str> for NodeId {
    fn from(id: &str) -> NodeId {
        NodeId(id.to_owned())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== impl McastRoute =====

impl McastRoute {
    pub fn with_sinks(
        group: IpAddr,
        source: ConnectPoint,
        sinks: impl IntoIterator<Item = ConnectPoint>,
    ) -> McastRoute {
        McastRoute {
            group,
            source: Some(source),
            sinks: sinks.into_iter().collect(),
        }
    }
}

// ===== impl Services =====

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
