//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::IpAddr;

use derive_new::new;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::fabric::{DeviceId, MacAddr, PortNumber, VlanId};
use crate::tasks::messages::input::RetryMsg;

// Operation requested by an objective.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Operation {
    Add,
    AddToExisting,
    RemoveFromExisting,
    Remove,
    Verify,
}

// Ether type matched by a multicast forwarding objective.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum EtherType {
    Ipv4,
    Ipv6,
}

// Broadcast-type next objective replicating a group to a set of ports.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Serialize)]
pub struct NextObjective {
    pub id: u32,
    pub op: Operation,
    pub group: IpAddr,
    // VLAN metadata.
    pub vlan: VlanId,
    pub ports: BTreeSet<PortNumber>,
    // Whether the VLAN tag is popped before output.
    pub pop_vlan: bool,
    #[serde(skip)]
    pub context: Option<ObjectiveContext>,
}

// Multicast routing entry pointing to a next objective.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Serialize)]
pub struct ForwardingObjective {
    pub op: Operation,
    pub ether_type: EtherType,
    pub group: IpAddr,
    pub vlan: VlanId,
    pub next_id: u32,
    pub priority: u32,
    #[serde(skip)]
    pub context: Option<ObjectiveContext>,
}

// Ingress admission rule for multicast traffic.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Serialize)]
pub struct FilteringObjective {
    pub op: Operation,
    pub port: PortNumber,
    pub vlan_match: VlanId,
    // VLAN pushed on admitted frames.
    pub assigned_vlan: VlanId,
    pub eth_dst_masked: Option<(MacAddr, MacAddr)>,
    pub router_mac: Option<MacAddr>,
    pub priority: u32,
    #[serde(skip)]
    pub context: Option<ObjectiveContext>,
}

// Failure reported by the flow objective service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ObjectiveError {
    DeviceMissing,
    GroupMissing,
    GroupExists,
    Unsupported,
    Failed(String),
}

// Completion callbacks attached to an objective.
#[derive(Clone, Debug, new)]
pub struct ObjectiveContext {
    pub device_id: DeviceId,
    pub group: IpAddr,
    pub description: String,
    // Channel used to request an immediate re-assertion on failure.
    #[new(default)]
    pub retry_tx: Option<UnboundedSender<RetryMsg>>,
}

// ===== impl Operation =====

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Add => write!(f, "add"),
            Operation::AddToExisting => write!(f, "add-to-existing"),
            Operation::RemoveFromExisting => write!(f, "remove-from-existing"),
            Operation::Remove => write!(f, "remove"),
            Operation::Verify => write!(f, "verify"),
        }
    }
}

// ===== impl EtherType =====

impl EtherType {
    pub fn from_group(group: &IpAddr) -> EtherType {
        match group {
            IpAddr::V4(_) => EtherType::Ipv4,
            IpAddr::V6(_) => EtherType::Ipv6,
        }
    }
}

// ===== impl ObjectiveError =====

impl std::fmt::Display for ObjectiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectiveError::DeviceMissing => write!(f, "device missing"),
            ObjectiveError::GroupMissing => write!(f, "group missing"),
            ObjectiveError::GroupExists => write!(f, "group exists"),
            ObjectiveError::Unsupported => write!(f, "unsupported"),
            ObjectiveError::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

impl std::error::Error for ObjectiveError {}

// ===== impl ObjectiveContext =====

impl ObjectiveContext {
    pub(crate) fn with_retry(
        mut self,
        retry_tx: Option<UnboundedSender<RetryMsg>>,
    ) -> ObjectiveContext {
        self.retry_tx = retry_tx;
        self
    }

    // Invoked by the flow objective service once the objective is applied.
    pub fn on_success(&self) {
        debug!(
            device_id = %self.device_id,
            group = %self.group,
            "succeeded to {}", self.description
        );
    }

    // Invoked by the flow objective service when the objective can't be
    // applied.
    //
    // The stored state is left untouched. When retries are enabled, a
    // re-assertion of the stored entry is requested.
    pub fn on_error(&self, error: ObjectiveError) {
        warn!(
            device_id = %self.device_id,
            group = %self.group,
            %error,
            "failed to {}", self.description
        );

        if let Some(retry_tx) = &self.retry_tx {
            let msg = RetryMsg {
                device_id: self.device_id.clone(),
                group: self.group,
            };
            // The instance might be shutting down.
            let _ = retry_tx.send(msg);
        }
    }
}

impl PartialEq for ObjectiveContext {
    fn eq(&self, other: &ObjectiveContext) -> bool {
        self.device_id == other.device_id
            && self.group == other.group
            && self.description == other.description
    }
}

impl Eq for ObjectiveContext {}
