//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use tracing::{debug, debug_span};

use crate::events::Event;
use crate::fabric::{DeviceId, Path, PortNumber, VlanId};
use crate::objective::{FilteringObjective, ForwardingObjective, NextObjective};
use crate::service::NodeId;
use crate::store::{McastRole, McastRoleStoreKey};

// Multicast debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceStart,
    InstanceStop,
    EventRx(&'a Event),
    // Objectives
    NextTx(&'a DeviceId, &'a NextObjective),
    ForwardingTx(&'a DeviceId, &'a ForwardingObjective),
    FilteringTx(&'a DeviceId, &'a FilteringObjective),
    FilterSkip(&'a DeviceId, PortNumber, VlanId),
    // Tree
    PathSelect(&'a IpAddr, &'a Path, usize),
    RoleUpdate(&'a McastRoleStoreKey, McastRole),
    RoleRemove(&'a McastRoleStoreKey),
    LeaderUpdate(&'a IpAddr, Option<&'a NodeId>),
    // Bucket corrector
    CorrectorUnstable,
    CorrectorRun,
    Retry(&'a DeviceId, &'a IpAddr),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceStart | Debug::InstanceStop => {
                debug!("{}", self);
            }
            Debug::EventRx(event) => {
                debug_span!("events").in_scope(|| {
                    let data = serde_json::to_string(&event).unwrap();
                    debug!(%data, "{}", self);
                })
            }
            Debug::NextTx(device_id, objective) => {
                debug_span!("objectives").in_scope(|| {
                    let data = serde_json::to_string(&objective).unwrap();
                    debug!(%device_id, %data, "{}", self);
                })
            }
            Debug::ForwardingTx(device_id, objective) => {
                debug_span!("objectives").in_scope(|| {
                    let data = serde_json::to_string(&objective).unwrap();
                    debug!(%device_id, %data, "{}", self);
                })
            }
            Debug::FilteringTx(device_id, objective) => {
                debug_span!("objectives").in_scope(|| {
                    let data = serde_json::to_string(&objective).unwrap();
                    debug!(%device_id, %data, "{}", self);
                })
            }
            Debug::FilterSkip(device_id, port, vlan) => {
                debug!(%device_id, %port, %vlan, "{}", self);
            }
            Debug::PathSelect(group, path, score) => {
                debug!(%group, %path, %score, "{}", self);
            }
            Debug::RoleUpdate(key, role) => {
                debug!(%key, %role, "{}", self);
            }
            Debug::RoleRemove(key) => {
                debug!(%key, "{}", self);
            }
            Debug::LeaderUpdate(group, leader) => {
                let leader = leader.map(|leader| leader.to_string());
                debug!(%group, ?leader, "{}", self);
            }
            Debug::CorrectorUnstable | Debug::CorrectorRun => {
                debug_span!("bucket-corrector").in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::Retry(device_id, group) => {
                debug!(%device_id, %group, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceStart => {
                write!(f, "starting instance")
            }
            Debug::InstanceStop => {
                write!(f, "stopping instance")
            }
            Debug::EventRx(..) => {
                write!(f, "event")
            }
            Debug::NextTx(..) => {
                write!(f, "next objective")
            }
            Debug::ForwardingTx(..) => {
                write!(f, "forwarding objective")
            }
            Debug::FilteringTx(..) => {
                write!(f, "filtering objective")
            }
            Debug::FilterSkip(..) => {
                write!(f, "filter already installed")
            }
            Debug::PathSelect(..) => {
                write!(f, "path selected")
            }
            Debug::RoleUpdate(..) => {
                write!(f, "role updated")
            }
            Debug::RoleRemove(..) => {
                write!(f, "role removed")
            }
            Debug::LeaderUpdate(..) => {
                write!(f, "leader updated")
            }
            Debug::CorrectorUnstable => {
                write!(f, "skipping run, multicast state is not stable")
            }
            Debug::CorrectorRun => {
                write!(f, "verifying next objectives")
            }
            Debug::Retry(..) => {
                write!(f, "re-asserting next objective")
            }
        }
    }
}
