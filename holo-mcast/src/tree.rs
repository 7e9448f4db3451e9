//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::fabric::{ConnectPoint, DeviceId};
use crate::handler::McastHandler;
use crate::service::NodeId;
use crate::store::{McastRole, McastRoleStoreKey, McastStoreKey};

// ===== global functions =====

// Returns the next identifiers of all groups, or of the given one.
pub(crate) fn next_ids(
    mcast: &McastHandler,
    group: Option<IpAddr>,
) -> BTreeMap<McastStoreKey, u32> {
    mcast
        .store
        .next_entries()
        .into_iter()
        .filter(|(key, _)| group.is_none_or(|group| key.group() == group))
        .map(|(key, entry)| (key, entry.next_id()))
        .collect()
}

// Returns the roles of all groups, optionally restricted to a group and a
// source.
pub(crate) fn roles(
    mcast: &McastHandler,
    group: Option<IpAddr>,
    source: Option<&ConnectPoint>,
) -> BTreeMap<McastRoleStoreKey, McastRole> {
    mcast
        .store
        .role_entries()
        .into_iter()
        .filter(|(key, _)| group.is_none_or(|group| key.group() == group))
        .filter(|(key, _)| source.is_none_or(|source| key.source() == source))
        .collect()
}

pub(crate) fn leaders(
    mcast: &McastHandler,
    group: Option<IpAddr>,
) -> BTreeMap<IpAddr, NodeId> {
    mcast
        .leaders
        .iter()
        .filter(|(leader_group, _)| {
            group.is_none_or(|group| **leader_group == group)
        })
        .map(|(group, leader)| (*group, leader.clone()))
        .collect()
}

// Returns, for every leaf output port of the group's tree, the connect
// points traversed from the source.
//
// The stored state is walked depth-first. Each branch keeps track of the
// devices it already visited so that cyclic state can't loop forever.
pub(crate) fn paths(
    mcast: &McastHandler,
    group: IpAddr,
) -> BTreeMap<ConnectPoint, Vec<ConnectPoint>> {
    let mut paths = BTreeMap::new();
    let Some(source) = mcast
        .services
        .routes
        .route(group)
        .and_then(|route| route.source)
    else {
        return paths;
    };

    let mut worklist = vec![(
        source.device_id.clone(),
        vec![source.clone()],
        BTreeSet::<DeviceId>::new(),
    )];
    while let Some((device_id, path, mut visited)) = worklist.pop() {
        if !visited.insert(device_id.clone()) {
            continue;
        }
        let vlan = mcast.device_vlan(&device_id, &source);
        let Ok(Some(entry)) = mcast.next_entry(group, &device_id, vlan) else {
            continue;
        };

        for port in entry.ports() {
            let egress = ConnectPoint::new(device_id.clone(), *port);
            let links = mcast.services.links.egress_links(&egress);

            // Output port facing a host.
            if links.is_empty() {
                let mut path = path.clone();
                path.push(egress.clone());
                paths.insert(egress, path);
                continue;
            }

            for link in links {
                let mut path = path.clone();
                path.push(egress.clone());
                path.push(link.dst.clone());
                worklist.push((link.dst.device_id, path, visited.clone()));
            }
        }
    }

    paths
}
