//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::debug::Debug;
use crate::error::Error;
use crate::fabric::{ConnectPoint, DeviceId, Link, PortNumber, VlanId};
use crate::handler::McastHandler;
use crate::service::McastRoute;
use crate::store::McastRole;

// Route and topology events consumed by the multicast handler.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Event {
    SourceAdded(McastRoute),
    SourceUpdated {
        group: IpAddr,
        old_source: ConnectPoint,
        new_source: ConnectPoint,
    },
    SinkAdded {
        group: IpAddr,
        source: ConnectPoint,
        sink: ConnectPoint,
    },
    SinkRemoved {
        group: IpAddr,
        source: ConnectPoint,
        sink: ConnectPoint,
    },
    RouteAdded {
        group: IpAddr,
    },
    RouteRemoved {
        group: IpAddr,
        source: ConnectPoint,
    },
    LinkDown(Link),
    DeviceDown(DeviceId),
}

// Element whose failure triggered a tree repair.
#[derive(Clone, Copy, Debug)]
enum FailedElement<'a> {
    Link(&'a Link),
    Device(&'a DeviceId),
}

// ===== impl Event =====

impl Event {
    // Returns the multicast group the event refers to, if any.
    pub fn group(&self) -> Option<IpAddr> {
        match self {
            Event::SourceAdded(route) => Some(route.group),
            Event::SourceUpdated { group, .. }
            | Event::SinkAdded { group, .. }
            | Event::SinkRemoved { group, .. }
            | Event::RouteAdded { group }
            | Event::RouteRemoved { group, .. } => Some(*group),
            Event::LinkDown(_) | Event::DeviceDown(_) => None,
        }
    }
}

// ===== impl FailedElement =====

impl std::fmt::Display for FailedElement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailedElement::Link(link) => write!(f, "link {link}"),
            FailedElement::Device(device_id) => write!(f, "device {device_id}"),
        }
    }
}

// ===== global functions =====

pub(crate) fn process_event(
    mcast: &mut McastHandler,
    event: Event,
) -> Result<(), Error> {
    Debug::EventRx(&event).log();

    if let Some(group) = event.group()
        && !group.is_multicast()
    {
        return Err(Error::InvalidGroup(group));
    }

    match event {
        Event::SourceAdded(route) => process_source_added(mcast, route),
        Event::SourceUpdated {
            group,
            old_source,
            new_source,
        } => process_source_updated(mcast, group, &old_source, &new_source),
        Event::SinkAdded {
            group,
            source,
            sink,
        } => process_sink_added(mcast, group, &source, &sink),
        Event::SinkRemoved {
            group,
            source,
            sink,
        } => process_sink_removed(mcast, group, &source, &sink),
        Event::RouteAdded { group } => process_route_added(mcast, group),
        Event::RouteRemoved { group, source } => {
            process_route_removed(mcast, group, &source)
        }
        Event::LinkDown(link) => process_link_down(mcast, &link),
        Event::DeviceDown(device_id) => process_device_down(mcast, &device_id),
    }
}

// Builds the paths toward every sink of a route whose source became known.
pub(crate) fn process_source_added(
    mcast: &mut McastHandler,
    route: McastRoute,
) -> Result<(), Error> {
    let group = route.group;
    let source = route.source.ok_or(Error::MissingSource(group))?;

    for sink in &route.sinks {
        if let Err(error) = process_sink_added(mcast, group, &source, sink) {
            error.log();
        }
    }

    Ok(())
}

// Moves the replication state of the old source device to the new one.
pub(crate) fn process_source_updated(
    mcast: &mut McastHandler,
    group: IpAddr,
    old_source: &ConnectPoint,
    new_source: &ConnectPoint,
) -> Result<(), Error> {
    mcast.check_master(group, &old_source.device_id)?;

    // The old source must be the root of an existing tree.
    let old_device = &old_source.device_id;
    if !mcast
        .devices(group, McastRole::Ingress, old_source)
        .contains(old_device)
    {
        return Err(Error::MissingIngress(group, Some(old_source.clone())));
    }
    let old_vlan = mcast.assigned_vlan(Some(old_source));
    let Some(entry) = mcast.next_entry(group, old_device, old_vlan)? else {
        return Err(Error::MissingNext(group, old_device.clone()));
    };

    // Tear down the old ingress.
    mcast.remove_group_from_device(old_device, group, old_vlan)?;
    mcast.remove_filter_to_device(
        old_device,
        old_source.port,
        old_vlan,
        group,
        Some(McastRole::Ingress),
    );
    mcast.role_remove(group, old_device, old_source)?;

    // Re-root the remaining roles on the new source.
    for (key, role) in mcast.store.role_entries() {
        if key.group() == group && key.source() == old_source {
            let device_id = key.device_id().clone();
            mcast.role_remove(group, &device_id, old_source)?;
            mcast.role_put(group, &device_id, new_source, role)?;
        }
    }

    // Build the new ingress.
    let new_device = &new_source.device_id;
    let new_vlan = mcast.assigned_vlan(Some(new_source));
    for port in entry.ports().iter().copied() {
        if port == new_source.port {
            debug!(%group, %port, "skipping port facing the new source");
            continue;
        }
        mcast.add_port_to_device(new_device, port, group, new_vlan)?;
    }
    mcast.add_filter_to_device(
        new_device,
        new_source.port,
        new_vlan,
        group,
        Some(McastRole::Ingress),
    );
    mcast.role_put(group, new_device, new_source, McastRole::Ingress)?;

    Ok(())
}

// Connects a sink to the tree rooted at the given source.
pub(crate) fn process_sink_added(
    mcast: &mut McastHandler,
    group: IpAddr,
    source: &ConnectPoint,
    sink: &ConnectPoint,
) -> Result<(), Error> {
    mcast.check_master(group, &source.device_id)?;
    if source == sink {
        return Err(Error::SameSourceSinkPort(group, sink.clone()));
    }

    // Process the ingress device.
    let source_vlan = mcast.assigned_vlan(Some(source));
    mcast.add_filter_to_device(
        &source.device_id,
        source.port,
        source_vlan,
        group,
        Some(McastRole::Ingress),
    );

    // Sink co-located with the source.
    if source.device_id == sink.device_id {
        mcast.add_port_to_device(
            &sink.device_id,
            sink.port,
            group,
            source_vlan,
        )?;
        mcast.role_put(group, &sink.device_id, source, McastRole::Ingress)?;
        return Ok(());
    }

    let Some(path) =
        mcast.get_path(&source.device_id, &sink.device_id, group, source)
    else {
        return Err(Error::NoPath(
            group,
            source.device_id.clone(),
            sink.device_id.clone(),
        ));
    };

    mcast.role_put(group, &source.device_id, source, McastRole::Ingress)?;
    mcast.install_path(group, source, &path)?;

    // Process the egress device.
    let egress_vlan = mcast.assigned_vlan(None);
    mcast.add_port_to_device(&sink.device_id, sink.port, group, egress_vlan)?;
    mcast.role_put(group, &sink.device_id, source, McastRole::Egress)?;

    Ok(())
}

// Disconnects a sink, pruning the upstream hops left without ports.
pub(crate) fn process_sink_removed(
    mcast: &mut McastHandler,
    group: IpAddr,
    source: &ConnectPoint,
    sink: &ConnectPoint,
) -> Result<(), Error> {
    mcast.check_master(group, &source.device_id)?;

    // Sink co-located with the source.
    if source.device_id == sink.device_id {
        if source.port == sink.port {
            return Err(Error::SameSourceSinkPort(group, sink.clone()));
        }
        let vlan = mcast.assigned_vlan(Some(source));
        let is_last = mcast.remove_port_from_device(
            &sink.device_id,
            sink.port,
            group,
            vlan,
        )?;
        if is_last {
            mcast.role_remove(group, &sink.device_id, source)?;
        }
        return Ok(());
    }

    // The path must be computed while the egress port is still active so
    // that the one in use is selected.
    let path =
        mcast.get_path(&source.device_id, &sink.device_id, group, source);

    // Process the egress device.
    let egress_vlan = mcast.assigned_vlan(None);
    let mut is_last = mcast.remove_port_from_device(
        &sink.device_id,
        sink.port,
        group,
        egress_vlan,
    )?;
    if is_last {
        mcast.role_remove(group, &sink.device_id, source)?;
    }

    // Walk the path backwards while hops are left empty.
    if let Some(path) = path {
        for link in path.links.iter().rev() {
            if !is_last {
                break;
            }
            let device_id = &link.src.device_id;
            let vlan = mcast.device_vlan(device_id, source);
            is_last = mcast.remove_port_from_device(
                device_id,
                link.src.port,
                group,
                vlan,
            )?;
            if is_last {
                mcast.role_remove(group, device_id, source)?;
            }
        }
    }

    Ok(())
}

// Elects the group leader. No forwarding state is changed.
pub(crate) fn process_route_added(
    mcast: &mut McastHandler,
    group: IpAddr,
) -> Result<(), Error> {
    mcast.is_leader(group);
    Ok(())
}

// Removes the whole tree of the given group.
pub(crate) fn process_route_removed(
    mcast: &mut McastHandler,
    group: IpAddr,
    source: &ConnectPoint,
) -> Result<(), Error> {
    if let Err(error) = mcast.check_leader(group) {
        mcast.withdraw_leader(group);
        return Err(error);
    }

    let egress_vlan = mcast.assigned_vlan(None);
    for role in [McastRole::Egress, McastRole::Transit] {
        for device_id in mcast.devices(group, role, source) {
            mcast.remove_group_from_device(&device_id, group, egress_vlan)?;
            mcast.role_remove(group, &device_id, source)?;
        }
    }
    if let Some(ingress) =
        mcast.devices(group, McastRole::Ingress, source).pop_first()
    {
        let vlan = mcast.assigned_vlan(Some(source));
        mcast.remove_group_from_device(&ingress, group, vlan)?;
        mcast.role_remove(group, &ingress, source)?;
    }

    mcast.withdraw_leader(group);
    Ok(())
}

// Repairs the trees using the given link.
pub(crate) fn process_link_down(
    mcast: &mut McastHandler,
    link: &Link,
) -> Result<(), Error> {
    // Filters on both ends are sent again once the link is back in use.
    mcast.forget_filters(&link.src.device_id, Some(link.src.port));
    mcast.forget_filters(&link.dst.device_id, Some(link.dst.port));

    let groups = mcast
        .store
        .groups_on_device(&link.src.device_id, Some(link.src.port));
    for group in groups {
        debug!(%group, %link, "processing link down");
        if let Err(error) =
            recover_failure(mcast, group, FailedElement::Link(link))
        {
            error.log();
        }
    }

    Ok(())
}

// Repairs the trees traversing the given device.
pub(crate) fn process_device_down(
    mcast: &mut McastHandler,
    device_id: &DeviceId,
) -> Result<(), Error> {
    // The device comes back without any filter installed.
    mcast.forget_filters(device_id, None);

    let groups = mcast.store.groups_on_device(device_id, None);
    for group in groups {
        debug!(%group, %device_id, "processing device down");
        if let Err(error) =
            recover_failure(mcast, group, FailedElement::Device(device_id))
        {
            error.log();
        }
    }

    Ok(())
}

// Re-attaches every egress device of a tree after the loss of one of its
// elements. Egress devices that can't be reached anymore are dropped.
fn recover_failure(
    mcast: &mut McastHandler,
    group: IpAddr,
    failed: FailedElement<'_>,
) -> Result<(), Error> {
    let source = mcast
        .services
        .routes
        .route(group)
        .and_then(|route| route.source)
        .ok_or(Error::MissingSource(group))?;

    debug!(%group, %failed, "recovering tree");

    // Link failures are repaired by the master of the source device, device
    // failures by the group leader.
    match failed {
        FailedElement::Link(_) => mcast.check_master(group, &source.device_id)?,
        FailedElement::Device(_) => mcast.check_leader(group)?,
    }

    let ingress = source.device_id.clone();
    if !mcast
        .devices(group, McastRole::Ingress, &source)
        .contains(&ingress)
    {
        return Err(Error::MissingIngress(group, Some(source)));
    }
    let source_vlan = mcast.assigned_vlan(Some(&source));
    let egress_vlan = mcast.assigned_vlan(None);

    // Remove the ingress-transit part of the tree.
    for transit in mcast.devices(group, McastRole::Transit, &source) {
        mcast.remove_group_from_device(&transit, group, egress_vlan)?;
        mcast.role_remove(group, &transit, &source)?;
    }
    let ports = mcast.ingress_transit_ports(group, &ingress, &source)?;
    for port in ports {
        let is_last = mcast.remove_port_from_device(
            &ingress,
            port,
            group,
            source_vlan,
        )?;
        if is_last {
            mcast.role_remove(group, &ingress, &source)?;
        }
    }

    let mut egress_devices = mcast.devices(group, McastRole::Egress, &source);

    // Loss of the ingress device tears down the whole tree.
    if let FailedElement::Device(device_id) = failed
        && *device_id == ingress
    {
        if mcast.next_entry(group, &ingress, source_vlan)?.is_some() {
            mcast.remove_group_from_device(&ingress, group, source_vlan)?;
        }
        mcast.role_remove(group, &ingress, &source)?;
        for egress in egress_devices {
            mcast.remove_group_from_device(&egress, group, egress_vlan)?;
            mcast.role_remove(group, &egress, &source)?;
        }
        return Ok(());
    }

    // Loss of an egress device.
    if let FailedElement::Device(device_id) = failed
        && egress_devices.remove(device_id)
    {
        mcast.remove_group_from_device(device_id, group, egress_vlan)?;
        mcast.role_remove(group, device_id, &source)?;
    }

    // The ingress entry is already gone if it had no local sinks.
    if egress_devices.is_empty() {
        return Ok(());
    }

    // Construct a new path for each egress device.
    for egress in egress_devices {
        match mcast.get_path(&ingress, &egress, group, &source) {
            Some(path) => {
                mcast.install_path(group, &source, &path)?;
                mcast.role_put(group, &ingress, &source, McastRole::Ingress)?;
            }
            None => {
                Error::NoPath(group, ingress.clone(), egress.clone()).log();
                mcast.remove_group_from_device(&egress, group, egress_vlan)?;
                mcast.role_remove(group, &egress, &source)?;
            }
        }
    }

    Ok(())
}

// Connects every sink of the led routes not yet served.
pub(crate) fn init(mcast: &mut McastHandler) {
    for route in mcast.services.routes.routes() {
        let group = route.group;
        if let Err(error) = mcast.check_leader(group) {
            error.log();
            continue;
        }
        let Some(source) = &route.source else {
            continue;
        };

        for sink in &route.sinks {
            match mcast.is_sink_for_source(group, sink, source) {
                Ok(true) => continue,
                Ok(false) => (),
                Err(error) => {
                    error.log();
                    continue;
                }
            }
            if let Err(error) =
                process_sink_added(mcast, group, source, sink)
            {
                error.log();
            }
        }
    }
}

// Installs or removes the ingress filter of the led routes sourced at the
// given port.
pub(crate) fn update_filter(
    mcast: &mut McastHandler,
    device_id: &DeviceId,
    port: PortNumber,
    vlan: VlanId,
    install: bool,
) {
    for route in mcast.services.routes.routes() {
        let group = route.group;
        if let Err(error) = mcast.check_leader(group) {
            error.log();
            continue;
        }
        let Some(source) = &route.source else {
            continue;
        };
        if source.device_id != *device_id || source.port != port {
            continue;
        }

        if install {
            mcast.add_filter_to_device(
                device_id,
                port,
                vlan,
                group,
                Some(McastRole::Ingress),
            );
        } else {
            mcast.remove_filter_to_device(device_id, port, vlan, group, None);
        }
    }
}
