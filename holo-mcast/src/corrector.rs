//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use itertools::Itertools;

use crate::debug::Debug;
use crate::error::Error;
use crate::fabric::DeviceId;
use crate::handler::McastHandler;
use crate::service::McastRoute;
use crate::store::McastRole;

// ===== global functions =====

// Re-asserts the stored replication state of every tree.
//
// Runs are skipped while the forwarding state is still converging.
pub(crate) fn run(mcast: &mut McastHandler) {
    if !mcast.is_stable() {
        Debug::CorrectorUnstable.log();
        return;
    }

    Debug::CorrectorRun.log();
    for route in mcast.services.routes.routes() {
        if let Err(error) = verify_route(mcast, &route) {
            error.log();
        }
    }
}

fn verify_route(
    mcast: &mut McastHandler,
    route: &McastRoute,
) -> Result<(), Error> {
    let group = route.group;

    // Trees not fully formed are left alone. Missing state is only worth a
    // warning when there are sinks to serve.
    let Some(source) = &route.source else {
        if route.sinks.is_empty() {
            return Ok(());
        }
        return Err(Error::MissingSource(group));
    };
    mcast.check_master(group, &source.device_id)?;
    let ingress = mcast.devices(group, McastRole::Ingress, source);
    if ingress.is_empty() {
        if route.sinks.is_empty() {
            return Ok(());
        }
        return Err(Error::MissingIngress(group, Some(source.clone())));
    }

    let devices = [McastRole::Transit, McastRole::Egress]
        .into_iter()
        .flat_map(|role| mcast.devices(group, role, source))
        .chain(ingress)
        .unique()
        .collect::<Vec<_>>();
    for device_id in devices {
        let vlan = mcast.device_vlan(&device_id, source);
        if let Err(error) = mcast.verify_device(&device_id, group, vlan) {
            error.log();
        }
    }

    Ok(())
}

// Re-asserts the stored replication state of a single device after an
// objective failure.
pub(crate) fn retry(
    mcast: &mut McastHandler,
    device_id: &DeviceId,
    group: IpAddr,
) -> Result<(), Error> {
    Debug::Retry(device_id, &group).log();

    let source = mcast
        .services
        .routes
        .route(group)
        .and_then(|route| route.source)
        .ok_or(Error::MissingSource(group))?;
    mcast.check_master(group, &source.device_id)?;

    // Nothing to re-assert if the entry was withdrawn in the meantime.
    let vlan = mcast.device_vlan(device_id, &source);
    if mcast.next_entry(group, device_id, vlan)?.is_none() {
        return Ok(());
    }
    mcast.verify_device(device_id, group, vlan)
}
