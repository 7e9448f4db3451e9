//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::IpAddr;

use itertools::Itertools;
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::debug::Debug;
use crate::error::DeviceConfigError;
use crate::fabric::{DeviceId, Link, Path, PortNumber};
use crate::service::DeviceConfigService;

// Number of links of a path between two leaves.
const PATH_HOPS: usize = 2;

// ===== global functions =====

// Selects the path used to reach an egress device.
//
// Only leaf-spine-leaf paths are eligible, and candidate paths crossing a
// pair link are discarded. Among the remaining ones, the paths reusing the longest run of already active output ports
// are preferred, ties being broken at random. When no path reuses any
// active port, a random valid path is returned.
//
// `active_ports` returns the output ports currently replicating the group
// on the given device.
pub(crate) fn select<F, R>(
    group: &IpAddr,
    paths: Vec<Path>,
    device_config: &dyn DeviceConfigService,
    active_ports: F,
    rng: &mut R,
) -> Option<Path>
where
    F: Fn(&DeviceId) -> Option<BTreeSet<PortNumber>>,
    R: Rng + ?Sized,
{
    let paths = paths
        .into_iter()
        .filter(|path| path.links.len() == PATH_HOPS)
        .filter(|path| {
            !path.links.iter().any(|link| is_pair_link(device_config, link))
        })
        .collect::<Vec<_>>();
    if paths.is_empty() {
        return None;
    }

    let scored = paths
        .iter()
        .map(|path| (stickiness(path, &active_ports), path))
        .filter(|(score, _)| *score > 0)
        .max_set_by_key(|(score, _)| *score);

    let (score, path) = match scored.choose(rng) {
        Some((score, path)) => (*score, (*path).clone()),
        None => (0, paths.choose(rng)?.clone()),
    };
    Debug::PathSelect(group, &path, score).log();

    Some(path)
}

// Returns the number of contiguous hops, starting from the ingress device,
// whose output port is already replicating the group.
pub(crate) fn stickiness<F>(path: &Path, active_ports: F) -> usize
where
    F: Fn(&DeviceId) -> Option<BTreeSet<PortNumber>>,
{
    path.links
        .iter()
        .take_while(|link| {
            active_ports(&link.src.device_id)
                .is_some_and(|ports| ports.contains(&link.src.port))
        })
        .count()
}

// Returns whether the link connects the two devices of an edge pair.
//
// Devices lacking configuration are conservatively considered paired.
pub(crate) fn is_pair_link(
    device_config: &dyn DeviceConfigService,
    link: &Link,
) -> bool {
    let src = &link.src;
    let dst = &link.dst;
    let check = || -> Result<bool, DeviceConfigError> {
        if !device_config.is_edge_device(&src.device_id)?
            || !device_config.is_edge_device(&dst.device_id)?
        {
            return Ok(false);
        }
        let pair_device = device_config.pair_device_id(&src.device_id)?;
        let pair_port = device_config.pair_local_port(&src.device_id)?;
        Ok(pair_device.as_ref() == Some(&dst.device_id)
            && pair_port == Some(src.port))
    };

    match check() {
        Ok(is_pair) => is_pair,
        Err(error) => {
            error.log();
            true
        }
    }
}
