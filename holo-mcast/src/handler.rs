//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::config::McastCfg;
use crate::debug::Debug;
use crate::error::Error;
use crate::fabric::{ConnectPoint, DeviceId, MacAddr, Path, PortNumber, VlanId};
use crate::objective::{
    EtherType, FilteringObjective, ForwardingObjective, NextObjective,
    ObjectiveContext, Operation,
};
use crate::path;
use crate::service::{DeviceConfigService, NodeId, Services};
use crate::store::{
    McastRole, McastRoleStoreKey, McastStore, McastStoreKey, NextEntry,
};
use crate::tasks::messages::input::RetryMsg;

// Multicast forwarding state of the local controller instance.
//
// Every method assumes the caller holds the instance-wide lock.
#[derive(Debug)]
pub struct McastHandler {
    pub config: McastCfg,
    pub services: Services,
    pub store: McastStore,
    // Last known leader of each group.
    pub leaders: BTreeMap<IpAddr, NodeId>,
    // Filters installed by this instance.
    pub filters: BTreeSet<(DeviceId, PortNumber, VlanId)>,
    // Time of the last forwarding state mutation.
    pub last_change: Instant,
    pub rng: StdRng,
    pub retry_tx: Option<UnboundedSender<RetryMsg>>,
}

// ===== impl McastHandler =====

impl McastHandler {
    pub fn new(
        config: McastCfg,
        services: Services,
        store: McastStore,
    ) -> McastHandler {
        McastHandler {
            config,
            services,
            store,
            leaders: Default::default(),
            filters: Default::default(),
            last_change: Instant::now(),
            rng: StdRng::from_os_rng(),
            retry_tx: None,
        }
    }

    // Replaces the path selection randomness source with a seeded one.
    pub fn set_rng_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    // Records a forwarding state mutation.
    pub(crate) fn touch(&mut self) {
        self.last_change = Instant::now();
    }

    // Returns whether no mutation happened within the stability threshold.
    pub(crate) fn is_stable(&self) -> bool {
        self.last_change.elapsed() >= self.config.stability_threshold()
    }

    // ----- Authority -----

    pub(crate) fn is_leader(&mut self, group: IpAddr) -> bool {
        let leadership = &self.services.leadership;
        let Some(leader) = leadership.run_for_leadership(&group.to_string())
        else {
            warn!(%group, "failed to elect a leader");
            self.leaders.remove(&group);
            return false;
        };

        if self.leaders.get(&group) != Some(&leader) {
            Debug::LeaderUpdate(&group, Some(&leader)).log();
            self.leaders.insert(group, leader.clone());
        }
        leader == leadership.local_node()
    }

    pub(crate) fn withdraw_leader(&mut self, group: IpAddr) {
        if self.leaders.remove(&group).is_some() {
            Debug::LeaderUpdate(&group, None).log();
        }
    }

    pub(crate) fn check_leader(&mut self, group: IpAddr) -> Result<(), Error> {
        if !self.is_leader(group) {
            return Err(Error::NotLeader(group));
        }
        Ok(())
    }

    pub(crate) fn check_master(
        &self,
        group: IpAddr,
        device_id: &DeviceId,
    ) -> Result<(), Error> {
        if !self.services.mastership.is_local_master(device_id) {
            return Err(Error::NotMaster(group, device_id.clone()));
        }
        Ok(())
    }

    // ----- VLAN assignment -----

    pub(crate) fn assigned_vlan(&self, cp: Option<&ConnectPoint>) -> VlanId {
        assigned_vlan(&self.config, &*self.services.device_config, cp)
    }

    // VLAN of the membership entry of the given device in the tree rooted at
    // the given source.
    pub(crate) fn device_vlan(
        &self,
        device_id: &DeviceId,
        source: &ConnectPoint,
    ) -> VlanId {
        let device_config = &*self.services.device_config;
        device_vlan(&self.config, device_config, device_id, source)
    }

    // ----- Membership -----

    pub(crate) fn next_entry(
        &self,
        group: IpAddr,
        device_id: &DeviceId,
        vlan: VlanId,
    ) -> Result<Option<NextEntry>, Error> {
        let key = McastStoreKey::new(group, device_id.clone(), vlan)?;
        Ok(self.store.next(&key))
    }

    // Adds an output port to the group replication on the given device.
    pub(crate) fn add_port_to_device(
        &mut self,
        device_id: &DeviceId,
        port: PortNumber,
        group: IpAddr,
        vlan: VlanId,
    ) -> Result<(), Error> {
        let key = McastStoreKey::new(group, device_id.clone(), vlan)?;
        let description = format!("add port {port} vlan {vlan}");
        let context = self.context(device_id, group, description);

        match self.store.next(&key) {
            None => {
                // First port replicating the group on this device.
                let next_id = self.services.flow_objectives.allocate_next_id();
                let ports = BTreeSet::from([port]);
                let next = self.next_objective(
                    next_id,
                    Operation::Add,
                    group,
                    vlan,
                    ports.clone(),
                    Some(context.clone()),
                );
                let fwd = self.forwarding_objective(
                    Operation::Add,
                    group,
                    vlan,
                    next_id,
                    context,
                );
                if let Some(entry) = NextEntry::new(next_id, ports) {
                    self.store.next_put(key, entry);
                }
                self.send_next(device_id, next);
                self.send_forwarding(device_id, fwd);
            }
            Some(entry) if entry.contains(port) => {
                debug!(%device_id, %port, %group, "port already in use");
                return Ok(());
            }
            Some(entry) => {
                let mut ports = entry.ports().clone();
                ports.insert(port);
                let next = self.next_objective(
                    entry.next_id(),
                    Operation::AddToExisting,
                    group,
                    vlan,
                    BTreeSet::from([port]),
                    Some(context),
                );
                if let Some(entry) = NextEntry::new(entry.next_id(), ports) {
                    self.store.next_put(key, entry);
                }
                self.send_next(device_id, next);
            }
        }

        self.touch();
        Ok(())
    }

    // Removes an output port from the group replication on the given device.
    //
    // Returns whether the device no longer replicates the group.
    pub(crate) fn remove_port_from_device(
        &mut self,
        device_id: &DeviceId,
        port: PortNumber,
        group: IpAddr,
        vlan: VlanId,
    ) -> Result<bool, Error> {
        let key = McastStoreKey::new(group, device_id.clone(), vlan)?;
        let Some(entry) = self.store.next(&key) else {
            Error::MissingNext(group, device_id.clone()).log();
            return Ok(false);
        };
        if !entry.contains(port) {
            warn!(%device_id, %port, %group, "port is not replicating group");
            return Ok(false);
        }

        let mut ports = entry.ports().clone();
        ports.remove(&port);
        let description = format!("remove port {port} vlan {vlan}");
        let context = self.context(device_id, group, description);

        match NextEntry::new(entry.next_id(), ports) {
            None => {
                // Last port: withdraw the routing entry. The next objective
                // is garbage collected by the device driver.
                let fwd = self.forwarding_objective(
                    Operation::Remove,
                    group,
                    vlan,
                    entry.next_id(),
                    context,
                );
                self.store.next_remove(&key);
                self.send_forwarding(device_id, fwd);
                self.touch();
                Ok(true)
            }
            Some(new_entry) => {
                let next = self.next_objective(
                    entry.next_id(),
                    Operation::RemoveFromExisting,
                    group,
                    vlan,
                    BTreeSet::from([port]),
                    Some(context),
                );
                self.store.next_put(key, new_entry);
                self.send_next(device_id, next);
                self.touch();
                Ok(false)
            }
        }
    }

    // Removes the whole group replication from the given device.
    pub(crate) fn remove_group_from_device(
        &mut self,
        device_id: &DeviceId,
        group: IpAddr,
        vlan: VlanId,
    ) -> Result<(), Error> {
        let key = McastStoreKey::new(group, device_id.clone(), vlan)?;
        let Some(entry) = self.store.next(&key) else {
            Error::MissingNext(group, device_id.clone()).log();
            return Ok(());
        };

        let description = format!("remove group vlan {vlan}");
        let context = self.context(device_id, group, description);
        let fwd = self.forwarding_objective(
            Operation::Remove,
            group,
            vlan,
            entry.next_id(),
            context,
        );
        self.store.next_remove(&key);
        self.send_forwarding(device_id, fwd);
        self.touch();
        Ok(())
    }

    // Re-asserts the stored port set of the given device.
    pub(crate) fn verify_device(
        &mut self,
        device_id: &DeviceId,
        group: IpAddr,
        vlan: VlanId,
    ) -> Result<(), Error> {
        let Some(entry) = self.next_entry(group, device_id, vlan)? else {
            return Err(Error::MissingNext(group, device_id.clone()));
        };

        // Verification failures are left to the next corrector run.
        let description = format!("verify vlan {vlan}");
        let context =
            ObjectiveContext::new(device_id.clone(), group, description);
        let next = self.next_objective(
            entry.next_id(),
            Operation::Verify,
            group,
            vlan,
            entry.ports().clone(),
            Some(context),
        );
        self.send_next(device_id, next);
        Ok(())
    }

    // ----- Filtering -----

    // Installs the filter admitting multicast traffic on the given port.
    pub(crate) fn add_filter_to_device(
        &mut self,
        device_id: &DeviceId,
        port: PortNumber,
        vlan: VlanId,
        group: IpAddr,
        role: Option<McastRole>,
    ) {
        let Some(router_mac) = self.router_mac(device_id) else {
            return;
        };
        let filter_key = (device_id.clone(), port, vlan);
        if self.filters.contains(&filter_key) {
            Debug::FilterSkip(device_id, port, vlan).log();
            return;
        }

        let description = format!("add filter on port {port} vlan {vlan}");
        let context = self.context(device_id, group, description);
        let filter = self.filtering_objective(
            Operation::Add,
            port,
            vlan,
            group,
            router_mac,
            role,
            context,
        );
        self.filters.insert(filter_key);
        self.send_filtering(device_id, filter);
    }

    pub(crate) fn remove_filter_to_device(
        &mut self,
        device_id: &DeviceId,
        port: PortNumber,
        vlan: VlanId,
        group: IpAddr,
        role: Option<McastRole>,
    ) {
        let Some(router_mac) = self.router_mac(device_id) else {
            return;
        };

        let description = format!("remove filter on port {port} vlan {vlan}");
        let context = self.context(device_id, group, description);
        let filter = self.filtering_objective(
            Operation::Remove,
            port,
            vlan,
            group,
            router_mac,
            role,
            context,
        );
        self.filters.remove(&(device_id.clone(), port, vlan));
        self.send_filtering(device_id, filter);
    }

    // Forgets the filters installed on the given device, optionally only the
    // one of the given port, so that they are sent again when needed.
    pub(crate) fn forget_filters(
        &mut self,
        device_id: &DeviceId,
        port: Option<PortNumber>,
    ) {
        self.filters.retain(|(filter_device_id, filter_port, _)| {
            filter_device_id != device_id
                || port.is_some_and(|port| *filter_port != port)
        });
    }

    // Returns the router MAC of the given device, or `None` if filters can't
    // be installed on it.
    fn router_mac(&self, device_id: &DeviceId) -> Option<MacAddr> {
        let device_config = &self.services.device_config;
        if !device_config.is_configured(device_id) {
            debug!(%device_id, "skipping filter on unconfigured device");
            return None;
        }
        match device_config.device_mac(device_id) {
            Ok(mac) if mac == MacAddr::NONE => None,
            Ok(mac) => Some(mac),
            Err(error) => {
                error.log();
                None
            }
        }
    }

    // ----- Paths -----

    // Selects the path from `src` to `dst` used by the tree rooted at the
    // given source.
    pub(crate) fn get_path(
        &mut self,
        src: &DeviceId,
        dst: &DeviceId,
        group: IpAddr,
        source: &ConnectPoint,
    ) -> Option<Path> {
        let paths = self.services.topology.paths(src, dst);
        debug!(%src, %dst, count = paths.len(), "paths found");
        if paths.is_empty() {
            return None;
        }

        let config = &self.config;
        let device_config = &*self.services.device_config;
        let store = &self.store;
        let active_ports = |device_id: &DeviceId| {
            let vlan = device_vlan(config, device_config, device_id, source);
            let key = McastStoreKey::new(group, device_id.clone(), vlan).ok()?;
            store.next(&key).map(|entry| entry.ports().clone())
        };
        path::select(&group, paths, device_config, active_ports, &mut self.rng)
    }

    // Programs every hop of the given path, recording transit roles.
    pub(crate) fn install_path(
        &mut self,
        group: IpAddr,
        source: &ConnectPoint,
        path: &Path,
    ) -> Result<(), Error> {
        let egress_vlan = self.assigned_vlan(None);
        for link in &path.links {
            let vlan = self.device_vlan(&link.src.device_id, source);
            self.add_port_to_device(
                &link.src.device_id,
                link.src.port,
                group,
                vlan,
            )?;
            self.add_filter_to_device(
                &link.dst.device_id,
                link.dst.port,
                egress_vlan,
                group,
                None,
            );
        }

        for link in path
            .links
            .iter()
            .filter(|link| link.src.device_id != source.device_id)
        {
            // Devices serving local sinks keep their egress role.
            let device_id = &link.src.device_id;
            let role = self.role(group, device_id, source)?;
            if role == Some(McastRole::Egress) {
                continue;
            }
            self.role_put(group, device_id, source, McastRole::Transit)?;
        }
        Ok(())
    }

    // Returns the fabric-facing output ports of the ingress device.
    pub(crate) fn ingress_transit_ports(
        &self,
        group: IpAddr,
        ingress: &DeviceId,
        source: &ConnectPoint,
    ) -> Result<BTreeSet<PortNumber>, Error> {
        let vlan = self.device_vlan(ingress, source);
        let Some(entry) = self.next_entry(group, ingress, vlan)? else {
            Error::MissingNext(group, ingress.clone()).log();
            return Ok(Default::default());
        };

        let device_config = &self.services.device_config;
        let ports = entry
            .ports()
            .iter()
            .copied()
            .filter(|port| {
                let cp = ConnectPoint::new(ingress.clone(), *port);
                device_config.port_subnets(&cp).is_empty()
            })
            .collect();
        Ok(ports)
    }

    // Returns whether the given sink is already served by the tree rooted at
    // the given source.
    pub(crate) fn is_sink_for_source(
        &self,
        group: IpAddr,
        sink: &ConnectPoint,
        source: &ConnectPoint,
    ) -> Result<bool, Error> {
        let vlan = self.device_vlan(&sink.device_id, source);
        let served = self
            .next_entry(group, &sink.device_id, vlan)?
            .is_some_and(|entry| entry.contains(sink.port));
        let role = if sink.device_id == source.device_id {
            McastRole::Ingress
        } else {
            McastRole::Egress
        };
        let has_role = self
            .store
            .devices(group, role, Some(source))
            .contains(&sink.device_id);
        Ok(served && has_role)
    }

    // ----- Roles -----

    pub(crate) fn devices(
        &self,
        group: IpAddr,
        role: McastRole,
        source: &ConnectPoint,
    ) -> BTreeSet<DeviceId> {
        self.store.devices(group, role, Some(source))
    }

    pub(crate) fn role(
        &self,
        group: IpAddr,
        device_id: &DeviceId,
        source: &ConnectPoint,
    ) -> Result<Option<McastRole>, Error> {
        let key =
            McastRoleStoreKey::new(group, device_id.clone(), source.clone())?;
        Ok(self.store.role(&key))
    }

    pub(crate) fn role_put(
        &mut self,
        group: IpAddr,
        device_id: &DeviceId,
        source: &ConnectPoint,
        role: McastRole,
    ) -> Result<(), Error> {
        let key =
            McastRoleStoreKey::new(group, device_id.clone(), source.clone())?;
        Debug::RoleUpdate(&key, role).log();
        self.store.role_put(key, role);
        self.touch();
        Ok(())
    }

    pub(crate) fn role_remove(
        &mut self,
        group: IpAddr,
        device_id: &DeviceId,
        source: &ConnectPoint,
    ) -> Result<(), Error> {
        let key =
            McastRoleStoreKey::new(group, device_id.clone(), source.clone())?;
        if self.store.role_remove(&key).is_some() {
            Debug::RoleRemove(&key).log();
            self.touch();
        }
        Ok(())
    }

    // ----- Objectives -----

    fn context(
        &self,
        device_id: &DeviceId,
        group: IpAddr,
        description: String,
    ) -> ObjectiveContext {
        let retry_tx = if self.config.objective_retry {
            self.retry_tx.clone()
        } else {
            None
        };
        ObjectiveContext::new(device_id.clone(), group, description)
            .with_retry(retry_tx)
    }

    fn next_objective(
        &self,
        id: u32,
        op: Operation,
        group: IpAddr,
        vlan: VlanId,
        ports: BTreeSet<PortNumber>,
        context: Option<ObjectiveContext>,
    ) -> NextObjective {
        NextObjective {
            id,
            op,
            group,
            vlan,
            ports,
            pop_vlan: self.config.egress_vlan().is_none(),
            context,
        }
    }

    fn forwarding_objective(
        &self,
        op: Operation,
        group: IpAddr,
        vlan: VlanId,
        next_id: u32,
        context: ObjectiveContext,
    ) -> ForwardingObjective {
        ForwardingObjective {
            op,
            ether_type: EtherType::from_group(&group),
            group,
            vlan,
            next_id,
            priority: self.config.priority,
            context: Some(context),
        }
    }

    fn filtering_objective(
        &self,
        op: Operation,
        port: PortNumber,
        vlan: VlanId,
        group: IpAddr,
        router_mac: MacAddr,
        role: Option<McastRole>,
        context: ObjectiveContext,
    ) -> FilteringObjective {
        // Traffic entering the source port is matched on the ingress VLAN,
        // the remaining ports on the egress VLAN.
        let vlan_match = match role {
            None => self.config.egress_vlan(),
            Some(_) => self.config.ingress_vlan(),
        };
        let (eth_dst_masked, router_mac) = if self.config.match_on_mac {
            (Some(MacAddr::multicast_masked(&group)), Some(router_mac))
        } else {
            (None, None)
        };
        FilteringObjective {
            op,
            port,
            vlan_match,
            assigned_vlan: vlan,
            eth_dst_masked,
            router_mac,
            priority: self.config.priority,
            context: Some(context),
        }
    }

    fn send_next(&self, device_id: &DeviceId, objective: NextObjective) {
        Debug::NextTx(device_id, &objective).log();
        self.services.flow_objectives.next(device_id, objective);
    }

    fn send_forwarding(
        &self,
        device_id: &DeviceId,
        objective: ForwardingObjective,
    ) {
        Debug::ForwardingTx(device_id, &objective).log();
        self.services.flow_objectives.forward(device_id, objective);
    }

    fn send_filtering(
        &self,
        device_id: &DeviceId,
        objective: FilteringObjective,
    ) {
        Debug::FilteringTx(device_id, &objective).log();
        self.services.flow_objectives.filter(device_id, objective);
    }
}

// ===== global functions =====

// Returns the VLAN assigned to multicast traffic.
//
// A configured egress VLAN is used everywhere. Otherwise, the internal VLAN
// of the given connect point is reused, falling back to the default
// internal VLAN.
pub(crate) fn assigned_vlan(
    config: &McastCfg,
    device_config: &dyn DeviceConfigService,
    cp: Option<&ConnectPoint>,
) -> VlanId {
    let egress_vlan = config.egress_vlan();
    if !egress_vlan.is_none() {
        return egress_vlan;
    }
    cp.and_then(|cp| device_config.internal_vlan(cp))
        .unwrap_or(config.default_internal_vlan)
}

pub(crate) fn device_vlan(
    config: &McastCfg,
    device_config: &dyn DeviceConfigService,
    device_id: &DeviceId,
    source: &ConnectPoint,
) -> VlanId {
    let cp = (*device_id == source.device_id).then_some(source);
    assigned_vlan(config, device_config, cp)
}
