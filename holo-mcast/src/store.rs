//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::fabric::{ConnectPoint, DeviceId, PortNumber, VlanId};

/// Role of a device in the forwarding tree of a multicast group.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum McastRole {
    /// The device directly connected to the source.
    Ingress,
    /// Intermediate device without local sinks.
    Transit,
    /// Device with at least one local sink, not hosting the source.
    Egress,
}

/// Identifies the participation of one device in the tree of one group.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct McastStoreKey {
    group: IpAddr,
    device_id: DeviceId,
    vlan: VlanId,
}

/// Identifies the role of one device in the tree of one (group, source).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct McastRoleStoreKey {
    group: IpAddr,
    device_id: DeviceId,
    source: ConnectPoint,
}

/// Output ports replicating a group on a device, along with the next
/// identifier handed out to the flow objective service.
///
/// The port set is never empty.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct NextEntry {
    next_id: u32,
    ports: BTreeSet<PortNumber>,
}

/// Key-value map with linearizable single-key operations.
///
/// Implementations are usually backed by a distributed store shared by all
/// controller instances.
pub trait ConsistentMap<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    fn put(&self, key: K, value: V) -> Option<V>;

    fn remove(&self, key: &K) -> Option<V>;

    fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    // Snapshot of all entries.
    fn entries(&self) -> Vec<(K, V)>;
}

/// Process-local `ConsistentMap` implementation.
///
/// Clones share the same underlying map, which allows several instances in
/// the same process to act as a cluster.
#[derive(Debug)]
pub struct MemoryMap<K, V> {
    inner: Arc<Mutex<BTreeMap<K, V>>>,
}

/// The two maps holding the forwarding state of all multicast trees.
#[derive(Clone)]
pub struct McastStore {
    nexts: Arc<dyn ConsistentMap<McastStoreKey, NextEntry>>,
    roles: Arc<dyn ConsistentMap<McastRoleStoreKey, McastRole>>,
}

// ===== impl McastRole =====

impl std::fmt::Display for McastRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            McastRole::Ingress => write!(f, "INGRESS"),
            McastRole::Transit => write!(f, "TRANSIT"),
            McastRole::Egress => write!(f, "EGRESS"),
        }
    }
}

// ===== impl McastStoreKey =====

impl McastStoreKey {
    pub fn new(
        group: IpAddr,
        device_id: DeviceId,
        vlan: VlanId,
    ) -> Result<McastStoreKey, Error> {
        if !group.is_multicast() {
            return Err(Error::InvalidGroup(group));
        }
        Ok(McastStoreKey {
            group,
            device_id,
            vlan,
        })
    }

    pub fn group(&self) -> IpAddr {
        self.group
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn vlan(&self) -> VlanId {
        self.vlan
    }
}

impl std::fmt::Display for McastStoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.device_id, self.vlan)
    }
}

// ===== impl McastRoleStoreKey =====

impl McastRoleStoreKey {
    pub fn new(
        group: IpAddr,
        device_id: DeviceId,
        source: ConnectPoint,
    ) -> Result<McastRoleStoreKey, Error> {
        if !group.is_multicast() {
            return Err(Error::InvalidGroup(group));
        }
        Ok(McastRoleStoreKey {
            group,
            device_id,
            source,
        })
    }

    pub fn group(&self) -> IpAddr {
        self.group
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn source(&self) -> &ConnectPoint {
        &self.source
    }
}

impl std::fmt::Display for McastRoleStoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.device_id, self.source)
    }
}

// ===== impl NextEntry =====

impl NextEntry {
    // Returns `None` if the port set is empty.
    pub fn new(next_id: u32, ports: BTreeSet<PortNumber>) -> Option<NextEntry> {
        if ports.is_empty() {
            return None;
        }
        Some(NextEntry { next_id, ports })
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn ports(&self) -> &BTreeSet<PortNumber> {
        &self.ports
    }

    pub fn contains(&self, port: PortNumber) -> bool {
        self.ports.contains(&port)
    }
}

// ===== impl MemoryMap =====

impl<K, V> MemoryMap<K, V> {
    pub fn new() -> MemoryMap<K, V> {
        MemoryMap {
            inner: Default::default(),
        }
    }

    fn map(&self) -> std::sync::MutexGuard<'_, BTreeMap<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Clone for MemoryMap<K, V> {
    fn clone(&self) -> MemoryMap<K, V> {
        MemoryMap {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Default for MemoryMap<K, V> {
    fn default() -> MemoryMap<K, V> {
        MemoryMap::new()
    }
}

impl<K, V> ConsistentMap<K, V> for MemoryMap<K, V>
where
    K: Clone + Ord + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        self.map().get(key).cloned()
    }

    fn put(&self, key: K, value: V) -> Option<V> {
        self.map().insert(key, value)
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.map().remove(key)
    }

    fn contains_key(&self, key: &K) -> bool {
        self.map().contains_key(key)
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.map()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

// ===== impl McastStore =====

impl McastStore {
    pub fn new(
        nexts: Arc<dyn ConsistentMap<McastStoreKey, NextEntry>>,
        roles: Arc<dyn ConsistentMap<McastRoleStoreKey, McastRole>>,
    ) -> McastStore {
        McastStore { nexts, roles }
    }

    // Creates a store backed by process-local maps.
    pub fn new_memory() -> McastStore {
        McastStore::new(
            Arc::new(MemoryMap::new()),
            Arc::new(MemoryMap::new()),
        )
    }

    // ----- Membership (next) map -----

    pub fn next(&self, key: &McastStoreKey) -> Option<NextEntry> {
        self.nexts.get(key)
    }

    pub fn next_put(&self, key: McastStoreKey, entry: NextEntry) {
        self.nexts.put(key, entry);
    }

    pub fn next_remove(&self, key: &McastStoreKey) -> Option<NextEntry> {
        self.nexts.remove(key)
    }

    pub fn next_entries(&self) -> Vec<(McastStoreKey, NextEntry)> {
        self.nexts.entries()
    }

    // Returns the groups replicated on the given device, optionally
    // restricted to the ones using the given output port.
    pub fn groups_on_device(
        &self,
        device_id: &DeviceId,
        port: Option<PortNumber>,
    ) -> BTreeSet<IpAddr> {
        self.nexts
            .entries()
            .into_iter()
            .filter(|(key, _)| key.device_id == *device_id)
            .filter(|(_, entry)| port.is_none_or(|port| entry.contains(port)))
            .map(|(key, _)| key.group)
            .collect()
    }

    // ----- Role map -----

    pub fn role(&self, key: &McastRoleStoreKey) -> Option<McastRole> {
        self.roles.get(key)
    }

    pub fn role_put(&self, key: McastRoleStoreKey, role: McastRole) {
        self.roles.put(key, role);
    }

    pub fn role_remove(&self, key: &McastRoleStoreKey) -> Option<McastRole> {
        self.roles.remove(key)
    }

    pub fn role_entries(&self) -> Vec<(McastRoleStoreKey, McastRole)> {
        self.roles.entries()
    }

    // Returns the devices holding the given role in the tree of the given
    // group, optionally restricted to the given source.
    pub fn devices(
        &self,
        group: IpAddr,
        role: McastRole,
        source: Option<&ConnectPoint>,
    ) -> BTreeSet<DeviceId> {
        self.roles
            .entries()
            .into_iter()
            .filter(|(key, value)| key.group == group && *value == role)
            .filter(|(key, _)| {
                source.is_none_or(|source| key.source == *source)
            })
            .map(|(key, _)| key.device_id)
            .collect()
    }
}

impl std::fmt::Debug for McastStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McastStore")
            .field("nexts", &self.nexts.entries().len())
            .field("roles", &self.roles.entries().len())
            .finish()
    }
}
