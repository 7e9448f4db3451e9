//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use derive_new::new;
use serde::{Deserialize, Serialize};

// Fabric device identifier (e.g. "of:0000000000000001").
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

// Device port number.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct PortNumber(pub u32);

// 802.1Q VLAN identifier. Zero stands for "untagged".
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct VlanId(pub u16);

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct MacAddr(pub [u8; 6]);

// Attachment point in the fabric.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[derive(new)]
pub struct ConnectPoint {
    pub device_id: DeviceId,
    pub port: PortNumber,
}

// Unidirectional infrastructure link.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[derive(new)]
pub struct Link {
    pub src: ConnectPoint,
    pub dst: ConnectPoint,
}

// Ordered sequence of links connecting two devices.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[derive(new)]
pub struct Path {
    pub links: Vec<Link>,
}

// ===== impl DeviceId =====

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> DeviceId {
        DeviceId(id.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> DeviceId {
        DeviceId(id)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== impl PortNumber =====

impl std::fmt::Display for PortNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== impl VlanId =====

impl VlanId {
    pub const NONE: VlanId = VlanId(0);
    pub const MAX: u16 = 4094;

    pub fn is_none(&self) -> bool {
        *self == VlanId::NONE
    }

    pub fn is_valid(&self) -> bool {
        self.0 <= VlanId::MAX
    }
}

impl Default for VlanId {
    fn default() -> VlanId {
        VlanId::NONE
    }
}

impl std::fmt::Display for VlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "None")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ===== impl MacAddr =====

impl MacAddr {
    pub const NONE: MacAddr = MacAddr([0; 6]);
    pub const IPV4_MULTICAST: MacAddr =
        MacAddr([0x01, 0x00, 0x5e, 0x00, 0x00, 0x00]);
    pub const IPV4_MULTICAST_MASK: MacAddr =
        MacAddr([0xff, 0xff, 0xff, 0x80, 0x00, 0x00]);
    pub const IPV6_MULTICAST: MacAddr =
        MacAddr([0x33, 0x33, 0x00, 0x00, 0x00, 0x00]);
    pub const IPV6_MULTICAST_MASK: MacAddr =
        MacAddr([0xff, 0xff, 0x00, 0x00, 0x00, 0x00]);

    // Returns the multicast destination MAC prefix and mask matching all
    // frames of the given group's address family.
    pub fn multicast_masked(group: &IpAddr) -> (MacAddr, MacAddr) {
        match group {
            IpAddr::V4(_) => {
                (MacAddr::IPV4_MULTICAST, MacAddr::IPV4_MULTICAST_MASK)
            }
            IpAddr::V6(_) => {
                (MacAddr::IPV6_MULTICAST, MacAddr::IPV6_MULTICAST_MASK)
            }
        }
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

// ===== impl ConnectPoint =====

impl std::fmt::Display for ConnectPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.device_id, self.port)
    }
}

// ===== impl Link =====

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

// ===== impl Path =====

impl Path {
    // Returns the device the path originates from.
    pub fn src(&self) -> Option<&DeviceId> {
        self.links.first().map(|link| &link.src.device_id)
    }

    // Returns the device the path terminates at.
    pub fn dst(&self) -> Option<&DeviceId> {
        self.links.last().map(|link| &link.dst.device_id)
    }

    // Returns whether any hop of the path traverses the given device.
    pub fn contains_device(&self, device_id: &DeviceId) -> bool {
        self.links.iter().any(|link| {
            link.src.device_id == *device_id || link.dst.device_id == *device_id
        })
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for link in &self.links {
            if first {
                write!(f, "{}", link.src)?;
                first = false;
            }
            write!(f, " -> {}", link.dst)?;
        }
        Ok(())
    }
}

// ===== global functions =====

// Returns whether the provided address is a valid multicast group address.
pub fn is_multicast_group(addr: &IpAddr) -> bool {
    addr.is_multicast()
}
