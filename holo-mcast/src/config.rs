//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Error};
use crate::fabric::VlanId;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct McastCfg {
    // VLAN used on fabric-facing and sink-facing ports. Untagged if unset.
    pub egress_vlan: Option<VlanId>,
    // VLAN expected on the source-facing port. Untagged if unset.
    pub ingress_vlan: Option<VlanId>,
    pub default_internal_vlan: VlanId,
    // Bucket corrector period, in seconds.
    pub verify_interval: u64,
    // Delay before the first bucket corrector run, in seconds.
    pub verify_initial_delay: u64,
    // Quiet period required before the tree is considered stable, in
    // seconds.
    pub stability_threshold: u64,
    // Re-assert the stored state as soon as an objective fails instead of
    // waiting for the next bucket corrector run.
    pub objective_retry: bool,
    pub priority: u32,
    pub match_on_mac: bool,
}

// ===== impl McastCfg =====

impl McastCfg {
    pub const DFLT_INTERNAL_VLAN: VlanId = VlanId(4094);
    pub const DFLT_VERIFY_INTERVAL: u64 = 30;
    pub const DFLT_VERIFY_INITIAL_DELAY: u64 = 10;
    pub const DFLT_STABILITY_THRESHOLD: u64 = 5;
    pub const DFLT_PRIORITY: u32 = 110;

    // Loads the configuration from the given TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<McastCfg, Error> {
        let config_str =
            std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        McastCfg::parse(&config_str)
    }

    // Parses the configuration from a TOML string.
    pub fn parse(config_str: &str) -> Result<McastCfg, Error> {
        let config = toml::from_str(config_str).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    // Egress VLAN, or `VlanId::NONE` when egress traffic is untagged.
    pub fn egress_vlan(&self) -> VlanId {
        self.egress_vlan.unwrap_or(VlanId::NONE)
    }

    pub fn ingress_vlan(&self) -> VlanId {
        self.ingress_vlan.unwrap_or(VlanId::NONE)
    }

    // The period can't be shorter than one second.
    pub fn verify_interval(&self) -> Duration {
        Duration::from_secs(self.verify_interval.max(1))
    }

    pub fn verify_initial_delay(&self) -> Duration {
        Duration::from_secs(self.verify_initial_delay)
    }

    pub fn stability_threshold(&self) -> Duration {
        Duration::from_secs(self.stability_threshold)
    }
}

impl Default for McastCfg {
    fn default() -> McastCfg {
        McastCfg {
            egress_vlan: None,
            ingress_vlan: None,
            default_internal_vlan: McastCfg::DFLT_INTERNAL_VLAN,
            verify_interval: McastCfg::DFLT_VERIFY_INTERVAL,
            verify_initial_delay: McastCfg::DFLT_VERIFY_INITIAL_DELAY,
            stability_threshold: McastCfg::DFLT_STABILITY_THRESHOLD,
            objective_retry: false,
            priority: McastCfg::DFLT_PRIORITY,
            match_on_mac: false,
        }
    }
}
