//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use tracing::{debug, error, warn};

use crate::fabric::{ConnectPoint, DeviceId};

// Multicast tree maintenance errors.
#[derive(Debug)]
pub enum Error {
    // Authority
    NotLeader(IpAddr),
    NotMaster(IpAddr, DeviceId),
    // Missing prerequisites
    MissingSource(IpAddr),
    MissingIngress(IpAddr, Option<ConnectPoint>),
    MissingNext(IpAddr, DeviceId),
    // Topology
    NoPath(IpAddr, DeviceId, DeviceId),
    // Invalid input
    SameSourceSinkPort(IpAddr, ConnectPoint),
    InvalidGroup(IpAddr),
    // Collaborators
    DeviceConfig(DeviceConfigError),
    // Other
    Config(ConfigError),
}

// Device configuration lookup errors.
#[derive(Debug)]
pub enum DeviceConfigError {
    NotConfigured(DeviceId),
}

// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::NotLeader(group) => {
                debug!(%group, "{}", self);
            }
            Error::NotMaster(group, device_id) => {
                debug!(%group, %device_id, "{}", self);
            }
            Error::MissingSource(group) => {
                warn!(%group, "{}", self);
            }
            Error::MissingIngress(group, source) => {
                let source = source.as_ref().map(|source| source.to_string());
                warn!(%group, ?source, "{}", self);
            }
            Error::MissingNext(group, device_id) => {
                warn!(%group, %device_id, "{}", self);
            }
            Error::NoPath(group, src, dst) => {
                warn!(%group, %src, %dst, "{}", self);
            }
            Error::SameSourceSinkPort(group, cp) => {
                warn!(%group, connect_point = %cp, "{}", self);
            }
            Error::InvalidGroup(group) => {
                warn!(%group, "{}", self);
            }
            Error::DeviceConfig(error) => {
                error.log();
            }
            Error::Config(error) => {
                error!(error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotLeader(..) => {
                write!(f, "skipping group due to lack of leadership")
            }
            Error::NotMaster(..) => {
                write!(f, "skipping group due to lack of mastership")
            }
            Error::MissingSource(..) => {
                write!(f, "missing source for group")
            }
            Error::MissingIngress(..) => {
                write!(f, "missing ingress device for group")
            }
            Error::MissingNext(..) => {
                write!(f, "device is not serving group")
            }
            Error::NoPath(..) => {
                write!(f, "unable to find a path")
            }
            Error::SameSourceSinkPort(..) => {
                write!(f, "sink is on the same port of source")
            }
            Error::InvalidGroup(..) => {
                write!(f, "not a multicast group address")
            }
            Error::DeviceConfig(error) => error.fmt(f),
            Error::Config(..) => {
                write!(f, "failed to load configuration")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DeviceConfig(error) => Some(error),
            Error::Config(error) => Some(error),
            _ => None,
        }
    }
}

impl From<DeviceConfigError> for Error {
    fn from(error: DeviceConfigError) -> Error {
        Error::DeviceConfig(error)
    }
}

impl From<ConfigError> for Error {
    fn from(error: ConfigError) -> Error {
        Error::Config(error)
    }
}

// ===== impl DeviceConfigError =====

impl DeviceConfigError {
    pub(crate) fn log(&self) {
        match self {
            DeviceConfigError::NotConfigured(device_id) => {
                warn!(%device_id, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for DeviceConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceConfigError::NotConfigured(..) => {
                write!(f, "device configuration not found")
            }
        }
    }
}

impl std::error::Error for DeviceConfigError {}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(..) => {
                write!(f, "failed to read configuration file")
            }
            ConfigError::Parse(..) => {
                write!(f, "failed to parse configuration file")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(error) => Some(error),
            ConfigError::Parse(error) => Some(error),
        }
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
