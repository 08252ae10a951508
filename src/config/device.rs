// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    502
}

fn default_id() -> u8 {
    1
}

/// One Modbus TCP device to poll.
///
/// # Example
///
/// ```
/// use rust_p30h_logger::config::DeviceConfig;
///
/// let device: DeviceConfig = serde_json::from_str(r#"{ "ip": "192.168.1.10" }"#).unwrap();
/// assert_eq!(device.port, 502);
/// assert_eq!(device.id, 1);
/// assert_eq!(device.label(), "192.168.1.10:502 (id 1)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// IP address or host name of the device.
    pub ip: String,

    /// TCP port, 502 by default.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Modbus unit (slave) identifier, 1 by default.
    #[serde(default = "default_id")]
    pub id: u8,
}

impl DeviceConfig {
    pub fn new(ip: impl Into<String>, port: u16, id: u8) -> Self {
        Self {
            ip: ip.into(),
            port,
            id,
        }
    }

    /// `host:port (id N)`, used to name the device in logs and reports.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", default_port(), default_id())
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (id {})", self.ip, self.port, self.id)
    }
}

/// Load a bare JSON array of devices, e.g.
/// `[{ "ip": "192.168.1.10", "port": 502, "id": 1 }]`.
pub fn load_device_list<P: AsRef<Path>>(path: P) -> Result<Vec<DeviceConfig>> {
    let path = path.as_ref();
    debug!("Loading device list from {:?}", path);
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read device list at {:?}", path))?;
    let devices: Vec<DeviceConfig> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse device list from {:?}", path))?;
    debug!("{} device(s) loaded from {:?}", devices.len(), path);
    Ok(devices)
}
