// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides the validation rules applied after deserialization.

use std::collections::HashSet;

use anyhow::Result;
use log::debug;

use super::acquisition::positive_duration;
use super::Config;

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is the special value "localhost".
///
/// # Arguments
///
/// * `addr` - The address string to validate
///
/// # Returns
///
/// `true` if the address is valid, `false` otherwise
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    addr == "localhost"
}

/// Validates the configuration against the rules polling relies on.
///
/// # Validation Rules
///
/// - **Device list**: at least one device, each with a non-empty host and a
///   non-zero port, no device listed twice
/// - **Host format**: host names that are not IP literals are accepted and
///   resolved at connect time
/// - **Timing**: interval and timeout convert to a non-zero duration, which
///   excludes negative, NaN, infinite and out-of-range values
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.devices.is_empty() {
        anyhow::bail!("No device configured");
    }

    let mut seen = HashSet::new();
    for device in &config.devices {
        if device.ip.trim().is_empty() {
            anyhow::bail!("Device with an empty address");
        }
        if device.port == 0 {
            anyhow::bail!("Invalid port number 0 for device {}", device.ip);
        }
        if !is_valid_ip_address(&device.ip) {
            debug!("Device address {} is not an IP literal", device.ip);
        }
        if !seen.insert(device) {
            anyhow::bail!("Device {} is listed more than once", device);
        }
    }

    let acquisition = &config.acquisition;
    if positive_duration(acquisition.interval_secs).is_none() {
        anyhow::bail!("Invalid poll interval: {} s", acquisition.interval_secs);
    }
    if positive_duration(acquisition.timeout_secs).is_none() {
        anyhow::bail!("Invalid transport timeout: {} s", acquisition.timeout_secs);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[test]
    fn test_ip_literals() {
        assert!(is_valid_ip_address("192.168.1.10"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("localhost"));
        assert!(!is_valid_ip_address("meter.local"));
    }

    #[test]
    fn test_rules() {
        let mut config = Config::default();
        assert!(validate_specific_rules(&config).is_ok());

        config.devices.push(DeviceConfig::default());
        assert!(validate_specific_rules(&config).is_err());

        config.devices = vec![DeviceConfig::new("10.0.0.1", 0, 1)];
        assert!(validate_specific_rules(&config).is_err());

        config.devices = vec![DeviceConfig::new("meter.local", 502, 1)];
        assert!(validate_specific_rules(&config).is_ok());

        config.acquisition.interval_secs = 0.0;
        assert!(validate_specific_rules(&config).is_err());

        config.acquisition.interval_secs = 1.0;
        config.acquisition.timeout_secs = f64::INFINITY;
        assert!(validate_specific_rules(&config).is_err());

        config.acquisition.timeout_secs = 1e30;
        assert!(validate_specific_rules(&config).is_err());

        config.acquisition.timeout_secs = 3.0;
        config.acquisition.interval_secs = 1e30;
        assert!(validate_specific_rules(&config).is_err());

        config.acquisition.interval_secs = 1e-12;
        assert!(validate_specific_rules(&config).is_err());

        config.acquisition.interval_secs = 1.0;
        config.devices.clear();
        assert!(validate_specific_rules(&config).is_err());
    }
}
