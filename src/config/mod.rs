// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the P30H logger
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file (or a
//! JSON file when the extension is `.json`).
//!
//! ## Configuration Structure
//!
//! - `devices`: the Modbus TCP devices to poll, `{ ip, port = 502, id = 1 }`
//! - `acquisition`: output directory, poll interval, sample budget and
//!   transport timeout
//!
//! A missing or invalid file is a startup error. A `<name>.sample.yaml` with
//! default values is written next to it for the operator to edit.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_p30h_logger::config::Config;
//! use std::path::Path;
//!
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("/var/log/p30h".into()), // Output directory
//!     Some(0.5),                    // Poll interval (s)
//!     None,                         // Sample budget
//!     Some(2.0),                    // Transport timeout (s)
//! );
//! config.validate().unwrap();
//!
//! println!("Polling {} device(s)", config.devices.len());
//! ```

pub mod acquisition;
pub mod device;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use acquisition::AcquisitionConfig;
pub use device::{load_device_list, DeviceConfig};
pub use utils::is_valid_ip_address;

/// Root configuration structure of the logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Devices to poll, in the order they are reported.
    ///
    /// Required: a configuration without a device list is rejected.
    pub devices: Vec<DeviceConfig>,

    /// Acquisition settings. If not specified, default values are used.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            devices: vec![DeviceConfig::default()],
            acquisition: AcquisitionConfig::default(),
        }
    }
}

fn is_json<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

impl Config {
    /// Helper method to create a sample config file when loading fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Same as [`Config::create_sample_config`], logging instead of failing.
    fn try_create_sample_config(path: &Path) {
        if let Err(e) = Self::create_sample_config(path) {
            error!("Failed to create sample config: {:#}", e);
        }
    }

    /// Load and validate the configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            error!("Configuration file not found at {:?}", path);
            Self::try_create_sample_config(path);
            anyhow::bail!("Configuration file {} does not exist", path.display());
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let parsed: Result<Config> = if is_json(path) {
            serde_json::from_str(&contents).map_err(anyhow::Error::from)
        } else {
            serde_yml::from_str(&contents).map_err(anyhow::Error::from)
        };
        let config = match parsed {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {:#}", err);
                Self::try_create_sample_config(path);
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {:#}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = config.validate() {
            error!("Configuration specific validation error: {}", err);
            Self::try_create_sample_config(path);
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file, as JSON for a `.json` path, YAML otherwise
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = if is_json(&path) {
            serde_json::to_string_pretty(self)
                .context("Failed to serialize configuration to JSON")?
        } else {
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?
        };

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(text.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Check the rules polling relies on, see [`utils::validate_specific_rules`].
    pub fn validate(&self) -> Result<()> {
        utils::validate_specific_rules(self)
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only the values that are provided override the existing configuration.
    ///
    /// # Parameters
    ///
    /// * `output_dir` - Directory receiving the CSV files
    /// * `interval_secs` - Delay between two samples of one device
    /// * `max_samples` - Samples per device, 0 for unlimited
    /// * `timeout_secs` - Bound on every transport operation
    pub fn apply_args(
        &mut self,
        output_dir: Option<PathBuf>,
        interval_secs: Option<f64>,
        max_samples: Option<u64>,
        timeout_secs: Option<f64>,
    ) {
        if let Some(dir) = output_dir {
            debug!("Overriding output directory from command line: {:?}", dir);
            self.acquisition.output_dir = dir;
        }
        if let Some(interval) = interval_secs {
            debug!("Overriding poll interval from command line: {}", interval);
            self.acquisition.interval_secs = interval;
        }
        if let Some(samples) = max_samples {
            debug!("Overriding sample budget from command line: {}", samples);
            self.acquisition.max_samples = samples;
        }
        if let Some(timeout) = timeout_secs {
            debug!("Overriding transport timeout from command line: {}", timeout);
            self.acquisition.timeout_secs = timeout;
        }
    }

    /// Replace the device list with the one read from a bare JSON array file
    pub fn apply_device_list<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.devices = load_device_list(path)?;
        Ok(())
    }
}
