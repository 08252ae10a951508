// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::acquisition::PollSettings;

/// Acquisition settings shared by every device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Directory receiving one CSV file per device and run.
    pub output_dir: PathBuf,

    /// Delay between two samples of the same device, in seconds.
    pub interval_secs: f64,

    /// Samples to take per device before stopping. 0 polls until interrupted.
    pub max_samples: u64,

    /// Bound on every connect, read and write, in seconds.
    pub timeout_secs: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("log"),
            interval_secs: 1.0,
            max_samples: 0,
            timeout_secs: 3.0,
        }
    }
}

/// `secs` as a non-zero [`Duration`], or `None` when it has no such
/// representation (negative, NaN, infinite, too large or below a nanosecond).
pub fn positive_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|duration| !duration.is_zero())
}

impl AcquisitionConfig {
    /// Poll interval. A configuration that passed validation always converts;
    /// otherwise the default is used and a warning is logged.
    pub fn interval(&self) -> Duration {
        positive_duration(self.interval_secs).unwrap_or_else(|| {
            warn!(
                "Poll interval {} s is not a valid duration, using 1 s",
                self.interval_secs
            );
            Duration::from_secs(1)
        })
    }

    /// Transport timeout, with the same fallback as [`AcquisitionConfig::interval`].
    pub fn timeout(&self) -> Duration {
        positive_duration(self.timeout_secs).unwrap_or_else(|| {
            warn!(
                "Transport timeout {} s is not a valid duration, using 3 s",
                self.timeout_secs
            );
            Duration::from_secs(3)
        })
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.interval(),
            max_samples: self.max_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_settings_from_seconds() {
        let config = AcquisitionConfig {
            interval_secs: 0.25,
            max_samples: 10,
            ..AcquisitionConfig::default()
        };
        assert_eq!(
            config.poll_settings(),
            PollSettings {
                interval: Duration::from_millis(250),
                max_samples: 10,
            }
        );
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_positive_duration_bounds() {
        assert_eq!(positive_duration(0.5), Some(Duration::from_millis(500)));
        assert_eq!(positive_duration(0.0), None);
        assert_eq!(positive_duration(1e-12), None);
        assert_eq!(positive_duration(-1.0), None);
        assert_eq!(positive_duration(f64::NAN), None);
        assert_eq!(positive_duration(f64::INFINITY), None);
        assert_eq!(positive_duration(1e30), None);
    }

    #[test]
    fn test_invalid_durations_fall_back() {
        let config = AcquisitionConfig {
            interval_secs: f64::NAN,
            timeout_secs: -1.0,
            ..AcquisitionConfig::default()
        };
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }
}
