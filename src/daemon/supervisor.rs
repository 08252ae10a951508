// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time;

use super::ShutdownSignal;
use crate::acquisition::{
    CsvSink, DeviceSession, PollError, PollSettings, PollSummary, PollingLoop, SampleSink,
};
use crate::config::DeviceConfig;
use crate::modbus::{RegisterTransport, TcpTransport};
use crate::registers::RegisterSchema;

/// How often the supervisor checks for shutdown or finished loops.
const WAIT_TICK: Duration = Duration::from_millis(100);

/// Factory for the per-device resources of a polling loop.
pub trait DeviceBackend {
    type Transport: RegisterTransport + 'static;
    type Sink: SampleSink + 'static;

    fn transport(&self, device: &DeviceConfig) -> Self::Transport;
    fn sink(&self, device: &DeviceConfig) -> Self::Sink;
}

/// Modbus TCP transports writing to CSV files.
#[derive(Debug, Clone)]
pub struct TcpCsvBackend {
    output_dir: PathBuf,
    timeout: Duration,
}

impl TcpCsvBackend {
    pub fn new<P: Into<PathBuf>>(output_dir: P, timeout: Duration) -> Self {
        Self {
            output_dir: output_dir.into(),
            timeout,
        }
    }
}

impl DeviceBackend for TcpCsvBackend {
    type Transport = TcpTransport;
    type Sink = CsvSink;

    fn transport(&self, device: &DeviceConfig) -> TcpTransport {
        TcpTransport::new(device.ip.clone(), device.port, device.id, self.timeout)
    }

    fn sink(&self, device: &DeviceConfig) -> CsvSink {
        CsvSink::new(&self.output_dir, device)
    }
}

/// Terminal state of one device loop.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOutcome {
    Completed(PollSummary),
    Failed { message: String },
}

impl DeviceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DeviceOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReport {
    pub device: DeviceConfig,
    pub outcome: DeviceOutcome,
}

/// Runs one polling loop per device, each in its own task.
///
/// A loop that fails or panics is reported and never affects the others.
/// Failed devices are not restarted.
pub struct PollSupervisor<B> {
    backend: B,
    schema: Arc<RegisterSchema>,
    settings: PollSettings,
    shutdown: ShutdownSignal,
}

impl<B: DeviceBackend> PollSupervisor<B> {
    pub fn new(
        backend: B,
        schema: Arc<RegisterSchema>,
        settings: PollSettings,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            backend,
            schema,
            settings,
            shutdown,
        }
    }

    /// Poll every device until shutdown is requested or every loop stopped,
    /// then wait for all loops and report their outcome in device order.
    pub async fn run(&self, devices: &[DeviceConfig]) -> Vec<DeviceReport> {
        info!("Starting {} polling loop(s)", devices.len());

        let tasks: Vec<(DeviceConfig, JoinHandle<Result<PollSummary, PollError>>)> = devices
            .iter()
            .map(|device| (device.clone(), self.spawn_loop(device)))
            .collect();

        while !self.shutdown.is_requested() && !tasks.iter().all(|(_, task)| task.is_finished()) {
            time::sleep(WAIT_TICK).await;
        }
        debug!("Waiting for polling loops to stop");

        let mut reports = Vec::with_capacity(tasks.len());
        for (device, task) in tasks {
            let outcome = match task.await {
                Ok(Ok(summary)) => {
                    info!(
                        "{}: stopped after {} samples ({} connection losses)",
                        device, summary.samples, summary.connection_losses
                    );
                    DeviceOutcome::Completed(summary)
                }
                Ok(Err(e)) => {
                    error!("{}: {}", device, e);
                    DeviceOutcome::Failed {
                        message: e.to_string(),
                    }
                }
                Err(e) => {
                    error!("{}: polling task panicked: {}", device, e);
                    DeviceOutcome::Failed {
                        message: format!("polling task panicked: {}", e),
                    }
                }
            };
            reports.push(DeviceReport { device, outcome });
        }
        reports
    }

    fn spawn_loop(&self, device: &DeviceConfig) -> JoinHandle<Result<PollSummary, PollError>> {
        let session = DeviceSession::new(device.clone(), self.backend.transport(device));
        let mut poller = PollingLoop::new(
            session,
            self.schema.clone(),
            self.backend.sink(device),
            self.settings,
            self.shutdown.clone(),
        );
        tokio::spawn(async move { poller.run().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_csv_backend_targets_device() {
        let backend = TcpCsvBackend::new("log", Duration::from_secs(2));
        let device = DeviceConfig::new("192.168.0.9", 1502, 4);

        let transport = backend.transport(&device);
        assert_eq!(transport.host(), "192.168.0.9");
        assert_eq!(transport.port(), 1502);
        assert_eq!(transport.slave_id(), 4);

        let sink = backend.sink(&device);
        assert!(sink.path().starts_with("log"));
    }

    #[test]
    fn test_outcome_failure_flag() {
        assert!(DeviceOutcome::Failed {
            message: "boom".to_string()
        }
        .is_failed());
        assert!(!DeviceOutcome::Completed(PollSummary::default()).is_failed());
    }
}
