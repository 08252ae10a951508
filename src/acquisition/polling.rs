// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Polling loop
//!
//! Drives one [`DeviceSession`] through `Connecting -> Polling -> Stopped`.
//! Each iteration checks the shutdown signal, then the sample budget, then
//! reads the schema, hands the row to the sink and sleeps for the interval.
//!
//! A failed initial connect ends the loop with an error. A connection lost
//! while polling does not: the iteration is skipped and the loop reconnects
//! on the next one, forever, at the fixed poll interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use log::{debug, error, info, warn};
use thiserror::Error;

use super::session::DeviceSession;
use super::sink::SampleSink;
use crate::daemon::ShutdownSignal;
use crate::modbus::RegisterTransport;
use crate::registers::RegisterSchema;

/// Timing and budget of one polling loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Number of samples to take, 0 for unlimited.
    pub max_samples: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_samples: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Connecting,
    Polling,
    Stopped,
}

/// What a loop did before stopping normally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Rows handed to the sink.
    pub samples: u64,
    /// Whole reads lost to a connection fault.
    pub connection_losses: u64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PollError {
    #[error("could not connect to {device}")]
    Connect { device: String },

    #[error("sink for {device} failed: {message}")]
    Sink { device: String, message: String },
}

/// Poll one device until shutdown, budget exhaustion or a fatal error.
pub struct PollingLoop<T, S> {
    session: DeviceSession<T>,
    schema: Arc<RegisterSchema>,
    sink: S,
    settings: PollSettings,
    shutdown: ShutdownSignal,
    state: PollState,
}

impl<T: RegisterTransport, S: SampleSink> PollingLoop<T, S> {
    pub fn new(
        session: DeviceSession<T>,
        schema: Arc<RegisterSchema>,
        sink: S,
        settings: PollSettings,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            session,
            schema,
            sink,
            settings,
            shutdown,
            state: PollState::Connecting,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn budget_exhausted(&self, samples: u64) -> bool {
        self.settings.max_samples > 0 && samples >= self.settings.max_samples
    }

    /// Run the loop to completion. The session is closed on every exit path.
    pub async fn run(&mut self) -> Result<PollSummary, PollError> {
        let device = self.session.device().label();
        self.state = PollState::Connecting;
        info!("{}: connecting", device);
        if !self.session.connect().await {
            error!("{}: connection failed, device will not be polled", device);
            self.session.close().await;
            self.state = PollState::Stopped;
            return Err(PollError::Connect { device });
        }

        self.state = PollState::Polling;
        info!(
            "{}: polling {} registers every {:?}",
            device,
            self.schema.len(),
            self.settings.interval
        );

        let mut summary = PollSummary::default();
        let outcome = loop {
            if self.shutdown.is_requested() {
                info!("{}: shutdown requested", device);
                break Ok(());
            }
            if self.budget_exhausted(summary.samples) {
                info!("{}: {} samples taken", device, summary.samples);
                break Ok(());
            }

            if !self.session.is_connected() {
                if self.session.connect().await {
                    info!("{}: reconnected", device);
                } else {
                    warn!("{}: reconnect failed, retrying", device);
                    tokio::time::sleep(self.settings.interval).await;
                    continue;
                }
            }

            let timestamp = Local::now();
            match self.session.read(&self.schema).await {
                Ok(results) => {
                    if let Err(e) = self.sink.append(&timestamp, &self.schema, results) {
                        error!("{}: {:#}", device, e);
                        break Err(PollError::Sink {
                            device: device.clone(),
                            message: format!("{:#}", e),
                        });
                    }
                    summary.samples += 1;
                    debug!("{}: sample {} written", device, summary.samples);
                }
                Err(e) => {
                    summary.connection_losses += 1;
                    warn!("{}", e);
                }
            }

            if self.budget_exhausted(summary.samples) {
                continue;
            }
            tokio::time::sleep(self.settings.interval).await;
        };

        self.session.close().await;
        self.state = PollState::Stopped;
        outcome.map(|()| summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::sink::MemorySink;
    use crate::config::DeviceConfig;
    use crate::modbus::MockTransport;
    use crate::registers::{RegisterDescriptor, SampleResult};
    use anyhow::Result;
    use chrono::DateTime;

    fn schema() -> Arc<RegisterSchema> {
        Arc::new(
            RegisterSchema::new(vec![RegisterDescriptor::int16("Status", "ST", "-", 1)]).unwrap(),
        )
    }

    fn settings(max_samples: u64) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(5),
            max_samples,
        }
    }

    fn polling_loop<S: SampleSink>(
        transport: MockTransport,
        sink: S,
        settings: PollSettings,
        shutdown: ShutdownSignal,
    ) -> PollingLoop<MockTransport, S> {
        let session = DeviceSession::new(DeviceConfig::new("10.0.0.7", 502, 2), transport);
        PollingLoop::new(session, schema(), sink, settings, shutdown)
    }

    #[tokio::test]
    async fn test_budget_limits_reads() {
        let transport = MockTransport::new().with_word(1, 5);
        let sink = MemorySink::new();
        let mut poller = polling_loop(
            transport.clone(),
            sink.clone(),
            settings(3),
            ShutdownSignal::new(),
        );

        let summary = poller.run().await.unwrap();
        assert_eq!(summary.samples, 3);
        assert_eq!(transport.read_calls(), 3);
        assert_eq!(sink.row_count(), 3);
        assert_eq!(poller.state(), PollState::Stopped);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_invalid_registers_still_count_as_samples() {
        let transport = MockTransport::new();
        let sink = MemorySink::new();
        let mut poller = polling_loop(transport.clone(), sink.clone(), settings(2), ShutdownSignal::new());

        let summary = poller.run().await.unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(sink.rows()[0][1], "");
    }

    #[tokio::test]
    async fn test_shutdown_prevents_next_iteration() {
        let transport = MockTransport::new().with_word(1, 5);
        let shutdown = ShutdownSignal::new();
        let sink = MemorySink::new().stop_after(2, shutdown.clone());
        let mut poller = polling_loop(transport.clone(), sink.clone(), settings(0), shutdown);

        let summary = poller.run().await.unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(transport.read_calls(), 2);
        assert_eq!(sink.row_count(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_during_sleep_stops_before_next_read() {
        let transport = MockTransport::new().with_word(1, 5);
        let sink = MemorySink::new();
        let shutdown = ShutdownSignal::new();
        let interval = Duration::from_millis(300);
        let mut poller = polling_loop(
            transport.clone(),
            sink.clone(),
            PollSettings {
                interval,
                max_samples: 0,
            },
            shutdown.clone(),
        );

        let stopper = shutdown.clone();
        let observed = transport.clone();
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            // The first sample is taken and the loop is sleeping
            let reads = observed.read_calls();
            stopper.request();
            reads
        });

        let started = tokio::time::Instant::now();
        let summary = poller.run().await.unwrap();
        assert_eq!(trigger.await.unwrap(), 1);
        assert_eq!(summary.samples, 1);
        assert_eq!(transport.read_calls(), 1);
        assert_eq!(sink.row_count(), 1);
        // The sleep in progress is not cut short
        assert!(started.elapsed() >= interval);
        assert_eq!(poller.state(), PollState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_takes_no_sample() {
        let transport = MockTransport::new().with_word(1, 5);
        let shutdown = ShutdownSignal::new();
        shutdown.request();
        let mut poller = polling_loop(transport.clone(), MemorySink::new(), settings(0), shutdown);

        let summary = poller.run().await.unwrap();
        assert_eq!(summary, PollSummary::default());
        assert_eq!(transport.read_calls(), 0);
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_fatal() {
        let transport = MockTransport::new().with_word(1, 5);
        transport.refuse_connect(true);
        let sink = MemorySink::new();
        let mut poller = polling_loop(transport.clone(), sink.clone(), settings(3), ShutdownSignal::new());

        let err = poller.run().await.unwrap_err();
        assert_eq!(
            err,
            PollError::Connect {
                device: "10.0.0.7:502 (id 2)".to_string()
            }
        );
        assert_eq!(poller.state(), PollState::Stopped);
        assert_eq!(transport.read_calls(), 0);
        assert_eq!(sink.row_count(), 0);
        assert!(sink.header().is_none());
    }

    /// Drops the link once, right after the first row.
    struct DroppingSink {
        inner: MemorySink,
        transport: MockTransport,
    }

    impl SampleSink for DroppingSink {
        fn append(
            &mut self,
            timestamp: &DateTime<Local>,
            schema: &RegisterSchema,
            results: &[SampleResult],
        ) -> Result<()> {
            self.inner.append(timestamp, schema, results)?;
            if self.inner.row_count() == 1 {
                self.transport.drop_connection_once();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_connection_loss_is_retried() {
        let transport = MockTransport::new().with_word(1, 5);
        let sink = DroppingSink {
            inner: MemorySink::new(),
            transport: transport.clone(),
        };
        let mut poller = polling_loop(transport.clone(), sink, settings(3), ShutdownSignal::new());

        let summary = poller.run().await.unwrap();
        assert_eq!(
            summary,
            PollSummary {
                samples: 3,
                connection_losses: 1
            }
        );
        assert_eq!(transport.connect_attempts(), 2);
        assert_eq!(poller.sink().inner.row_count(), 3);
    }

    #[tokio::test]
    async fn test_sink_failure_stops_the_loop() {
        let transport = MockTransport::new().with_word(1, 5);
        let mut poller = polling_loop(
            transport.clone(),
            MemorySink::failing(),
            settings(0),
            ShutdownSignal::new(),
        );

        let err = poller.run().await.unwrap_err();
        assert!(matches!(err, PollError::Sink { .. }));
        assert_eq!(transport.read_calls(), 1);
        assert!(!transport.is_connected());
        assert_eq!(poller.state(), PollState::Stopped);
    }
}
