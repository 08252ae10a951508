// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! Runs the polling loops of every configured device and stops them cleanly.
//!
//! ## Components
//!
//! * **Shutdown**: the process-wide stop request, set once by Ctrl+C and
//!   observed by every loop and by the supervisor
//! * **Supervisor**: spawns one polling task per device, waits for them and
//!   reports how each one ended
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_p30h_logger::{
//!     config::Config,
//!     daemon::{PollSupervisor, ShutdownSignal, TcpCsvBackend},
//!     registers::RegisterSchema,
//! };
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!     let shutdown = ShutdownSignal::new();
//!
//!     let stopper = shutdown.clone();
//!     tokio::spawn(async move {
//!         if tokio::signal::ctrl_c().await.is_ok() {
//!             stopper.request();
//!         }
//!     });
//!
//!     let backend = TcpCsvBackend::new(&config.acquisition.output_dir, config.acquisition.timeout());
//!     let supervisor = PollSupervisor::new(
//!         backend,
//!         Arc::new(RegisterSchema::p30h()?),
//!         config.acquisition.poll_settings(),
//!         shutdown,
//!     );
//!     for report in supervisor.run(&config.devices).await {
//!         println!("{}: {:?}", report.device, report.outcome);
//!     }
//!     Ok(())
//! }
//! ```

pub mod shutdown;
pub mod supervisor;

pub use shutdown::ShutdownSignal;
pub use supervisor::{DeviceBackend, DeviceOutcome, DeviceReport, PollSupervisor, TcpCsvBackend};
