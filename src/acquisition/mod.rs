// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Data acquisition module
//!
//! This module reads the register schema from one device at a time and
//! stores each sample:
//!
//! * [`DeviceSession`] turns transport word access into typed register values
//! * [`PollingLoop`] samples a session at a fixed interval
//! * [`SampleSink`] receives the rows, [`CsvSink`] writes them to disk

pub mod csv_sink;
pub mod polling;
pub mod session;
pub mod sink;

pub use csv_sink::CsvSink;
pub use polling::{PollError, PollSettings, PollState, PollSummary, PollingLoop};
pub use session::{DeviceSession, SessionError};
pub use sink::{MemorySink, SampleSink};
