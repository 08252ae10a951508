// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust P30H logger library
//!
//! This library polls P30H network meters over Modbus TCP and logs their
//! measurements to one CSV file per device.
//!
//! * [`registers`]: the register schema and the float32 word codec
//! * [`modbus`]: the transport seam, its Modbus TCP adapter and a simulator
//! * [`acquisition`]: device sessions, polling loops and sample sinks
//! * [`daemon`]: the supervisor running one loop per device, and shutdown
//! * [`config`]: configuration file, device list and command line overrides

pub mod acquisition;
pub mod config;
pub mod daemon;
pub mod modbus;
pub mod registers;
