// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module defines the transport surface the acquisition code relies on
//! and provides its implementations.
//!
//! For avoiding confusion with the Modbus master/slave terminology, this
//! module uses the terms "server" and "client". The P30H meter is the server,
//! the logger is the client.
//!
//! ## Key Components
//!
//! - [`RegisterTransport`]: connect / close / read N words / write N words,
//!   bound to one `(host, port, slave id)` triple
//! - [`TcpTransport`]: Modbus TCP implementation on top of `tokio-modbus`
//! - [`MockTransport`]: scripted in-memory register map
//! - [`P30hSimulator`]: Modbus TCP server exposing a register schema, for
//!   bench tests without hardware
//!
//! ## Failure scopes
//!
//! [`TransportError::is_connection_fault`] tells a fault of the link itself
//! (the session must be reconnected) from a failure scoped to the requested
//! registers (exception response, short response, timeout).

pub mod mock;
pub mod simulator;
pub mod tcp_transport;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use mock::MockTransport;
pub use simulator::P30hSimulator;
pub use tcp_transport::TcpTransport;

/// Errors reported by a [`RegisterTransport`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("device answered request at address {address} with exception: {reason}")]
    Exception { address: u16, reason: String },

    #[error("device returned {actual} words at address {address}, expected {expected}")]
    ShortResponse {
        address: u16,
        expected: u16,
        actual: usize,
    },

    #[error("request at address {address} timed out after {timeout:?}")]
    Timeout { address: u16, timeout: Duration },

    #[error("connection lost: {0}")]
    Connection(String),

    #[error("transport is not connected")]
    NotConnected,
}

impl TransportError {
    /// `true` when the link itself failed and must be re-established.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            TransportError::Connection(_) | TransportError::NotConnected
        )
    }
}

/// Raw register access to one device.
///
/// Implementations are exclusively owned by one device session and never
/// shared between tasks.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Open the link. Returns `false` on failure, without retrying.
    async fn connect(&mut self) -> bool;

    /// Release the link. Calling it on a closed transport does nothing.
    async fn close(&mut self);

    /// Read `count` holding registers starting at `address`.
    async fn read_words(&mut self, address: u16, count: u16) -> Result<Vec<u16>, TransportError>;

    /// Write `values` to consecutive holding registers starting at `address`.
    async fn write_words(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError>;
}
