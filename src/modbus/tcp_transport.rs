// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP transport
//!
//! [`RegisterTransport`] implementation talking to a Modbus TCP server with
//! `tokio-modbus`. Registers are accessed as holding registers (function
//! codes 0x03, 0x06 and 0x10). Every network operation is bounded by the
//! configured timeout.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::net::lookup_host;
use tokio::time;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;

use super::{RegisterTransport, TransportError};

/// Modbus TCP client bound to one device.
pub struct TcpTransport {
    host: String,
    port: u16,
    slave_id: u8,
    timeout: Duration,
    ctx: Option<Context>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, slave_id: u8, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            slave_id,
            timeout,
            ctx: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    /// `true` while a Modbus context is open.
    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn resolve(host: &str, port: u16, timeout: Duration) -> Option<SocketAddr> {
        let target = format!("{}:{}", host, port);
        let lookup = time::timeout(timeout, lookup_host(target.as_str())).await;
        match lookup {
            Ok(Ok(mut addrs)) => {
                let addr = addrs.next();
                if addr.is_none() {
                    warn!("No address found for {}", target);
                }
                addr
            }
            Ok(Err(e)) => {
                warn!("Failed to resolve {}: {}", target, e);
                None
            }
            Err(_) => {
                warn!("Resolving {} timed out after {:?}", target, timeout);
                None
            }
        }
    }

    async fn open(host: String, port: u16, slave_id: u8, timeout: Duration) -> Option<Context> {
        let socket_addr = Self::resolve(&host, port, timeout).await?;

        debug!(
            "Connecting to Modbus server at {} (slave {})",
            socket_addr, slave_id
        );
        let attempt = time::timeout(timeout, tcp::connect_slave(socket_addr, Slave(slave_id))).await;
        match attempt {
            Ok(Ok(ctx)) => Some(ctx),
            Ok(Err(e)) => {
                warn!("Failed to connect to {}: {}", socket_addr, e);
                None
            }
            Err(_) => {
                warn!(
                    "Connection to {} timed out after {:?}",
                    socket_addr, timeout
                );
                None
            }
        }
    }

    /// Replace the context after a timed out request.
    ///
    /// The late reply of the abandoned request would otherwise be read as the
    /// answer to the next one. The old stream is dropped without a graceful
    /// disconnect. When the new link cannot be opened the transport is left
    /// closed.
    async fn reset_link(&mut self) {
        self.ctx = None;
        debug!("Reopening link to {}:{} after a timeout", self.host, self.port);
        self.ctx = Self::open(self.host.clone(), self.port, self.slave_id, self.timeout).await;
    }

    fn context(&mut self) -> Result<&mut Context, TransportError> {
        self.ctx.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl RegisterTransport for TcpTransport {
    async fn connect(&mut self) -> bool {
        self.close().await;
        self.ctx = Self::open(self.host.clone(), self.port, self.slave_id, self.timeout).await;
        self.ctx.is_some()
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                debug!("Error while disconnecting from {}: {}", self.host, e);
            }
        }
    }

    async fn read_words(&mut self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        let timeout = self.timeout;
        let ctx = self.context()?;
        let response = time::timeout(timeout, ctx.read_holding_registers(address, count)).await;
        match response {
            Err(_) => {
                self.reset_link().await;
                Err(TransportError::Timeout { address, timeout })
            }
            Ok(Err(e)) => Err(TransportError::Connection(e.to_string())),
            Ok(Ok(Err(exception))) => Err(TransportError::Exception {
                address,
                reason: exception.to_string(),
            }),
            Ok(Ok(Ok(words))) => {
                if words.len() < count as usize {
                    return Err(TransportError::ShortResponse {
                        address,
                        expected: count,
                        actual: words.len(),
                    });
                }
                Ok(words)
            }
        }
    }

    async fn write_words(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError> {
        let timeout = self.timeout;
        let ctx = self.context()?;
        let response = match values {
            [single] => time::timeout(timeout, ctx.write_single_register(address, *single)).await,
            _ => time::timeout(timeout, ctx.write_multiple_registers(address, values)).await,
        };
        match response {
            Err(_) => {
                self.reset_link().await;
                Err(TransportError::Timeout { address, timeout })
            }
            Ok(Err(e)) => Err(TransportError::Connection(e.to_string())),
            Ok(Ok(Err(exception))) => Err(TransportError::Exception {
                address,
                reason: exception.to_string(),
            }),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal Modbus TCP server answering reads with `address + 100`.
    /// Requests at `slow_address` are answered after `delay`.
    async fn start_late_server(slow_address: u16, delay: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    // MBAP header (7 bytes) + function, address, count
                    let mut request = [0u8; 12];
                    while stream.read_exact(&mut request).await.is_ok() {
                        let address = u16::from_be_bytes([request[8], request[9]]);
                        let count = u16::from_be_bytes([request[10], request[11]]);
                        if address == slow_address {
                            time::sleep(delay).await;
                        }
                        let mut reply = request[0..4].to_vec();
                        reply.extend_from_slice(&(3 + 2 * count).to_be_bytes());
                        reply.push(request[6]);
                        reply.push(0x03);
                        reply.push((2 * count) as u8);
                        for offset in 0..count {
                            reply.extend_from_slice(&(address + offset + 100).to_be_bytes());
                        }
                        if stream.write_all(&reply).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut transport = TcpTransport::new("127.0.0.1", 502, 1, Duration::from_millis(100));
        assert_eq!(
            transport.read_words(0, 1).await,
            Err(TransportError::NotConnected)
        );
        assert_eq!(
            transport.write_words(0, &[1]).await,
            Err(TransportError::NotConnected)
        );
        // Closing an unopened transport is a no-op
        transport.close().await;
    }

    #[tokio::test]
    async fn test_connect_to_unresolvable_host_fails() {
        let mut transport =
            TcpTransport::new("host.invalid", 502, 1, Duration::from_millis(500));
        assert!(!transport.connect().await);
    }

    #[tokio::test]
    async fn test_timeout_reopens_link_for_next_request() {
        let addr = start_late_server(10, Duration::from_millis(300)).await;
        let mut transport =
            TcpTransport::new("127.0.0.1", addr.port(), 1, Duration::from_millis(100));
        assert!(transport.connect().await);

        assert!(matches!(
            transport.read_words(10, 1).await,
            Err(TransportError::Timeout { address: 10, .. })
        ));
        assert!(transport.is_connected());
        // The late answer to address 10 must not be taken for these
        assert_eq!(transport.read_words(11, 1).await, Ok(vec![111]));
        assert_eq!(transport.read_words(12, 2).await, Ok(vec![112, 113]));

        // Still answers once the abandoned reply would have arrived
        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(transport.read_words(11, 1).await, Ok(vec![111]));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_slow_register_only_invalidates_itself() {
        use crate::acquisition::DeviceSession;
        use crate::config::DeviceConfig;
        use crate::registers::{RegisterDescriptor, RegisterSchema, RegisterValue};

        let addr = start_late_server(10, Duration::from_millis(300)).await;
        let schema = RegisterSchema::new(vec![
            RegisterDescriptor::int16("Alpha", "A", "-", 10),
            RegisterDescriptor::int16("Beta", "B", "-", 11),
            RegisterDescriptor::int16("Gamma", "C", "-", 12),
        ])
        .unwrap();
        let device = DeviceConfig::new("127.0.0.1", addr.port(), 1);
        let transport =
            TcpTransport::new("127.0.0.1", addr.port(), 1, Duration::from_millis(100));
        let mut session = DeviceSession::new(device, transport);
        assert!(session.connect().await);

        let results = session.read(&schema).await.unwrap().to_vec();
        assert!(!results[0].valid);
        assert!(results[1].valid);
        assert_eq!(results[1].value, RegisterValue::Int16(111));
        assert!(results[2].valid);
        assert_eq!(results[2].value, RegisterValue::Int16(112));
        assert!(session.is_connected());
        session.close().await;
    }
}
