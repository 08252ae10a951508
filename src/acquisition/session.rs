// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device session
//!
//! A [`DeviceSession`] owns the transport of one device and turns raw word
//! access into typed register reads and writes.
//!
//! Reads are failure-tolerant per register: a register that cannot be read is
//! reported with `valid == false` and the next register is still read. Only a
//! connection-level fault aborts a read, after which the session must be
//! reconnected before further use.
//!
//! Writes are all-or-error: the first failure aborts the batch and is
//! returned, since silently continuing a half-applied write to a controller
//! is unsafe.

use log::{debug, warn};
use thiserror::Error;

use crate::config::DeviceConfig;
use crate::modbus::{RegisterTransport, TransportError};
use crate::registers::{
    codec, RegisterDescriptor, RegisterKind, RegisterSchema, RegisterValue, RegisterWrite,
    SampleResult,
};

/// Errors surfaced by a [`DeviceSession`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("session for {device} is not connected")]
    NotConnected { device: String },

    #[error("connection to {device} lost: {source}")]
    ConnectionLost {
        device: String,
        #[source]
        source: TransportError,
    },

    #[error("writing '{register}' on {device} failed: {source}")]
    WriteFailed {
        device: String,
        register: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("value {value:?} does not match kind {expected:?} of register '{register}'")]
    KindMismatch {
        register: &'static str,
        expected: RegisterKind,
        value: RegisterValue,
    },
}

/// One connection to one device plus its reusable result buffer.
pub struct DeviceSession<T> {
    device: DeviceConfig,
    transport: T,
    connected: bool,
    results: Vec<SampleResult>,
}

impl<T: RegisterTransport> DeviceSession<T> {
    pub fn new(device: DeviceConfig, transport: T) -> Self {
        Self {
            device,
            transport,
            connected: false,
            results: Vec::new(),
        }
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Open the transport. Returns `false` on failure, without retrying.
    pub async fn connect(&mut self) -> bool {
        self.connected = self.transport.connect().await;
        if self.connected {
            debug!("Connected to {}", self.device);
        }
        self.connected
    }

    /// Release the transport. Idempotent.
    pub async fn close(&mut self) {
        if self.connected {
            debug!("Closing connection to {}", self.device);
        }
        self.transport.close().await;
        self.connected = false;
    }

    /// Read every register of `schema` in order.
    ///
    /// The returned slice borrows the session's internal buffer and is only
    /// valid until the next call on this session.
    pub async fn read(&mut self, schema: &RegisterSchema) -> Result<&[SampleResult], SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected {
                device: self.device.label(),
            });
        }
        if self.results.len() != schema.len() {
            self.results = schema.iter().map(SampleResult::invalid).collect();
        }

        for (index, descriptor) in schema.iter().enumerate() {
            let outcome = self.read_value(descriptor).await;
            let slot = &mut self.results[index];
            slot.name = descriptor.name;
            match outcome {
                Ok(value) => {
                    slot.value = value;
                    slot.valid = true;
                }
                Err(e) if e.is_connection_fault() => {
                    slot.value = RegisterValue::zero(descriptor.kind);
                    slot.valid = false;
                    return Err(self.connection_lost(e).await);
                }
                Err(e) => {
                    warn!(
                        "{}: failed to read '{}' at {}: {}",
                        self.device, descriptor.name, descriptor.primary_address, e
                    );
                    slot.value = RegisterValue::zero(descriptor.kind);
                    slot.valid = false;
                }
            }
        }

        Ok(&self.results)
    }

    /// Apply every write in order, stopping at the first failure.
    pub async fn write(&mut self, writes: &[RegisterWrite]) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected {
                device: self.device.label(),
            });
        }

        for write in writes {
            let descriptor = &write.descriptor;
            if write.value.kind() != descriptor.kind {
                return Err(SessionError::KindMismatch {
                    register: descriptor.name,
                    expected: descriptor.kind,
                    value: write.value,
                });
            }
            if let Err(e) = self.write_value(descriptor, write.value).await {
                if e.is_connection_fault() {
                    self.connection_lost(e.clone()).await;
                }
                return Err(SessionError::WriteFailed {
                    device: self.device.label(),
                    register: descriptor.name,
                    source: e,
                });
            }
            debug!(
                "{}: wrote {} to '{}'",
                self.device, write.value, descriptor.name
            );
        }
        Ok(())
    }

    async fn connection_lost(&mut self, source: TransportError) -> SessionError {
        self.close().await;
        SessionError::ConnectionLost {
            device: self.device.label(),
            source,
        }
    }

    async fn read_value(
        &mut self,
        descriptor: &RegisterDescriptor,
    ) -> Result<RegisterValue, TransportError> {
        let address = descriptor.primary_address;
        match descriptor.kind {
            RegisterKind::Int16 => {
                let words = self.transport.read_words(address, 1).await?;
                Ok(RegisterValue::Int16(first_word(&words, address, 1)?))
            }
            RegisterKind::Float32 => {
                let (word_a, word_b) = match descriptor.secondary_address {
                    None => {
                        let count = descriptor.kind.word_count();
                        let words = self.transport.read_words(address, count).await?;
                        match words.as_slice() {
                            [a, b, ..] => (*a, *b),
                            _ => {
                                return Err(TransportError::ShortResponse {
                                    address,
                                    expected: count,
                                    actual: words.len(),
                                })
                            }
                        }
                    }
                    Some(secondary) => {
                        let first = self.transport.read_words(address, 1).await?;
                        let second = self.transport.read_words(secondary, 1).await?;
                        (
                            first_word(&first, address, 1)?,
                            first_word(&second, secondary, 1)?,
                        )
                    }
                };
                Ok(RegisterValue::Float32(codec::decode_float32(
                    word_a,
                    word_b,
                    descriptor.low_word_first,
                )))
            }
        }
    }

    async fn write_value(
        &mut self,
        descriptor: &RegisterDescriptor,
        value: RegisterValue,
    ) -> Result<(), TransportError> {
        let address = descriptor.primary_address;
        match value {
            RegisterValue::Int16(word) => self.transport.write_words(address, &[word]).await,
            RegisterValue::Float32(v) => {
                let (word_a, word_b) = codec::encode_float32(v, descriptor.low_word_first);
                match descriptor.secondary_address {
                    None => self.transport.write_words(address, &[word_a, word_b]).await,
                    Some(secondary) => {
                        self.transport.write_words(address, &[word_a]).await?;
                        self.transport.write_words(secondary, &[word_b]).await
                    }
                }
            }
        }
    }
}

fn first_word(words: &[u16], address: u16, expected: u16) -> Result<u16, TransportError> {
    words
        .first()
        .copied()
        .ok_or(TransportError::ShortResponse {
            address,
            expected,
            actual: words.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::MockTransport;
    use approx::assert_relative_eq;

    fn device() -> DeviceConfig {
        DeviceConfig::new("10.0.0.5", 502, 1)
    }

    fn schema() -> RegisterSchema {
        RegisterSchema::new(vec![
            RegisterDescriptor::int16("Status", "ST", "-", 10),
            RegisterDescriptor::float32("Voltage", "U", "V", 20, false),
        ])
        .unwrap()
    }

    fn transport() -> MockTransport {
        MockTransport::new()
            .with_word(10, 7)
            .with_word(20, 0x4048)
            .with_word(21, 0xF5C3)
    }

    async fn connected(transport: MockTransport) -> DeviceSession<MockTransport> {
        let mut session = DeviceSession::new(device(), transport);
        assert!(session.connect().await);
        session
    }

    #[tokio::test]
    async fn test_read_decodes_schema_in_order() {
        let mut session = connected(transport()).await;
        let results = session.read(&schema()).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "Status");
        assert!(results[0].valid);
        assert_eq!(results[0].value, RegisterValue::Int16(7));
        assert!(results[1].valid);
        match results[1].value {
            RegisterValue::Float32(v) => assert_relative_eq!(v, 3.14, epsilon = 1e-6),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_register_does_not_spoil_the_row() {
        let transport = transport();
        transport.fail_address(10);
        let mut session = connected(transport).await;
        let results = session.read(&schema()).await.unwrap();

        assert!(!results[0].valid);
        assert!(results[1].valid);
        assert_eq!(results[1].value, RegisterValue::Float32(3.14));
    }

    #[tokio::test]
    async fn test_split_float_uses_two_single_reads() {
        let schema = RegisterSchema::new(vec![RegisterDescriptor::split_float32(
            "Energy", "E", "kWh", 30, 40, true,
        )])
        .unwrap();
        let transport = MockTransport::new().with_word(30, 0xF5C3).with_word(40, 0x4048);
        let handle = transport.clone();
        let mut session = connected(transport).await;

        let results = session.read(&schema).await.unwrap();
        assert_eq!(results[0].value, RegisterValue::Float32(3.14));
        assert_eq!(handle.read_calls(), 2);
    }

    #[tokio::test]
    async fn test_connection_loss_aborts_read() {
        let transport = transport();
        let handle = transport.clone();
        let mut session = connected(transport).await;
        handle.drop_connection(true);

        let err = session.read(&schema()).await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectionLost { .. }));
        assert!(!session.is_connected());

        // Unusable until reconnected
        handle.drop_connection(false);
        assert!(matches!(
            session.read(&schema()).await,
            Err(SessionError::NotConnected { .. })
        ));
        assert!(session.connect().await);
        assert!(session.read(&schema()).await.is_ok());
    }

    #[tokio::test]
    async fn test_buffer_follows_schema_size() {
        let mut session = connected(transport()).await;
        assert_eq!(session.read(&schema()).await.unwrap().len(), 2);

        let smaller =
            RegisterSchema::new(vec![RegisterDescriptor::int16("Status", "ST", "-", 10)]).unwrap();
        let results = session.read(&smaller).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, RegisterValue::Int16(7));
    }

    #[tokio::test]
    async fn test_write_int_and_floats() {
        let transport = MockTransport::new()
            .with_word(10, 0)
            .with_word(20, 0)
            .with_word(21, 0)
            .with_word(30, 0)
            .with_word(40, 0);
        let handle = transport.clone();
        let mut session = connected(transport).await;

        let writes = vec![
            RegisterWrite::new(
                RegisterDescriptor::int16("Status", "ST", "-", 10),
                RegisterValue::Int16(5),
            ),
            RegisterWrite::new(
                RegisterDescriptor::float32("Voltage", "U", "V", 20, false),
                RegisterValue::Float32(3.14),
            ),
            RegisterWrite::new(
                RegisterDescriptor::split_float32("Energy", "E", "kWh", 30, 40, true),
                RegisterValue::Float32(3.14),
            ),
        ];
        session.write(&writes).await.unwrap();

        assert_eq!(
            handle.writes(),
            vec![
                (10, vec![5]),
                (20, vec![0x4048, 0xF5C3]),
                (30, vec![0xF5C3]),
                (40, vec![0x4048]),
            ]
        );
    }

    #[tokio::test]
    async fn test_write_error_aborts_batch() {
        let transport = MockTransport::new().with_word(10, 0).with_word(11, 0);
        let handle = transport.clone();
        transport.fail_address(10);
        let mut session = connected(transport).await;

        let writes = vec![
            RegisterWrite::new(
                RegisterDescriptor::int16("A", "A", "-", 10),
                RegisterValue::Int16(1),
            ),
            RegisterWrite::new(
                RegisterDescriptor::int16("B", "B", "-", 11),
                RegisterValue::Int16(2),
            ),
        ];
        let err = session.write(&writes).await.unwrap_err();
        assert!(matches!(err, SessionError::WriteFailed { register: "A", .. }));
        assert_eq!(handle.word(11), Some(0));
        assert!(handle.writes().is_empty());
        // A rejected write does not drop the link
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_write_kind_mismatch_is_rejected() {
        let mut session = connected(MockTransport::new().with_word(10, 0)).await;
        let writes = vec![RegisterWrite::new(
            RegisterDescriptor::int16("Status", "ST", "-", 10),
            RegisterValue::Float32(1.0),
        )];
        assert!(matches!(
            session.write(&writes).await,
            Err(SessionError::KindMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut session = connected(transport()).await;
        session.close().await;
        session.close().await;
        assert!(!session.is_connected());
    }
}
