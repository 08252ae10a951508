// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register data model
//!
//! This module maps the Modbus holding-register address space of a device to
//! typed physical quantities.
//!
//! ## Key Components
//!
//! - [`RegisterDescriptor`]: what to read, where, and how to decode it
//! - [`RegisterSchema`]: the ordered, immutable list of descriptors shared by
//!   every device session
//! - [`RegisterValue`] / [`SampleResult`]: the typed outcome of one read
//! - [`RegisterWrite`]: a typed value to apply to one register
//! - [`codec`]: word <-> value conversion
//!
//! ## Addressing
//!
//! An `Int16` register occupies one word at `primary_address`. A `Float32`
//! register always occupies two words: `primary_address` and
//! `primary_address + 1` when `secondary_address` is `None`, or
//! `primary_address` and `secondary_address` when the device splits the value
//! across non-adjacent registers.

pub mod codec;
pub mod p30h;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use p30h::P30H_REGISTERS;

/// Storage and decode rule of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterKind {
    /// One unsigned 16-bit word
    Int16,
    /// IEEE-754 binary32 split across two words
    Float32,
}

impl RegisterKind {
    /// Number of 16-bit words the register occupies.
    pub fn word_count(self) -> u16 {
        match self {
            RegisterKind::Int16 => 1,
            RegisterKind::Float32 => 2,
        }
    }
}

/// Description of one register of the device memory map.
///
/// `name`, `symbol` and `unit` are display metadata only.
/// For `Int16`, `secondary_address` and `low_word_first` are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub name: &'static str,
    pub symbol: &'static str,
    pub unit: &'static str,
    pub kind: RegisterKind,
    pub primary_address: u16,
    pub secondary_address: Option<u16>,
    pub low_word_first: bool,
}

impl RegisterDescriptor {
    /// A single-word integer register.
    pub const fn int16(
        name: &'static str,
        symbol: &'static str,
        unit: &'static str,
        address: u16,
    ) -> Self {
        Self {
            name,
            symbol,
            unit,
            kind: RegisterKind::Int16,
            primary_address: address,
            secondary_address: None,
            low_word_first: false,
        }
    }

    /// A float stored in two contiguous words starting at `address`.
    pub const fn float32(
        name: &'static str,
        symbol: &'static str,
        unit: &'static str,
        address: u16,
        low_word_first: bool,
    ) -> Self {
        Self {
            name,
            symbol,
            unit,
            kind: RegisterKind::Float32,
            primary_address: address,
            secondary_address: None,
            low_word_first,
        }
    }

    /// A float whose two words live at unrelated addresses.
    pub const fn split_float32(
        name: &'static str,
        symbol: &'static str,
        unit: &'static str,
        primary_address: u16,
        secondary_address: u16,
        low_word_first: bool,
    ) -> Self {
        Self {
            name,
            symbol,
            unit,
            kind: RegisterKind::Float32,
            primary_address,
            secondary_address: Some(secondary_address),
            low_word_first,
        }
    }

    /// CSV column title, `"<symbol> (<unit>)"`.
    pub fn column_header(&self) -> String {
        format!("{} ({})", self.symbol, self.unit)
    }

    /// Parse `text` as a value of this register's kind.
    pub fn parse_value(&self, text: &str) -> Result<RegisterValue, SchemaError> {
        let text = text.trim();
        let parsed = match self.kind {
            RegisterKind::Int16 => text.parse().ok().map(RegisterValue::Int16),
            RegisterKind::Float32 => text.parse().ok().map(RegisterValue::Float32),
        };
        parsed.ok_or_else(|| SchemaError::InvalidValue {
            name: self.name,
            text: text.to_string(),
        })
    }
}

/// A decoded register value. The tag always matches the kind of the
/// descriptor it was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    Int16(u16),
    Float32(f32),
}

impl RegisterValue {
    pub fn kind(&self) -> RegisterKind {
        match self {
            RegisterValue::Int16(_) => RegisterKind::Int16,
            RegisterValue::Float32(_) => RegisterKind::Float32,
        }
    }

    /// Placeholder carried by invalid results so the tag still matches.
    pub fn zero(kind: RegisterKind) -> Self {
        match kind {
            RegisterKind::Int16 => RegisterValue::Int16(0),
            RegisterKind::Float32 => RegisterValue::Float32(0.0),
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::Int16(value) => write!(f, "{}", value),
            RegisterValue::Float32(value) => write!(f, "{}", value),
        }
    }
}

/// Outcome of reading one register during one sample.
///
/// `valid == false` means this register could not be read; `value` then only
/// carries the kind and must not be interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub name: &'static str,
    pub value: RegisterValue,
    pub valid: bool,
}

impl SampleResult {
    pub fn invalid(descriptor: &RegisterDescriptor) -> Self {
        Self {
            name: descriptor.name,
            value: RegisterValue::zero(descriptor.kind),
            valid: false,
        }
    }

    /// The value if the read succeeded.
    pub fn valid_value(&self) -> Option<RegisterValue> {
        self.valid.then_some(self.value)
    }
}

/// A value to apply to the register described by `descriptor`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterWrite {
    pub descriptor: RegisterDescriptor,
    pub value: RegisterValue,
}

impl RegisterWrite {
    pub fn new(descriptor: RegisterDescriptor, value: RegisterValue) -> Self {
        Self { descriptor, value }
    }
}

/// Errors raised while building a [`RegisterSchema`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("register schema is empty")]
    Empty,

    #[error("register '{name}' at {address} needs two contiguous words but the address space ends at 65535")]
    AddressOverflow { name: &'static str, address: u16 },

    #[error("'{text}' is not a valid value for register '{name}'")]
    InvalidValue { name: &'static str, text: String },
}

/// Ordered, immutable list of registers polled on every device.
///
/// Built once at startup and shared read-only (behind an `Arc`) by all
/// polling loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSchema {
    registers: Vec<RegisterDescriptor>,
}

impl RegisterSchema {
    /// Build a schema, rejecting descriptors that cannot be addressed.
    pub fn new(registers: Vec<RegisterDescriptor>) -> Result<Self, SchemaError> {
        if registers.is_empty() {
            return Err(SchemaError::Empty);
        }
        for register in &registers {
            if register.kind == RegisterKind::Float32
                && register.secondary_address.is_none()
                && register.primary_address == u16::MAX
            {
                return Err(SchemaError::AddressOverflow {
                    name: register.name,
                    address: register.primary_address,
                });
            }
        }
        Ok(Self { registers })
    }

    /// The compiled-in P30H register map.
    pub fn p30h() -> Result<Self, SchemaError> {
        Self::new(P30H_REGISTERS.to_vec())
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisterDescriptor> {
        self.registers.iter()
    }

    /// Look a register up by symbol (case-insensitive) or by name.
    pub fn find(&self, key: &str) -> Option<&RegisterDescriptor> {
        self.registers
            .iter()
            .find(|r| r.symbol.eq_ignore_ascii_case(key) || r.name == key)
    }

    /// One `"<symbol> (<unit>)"` title per register, in schema order.
    pub fn column_headers(&self) -> Vec<String> {
        self.registers.iter().map(|r| r.column_header()).collect()
    }
}

impl<'a> IntoIterator for &'a RegisterSchema {
    type Item = &'a RegisterDescriptor;
    type IntoIter = std::slice::Iter<'a, RegisterDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.registers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_follows_kind() {
        let status = RegisterDescriptor::int16("Status", "ST", "-", 10);
        let voltage = RegisterDescriptor::float32("Voltage", "U", "V", 20, false);
        assert_eq!(status.parse_value(" 12 "), Ok(RegisterValue::Int16(12)));
        assert_eq!(voltage.parse_value("230.5"), Ok(RegisterValue::Float32(230.5)));
        assert!(status.parse_value("1.5").is_err());
        assert!(status.parse_value("70000").is_err());
        assert!(voltage.parse_value("abc").is_err());
    }

    #[test]
    fn test_empty_schema_is_rejected() {
        assert_eq!(RegisterSchema::new(Vec::new()), Err(SchemaError::Empty));
    }

    #[test]
    fn test_contiguous_float_at_last_address_is_rejected() {
        let result = RegisterSchema::new(vec![RegisterDescriptor::float32(
            "Edge", "E", "-", 0xFFFF, false,
        )]);
        assert!(matches!(
            result,
            Err(SchemaError::AddressOverflow { address: 0xFFFF, .. })
        ));

        // Split floats and integers may use the last address
        let schema = RegisterSchema::new(vec![
            RegisterDescriptor::split_float32("Split", "S", "-", 0xFFFF, 0, false),
            RegisterDescriptor::int16("Last", "L", "-", 0xFFFF),
        ])
        .unwrap();
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_column_headers() {
        let schema = RegisterSchema::new(vec![
            RegisterDescriptor::int16("Status", "ST", "-", 10),
            RegisterDescriptor::float32("Voltage L1", "U1", "V", 20, false),
        ])
        .unwrap();
        assert_eq!(schema.column_headers(), vec!["ST (-)", "U1 (V)"]);
    }

    #[test]
    fn test_p30h_schema_builds() {
        let schema = RegisterSchema::p30h().unwrap();
        assert_eq!(schema.len(), P30H_REGISTERS.len());
        assert!(schema.find("u1").is_some());
        assert!(schema
            .iter()
            .any(|r| r.kind == RegisterKind::Float32 && r.secondary_address.is_some()));
    }

    #[test]
    fn test_value_tag_and_display() {
        assert_eq!(RegisterValue::Int16(7).kind(), RegisterKind::Int16);
        assert_eq!(RegisterValue::Float32(1.5).kind(), RegisterKind::Float32);
        assert_eq!(RegisterValue::Int16(7).to_string(), "7");
        assert_eq!(RegisterValue::Float32(3.14).to_string(), "3.14");
        assert_eq!(
            RegisterValue::zero(RegisterKind::Float32),
            RegisterValue::Float32(0.0)
        );
    }

    #[test]
    fn test_invalid_result_has_no_value() {
        let descriptor = RegisterDescriptor::int16("Status", "ST", "-", 10);
        let result = SampleResult::invalid(&descriptor);
        assert!(!result.valid);
        assert_eq!(result.valid_value(), None);
        assert_eq!(result.value.kind(), RegisterKind::Int16);
    }
}
