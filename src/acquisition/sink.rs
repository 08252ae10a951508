// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sample sinks
//!
//! A sink receives one row per completed poll: a local timestamp followed by
//! one field per register of the schema. Invalid registers are written as an
//! empty field, never as zero or a placeholder token.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use chrono::{DateTime, Local};

use crate::daemon::ShutdownSignal;
use crate::registers::{RegisterSchema, SampleResult};

/// Timestamp layout of every row.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Title of the first column.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Destination of the samples of one device.
pub trait SampleSink: Send {
    /// Append one row. The sink writes its header first if needed.
    fn append(
        &mut self,
        timestamp: &DateTime<Local>,
        schema: &RegisterSchema,
        results: &[SampleResult],
    ) -> Result<()>;
}

/// Header row: `timestamp` then `"<symbol> (<unit>)"` per register.
pub fn header_row(schema: &RegisterSchema) -> Vec<String> {
    std::iter::once(TIMESTAMP_COLUMN.to_string())
        .chain(schema.column_headers())
        .collect()
}

/// Data row: formatted timestamp then each valid value, or an empty field.
pub fn data_row(timestamp: &DateTime<Local>, results: &[SampleResult]) -> Vec<String> {
    std::iter::once(timestamp.format(TIMESTAMP_FORMAT).to_string())
        .chain(results.iter().map(|r| {
            r.valid_value()
                .map(|value| value.to_string())
                .unwrap_or_default()
        }))
        .collect()
}

/// Sink keeping rows in memory, shared between clones.
///
/// Useful for dry runs and tests. Can be told to fail, or to request a
/// shutdown once it has received a given number of rows.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<Vec<String>>>>,
    header: Arc<Mutex<Option<Vec<String>>>>,
    fail: bool,
    stop_after: Option<(usize, ShutdownSignal)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every append fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Request `shutdown` once `rows` rows have been stored.
    pub fn stop_after(mut self, rows: usize, shutdown: ShutdownSignal) -> Self {
        self.stop_after = Some((rows, shutdown));
        self
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn header(&self) -> Option<Vec<String>> {
        self.header
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SampleSink for MemorySink {
    fn append(
        &mut self,
        timestamp: &DateTime<Local>,
        schema: &RegisterSchema,
        results: &[SampleResult],
    ) -> Result<()> {
        if self.fail {
            anyhow::bail!("memory sink configured to fail");
        }
        self.header
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| header_row(schema));
        let stored = {
            let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
            rows.push(data_row(timestamp, results));
            rows.len()
        };
        if let Some((limit, shutdown)) = &self.stop_after {
            if stored >= *limit {
                shutdown.request();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{RegisterDescriptor, RegisterValue};
    use chrono::TimeZone;

    #[test]
    fn test_rows_leave_invalid_fields_empty() {
        let schema = RegisterSchema::new(vec![
            RegisterDescriptor::int16("Status", "ST", "-", 10),
            RegisterDescriptor::float32("Voltage", "U", "V", 20, false),
        ])
        .unwrap();
        let timestamp = Local.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let results = vec![
            SampleResult {
                name: "Status",
                value: RegisterValue::Int16(0),
                valid: false,
            },
            SampleResult {
                name: "Voltage",
                value: RegisterValue::Float32(230.5),
                valid: true,
            },
        ];

        assert_eq!(header_row(&schema), vec!["timestamp", "ST (-)", "U (V)"]);
        assert_eq!(
            data_row(&timestamp, &results),
            vec!["2025-03-14 09:26:53", "", "230.5"]
        );
    }
}
