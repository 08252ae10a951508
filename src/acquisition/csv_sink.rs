// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! CSV sample files
//!
//! One file per device and run, named
//! `P30H(<ip>-<port>-<id>)_data_<YYYY-mm-dd_HH-MM-SS>.csv` inside the output
//! directory. The file is created on the first row, so a device that never
//! connects leaves no empty file behind.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::info;

use super::sink::{data_row, header_row, SampleSink};
use crate::config::DeviceConfig;
use crate::registers::{RegisterSchema, SampleResult};

/// CSV writer for the samples of one device.
pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    header_written: bool,
}

impl CsvSink {
    /// Prepare a sink for `device`. No file is touched until [`CsvSink::open`].
    pub fn new<P: AsRef<Path>>(output_dir: P, device: &DeviceConfig) -> Self {
        let file_name = format!(
            "P30H({}-{}-{})_data_{}.csv",
            device.ip,
            device.port,
            device.id,
            Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        Self {
            path: output_dir.as_ref().join(file_name),
            writer: None,
            header_written: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the output directory and the file.
    pub fn open(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {:?}", parent))?;
        }
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create CSV file {:?}", self.path))?;
        info!("Writing samples to {}", self.path.display());
        self.writer = Some(csv::Writer::from_writer(file));
        Ok(())
    }

    /// Write the header row. Only the first call has an effect.
    pub fn append_header(&mut self, columns: &[String]) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.write_record(columns)?;
        self.header_written = true;
        Ok(())
    }

    /// Write one data row and flush it to disk.
    pub fn append_row(&mut self, timestamp: &DateTime<Local>, results: &[SampleResult]) -> Result<()> {
        self.write_record(&data_row(timestamp, results))
    }

    fn write_record(&mut self, record: &[String]) -> Result<()> {
        self.open()?;
        let path = &self.path;
        let writer = self
            .writer
            .as_mut()
            .with_context(|| format!("CSV file {:?} is not open", path))?;
        writer
            .write_record(record)
            .with_context(|| format!("Failed to write to {:?}", path))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush {:?}", path))?;
        Ok(())
    }
}

impl SampleSink for CsvSink {
    fn append(
        &mut self,
        timestamp: &DateTime<Local>,
        schema: &RegisterSchema,
        results: &[SampleResult],
    ) -> Result<()> {
        if !self.header_written {
            self.append_header(&header_row(schema))?;
        }
        self.append_row(timestamp, results)
    }
}
