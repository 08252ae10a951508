// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! One-shot Modbus client for a P30H meter
//!
//! Reads the whole register map once and prints it, or writes one register:
//!
//! ```bash
//! p30h_client --address 192.168.1.10
//! p30h_client --address 127.0.0.1 --port 5020 --write ST --value 1
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use rust_p30h_logger::acquisition::DeviceSession;
use rust_p30h_logger::config::DeviceConfig;
use rust_p30h_logger::modbus::TcpTransport;
use rust_p30h_logger::registers::{RegisterSchema, RegisterWrite};

/// Modbus client reading or writing the registers of a P30H meter
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Modbus unit identifier
    #[clap(long, default_value = "1")]
    id: u8,

    /// Timeout of every request, in seconds
    #[clap(long, default_value = "3")]
    timeout: f64,

    /// Symbol or name of the register to write
    #[clap(long, requires = "value")]
    write: Option<String>,

    /// Value to write, parsed according to the register kind
    #[clap(long, requires = "write")]
    value: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    // Parse command line arguments
    let args = Args::parse();
    let timeout = Duration::try_from_secs_f64(args.timeout)
        .with_context(|| format!("Invalid timeout: {}", args.timeout))?;

    let schema = RegisterSchema::p30h()?;
    let device = DeviceConfig::new(args.address.clone(), args.port, args.id);
    let transport = TcpTransport::new(device.ip.clone(), device.port, device.id, timeout);
    let mut session = DeviceSession::new(device.clone(), transport);

    println!("Connecting to Modbus server at {}", device);
    if !session.connect().await {
        anyhow::bail!("Unable to connect to {}", device);
    }

    if let (Some(key), Some(text)) = (&args.write, &args.value) {
        let descriptor = schema
            .find(key)
            .copied()
            .with_context(|| format!("Unknown register '{}'", key))?;
        let value = descriptor.parse_value(text)?;
        let result = session
            .write(&[RegisterWrite::new(descriptor, value)])
            .await;
        session.close().await;
        result?;
        println!("Wrote {} to {} ({})", value, descriptor.name, descriptor.symbol);
        return Ok(());
    }

    let read = session.read(&schema).await;
    let results = match read {
        Ok(results) => results.to_vec(),
        Err(e) => {
            session.close().await;
            return Err(e.into());
        }
    };
    session.close().await;

    // Display formatted results based on the register map
    for (descriptor, result) in schema.iter().zip(&results) {
        let value = result
            .valid_value()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<unreadable>".to_string());
        println!(
            "{:>5}  {:<28} {:>14} {}",
            descriptor.primary_address, descriptor.name, value, descriptor.unit
        );
    }

    Ok(())
}
