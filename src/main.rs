// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the P30H Modbus TCP logger
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{debug, error, info, warn};
use tokio::signal;

use rust_p30h_logger::config::Config;
use rust_p30h_logger::daemon::{PollSupervisor, ShutdownSignal, TcpCsvBackend};
use rust_p30h_logger::registers::{RegisterKind, RegisterSchema};

/// Multi-device Modbus TCP logger for P30H network meters
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML, or JSON with a .json extension)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device list as a bare JSON array, replacing the configured devices
    #[arg(long)]
    devices: Option<PathBuf>,

    /// Directory receiving the CSV files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Delay between two samples of one device, in seconds
    #[arg(long)]
    interval: Option<f64>,

    /// Samples to take per device before stopping (0 for unlimited)
    #[arg(long)]
    max_samples: Option<u64>,

    /// Timeout of every Modbus operation, in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Print the register map and exit
    #[arg(long)]
    show_register_map: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn print_register_map(schema: &RegisterSchema) {
    println!(
        "{:<28} {:<6} {:<5} {:<8} {:>7} {:>9} {:<10}",
        "Name", "Symbol", "Unit", "Kind", "Address", "Secondary", "Word order"
    );
    for register in schema {
        let secondary = register
            .secondary_address
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        let order = match register.kind {
            RegisterKind::Int16 => "-",
            _ if register.low_word_first => "low first",
            _ => "high first",
        };
        println!(
            "{:<28} {:<6} {:<5} {:<8} {:>7} {:>9} {:<10}",
            register.name,
            register.symbol,
            register.unit,
            format!("{:?}", register.kind),
            register.primary_address,
            secondary,
            order
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger with appropriate level based on verbose and quiet flags
    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let schema = RegisterSchema::p30h()?;

    if args.show_register_map {
        print_register_map(&schema);
        return Ok(());
    }

    // Validate configuration file if --validate-config is set
    if let Some(validate_path) = args.validate_config {
        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {:#}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = match (&args.devices, config_path.exists()) {
        (Some(_), false) => {
            debug!(
                "No configuration at {:?}, using defaults with the given device list",
                config_path
            );
            Config::default()
        }
        _ => Config::from_file(&config_path)?,
    };
    if let Some(devices_path) = &args.devices {
        config.apply_device_list(devices_path)?;
    }

    // Apply command line overrides
    config.apply_args(
        args.log_dir.clone(),
        args.interval,
        args.max_samples,
        args.timeout,
    );
    config.validate()?;

    let shutdown = ShutdownSignal::new();
    let stopper = shutdown.clone();
    tokio::spawn(async move {
        loop {
            match signal::ctrl_c().await {
                Ok(()) => {
                    if stopper.request() {
                        info!("Received shutdown signal, stopping polling loops");
                    } else {
                        debug!("Shutdown already in progress");
                    }
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                    break;
                }
            }
        }
    });

    info!(
        "Logging {} device(s) to {}",
        config.devices.len(),
        config.acquisition.output_dir.display()
    );
    let backend = TcpCsvBackend::new(
        config.acquisition.output_dir.clone(),
        config.acquisition.timeout(),
    );
    let supervisor = PollSupervisor::new(
        backend,
        Arc::new(schema),
        config.acquisition.poll_settings(),
        shutdown,
    );
    let reports = supervisor.run(&config.devices).await;

    let failed = reports.iter().filter(|r| r.outcome.is_failed()).count();
    if failed > 0 {
        warn!("{} of {} device(s) failed", failed, reports.len());
    } else {
        info!("All {} device(s) stopped normally", reports.len());
    }

    Ok(())
}
