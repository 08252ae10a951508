// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated P30H meter for bench testing
//!
//! This tool:
//! 1. Starts a Modbus TCP server exposing the P30H register map
//! 2. Periodically updates the measurements so logged values change
//!
//! Usage:
//!   p30h_simulator --bind 127.0.0.1:5020
//!
//! Then in another terminal, run the client:
//!   p30h_client --port 5020

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio::time;

use rust_p30h_logger::modbus::P30hSimulator;
use rust_p30h_logger::registers::{RegisterSchema, RegisterValue};

/// Modbus TCP simulator of a P30H network meter
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to listen on
    #[clap(long, default_value = "127.0.0.1:502")]
    bind: SocketAddr,

    /// Delay between two measurement updates, in milliseconds
    #[clap(long, default_value = "1000")]
    update_ms: u64,
}

/// Measurement of `symbol` at simulation time `t`.
fn simulated_value(symbol: &str, t: f32) -> Option<f32> {
    let value = match symbol {
        "U1" => 230.0 + 2.0 * t.sin(),
        "U2" => 230.0 + 2.0 * (t + 2.1).sin(),
        "U3" => 230.0 + 2.0 * (t + 4.2).sin(),
        "I1" | "I2" | "I3" => 5.0 + 1.5 * (t * 0.3).sin(),
        "P" => 3450.0 + 1000.0 * (t * 0.3).sin(),
        "Q" => 120.0 + 40.0 * (t * 0.2).cos(),
        "PF" => 0.97 + 0.02 * (t * 0.1).sin(),
        "f" => 50.0 + 0.05 * (t * 0.7).sin(),
        "EP+" => 1024.5 + t * 0.01,
        "EP-" => 12.0 + t * 0.001,
        _ => return None,
    };
    Some(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let schema = RegisterSchema::p30h()?;
    let simulator = P30hSimulator::with_schema(&schema);

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("Starting P30H simulator at {}", args.bind);

    // Create a simulation task that updates the data
    let updater = simulator.clone();
    let update_interval = Duration::from_millis(args.update_ms.max(1));
    let simulation_handle = tokio::spawn(async move {
        let mut time_counter: f32 = 0.0;
        loop {
            for descriptor in &schema {
                if let Some(value) = simulated_value(descriptor.symbol, time_counter) {
                    updater.set_value(descriptor, RegisterValue::Float32(value));
                }
            }
            debug!("Measurements updated (t = {:.1})", time_counter);
            time::sleep(update_interval).await;
            time_counter += 0.1;
        }
    });

    let server_handle = tokio::spawn(async move {
        if let Err(e) = simulator.serve(listener).await {
            error!("Server error: {}", e);
        }
    });

    // Wait for Ctrl+C
    info!("Press Ctrl+C to stop the simulator");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down simulator..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    server_handle.abort();
    simulation_handle.abort();

    Ok(())
}
