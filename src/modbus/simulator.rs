// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP simulator of a P30H meter
//!
//! Serves a register schema as holding registers so the logger can be
//! exercised end to end without hardware. All connections share the same
//! register map; writes from one client are visible to the others.
//!
//! Reading or writing an address that is not part of the map answers
//! `IllegalDataAddress`, which the logger records as an invalid register.
//!
//! ## Usage Example
//!
//! See `src/bin/p30h_simulator.rs` for a standalone simulator with slowly
//! varying measurements.

use std::{
    collections::HashMap,
    future,
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, error};
use tokio::net::{TcpListener, TcpStream};
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use crate::registers::{codec, RegisterDescriptor, RegisterKind, RegisterSchema, RegisterValue};

/// A simulated P30H exposing holding registers over Modbus TCP.
#[derive(Debug, Clone, Default)]
pub struct P30hSimulator {
    /// Holding registers, shared by every connection
    holding_registers: Arc<Mutex<HashMap<u16, u16>>>,
}

impl tokio_modbus::server::Service for P30hSimulator {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Process a Modbus request and provide a response
    ///
    /// Handles function codes 0x03 and 0x04 (both served from the holding
    /// map), 0x06 and 0x10. Any other function code answers IllegalFunction.
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("SIMULATOR: {:?}", req);
        let res = match req {
            Request::ReadHoldingRegisters(addr, cnt) => self
                .registers()
                .and_then(|regs| register_read(&regs, addr, cnt))
                .map(Response::ReadHoldingRegisters),
            Request::ReadInputRegisters(addr, cnt) => self
                .registers()
                .and_then(|regs| register_read(&regs, addr, cnt))
                .map(Response::ReadInputRegisters),
            Request::WriteMultipleRegisters(addr, values) => self
                .registers()
                .and_then(|mut regs| register_write(&mut regs, addr, &values))
                .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16)),
            Request::WriteSingleRegister(addr, value) => self
                .registers()
                .and_then(|mut regs| register_write(&mut regs, addr, std::slice::from_ref(&value)))
                .map(|_| Response::WriteSingleRegister(addr, value)),
            _ => {
                error!("SIMULATOR: Exception::IllegalFunction - Unimplemented function code in request: {req:?}");
                Err(ExceptionCode::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

impl P30hSimulator {
    /// An empty simulator: every address is unmapped.
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulator mapping every register of `schema` to a nominal value.
    pub fn with_schema(schema: &RegisterSchema) -> Self {
        let simulator = Self::new();
        for descriptor in schema {
            let value = match descriptor.kind {
                RegisterKind::Int16 => RegisterValue::Int16(0),
                RegisterKind::Float32 => RegisterValue::Float32(nominal_value(descriptor.unit)),
            };
            simulator.set_value(descriptor, value);
        }
        simulator
    }

    fn registers(&self) -> Result<MutexGuard<'_, HashMap<u16, u16>>, ExceptionCode> {
        self.holding_registers.lock().map_err(|_| {
            error!("SIMULATOR: register map poisoned");
            ExceptionCode::ServerDeviceFailure
        })
    }

    /// Store `value` at the word address(es) of `descriptor`, using the same
    /// word order a real device would.
    pub fn set_value(&self, descriptor: &RegisterDescriptor, value: RegisterValue) {
        let Ok(mut regs) = self.registers() else {
            return;
        };
        match value {
            RegisterValue::Int16(word) => {
                regs.insert(descriptor.primary_address, word);
            }
            RegisterValue::Float32(v) => {
                let (a, b) = codec::encode_float32(v, descriptor.low_word_first);
                let second = descriptor
                    .secondary_address
                    .unwrap_or(descriptor.primary_address.wrapping_add(1));
                regs.insert(descriptor.primary_address, a);
                regs.insert(second, b);
            }
        }
    }

    pub fn set_word(&self, address: u16, word: u16) {
        if let Ok(mut regs) = self.registers() {
            regs.insert(address, word);
        }
    }

    pub fn word(&self, address: u16) -> Option<u16> {
        self.registers().ok()?.get(&address).copied()
    }

    /// Unmap an address so requests touching it fail.
    pub fn remove_word(&self, address: u16) {
        if let Ok(mut regs) = self.registers() {
            regs.remove(&address);
        }
    }

    /// Serve Modbus TCP requests on `listener` until the task is dropped.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        let server = Server::new(listener);
        let new_service = move |_socket_addr: SocketAddr| Ok(Some(self.clone()));
        let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
            let new_service = new_service.clone();
            async move {
                debug!("SIMULATOR: client connected from {}", socket_addr);
                accept_tcp_connection(stream, socket_addr, new_service)
            }
        };
        let on_process_error = |err| {
            error!("SIMULATOR: {}", err);
        };
        server.serve(&on_connected, on_process_error).await
    }
}

/// Plausible reading for a quantity, keyed by unit.
fn nominal_value(unit: &str) -> f32 {
    match unit {
        "V" => 230.0,
        "A" => 5.0,
        "W" => 3450.0,
        "var" => 120.0,
        "Hz" => 50.0,
        "kWh" => 1024.5,
        "-" => 0.98,
        _ => 0.0,
    }
}

/// Helper function implementing reading registers from a HashMap.
fn register_read(
    registers: &HashMap<u16, u16>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    let mut response_values = vec![0; cnt.into()];
    for i in 0..cnt {
        let reg_addr = addr.wrapping_add(i);
        if let Some(r) = registers.get(&reg_addr) {
            response_values[i as usize] = *r;
        } else {
            debug!("SIMULATOR: Exception::IllegalDataAddress at {}", reg_addr);
            return Err(ExceptionCode::IllegalDataAddress);
        }
    }

    Ok(response_values)
}

/// Write holding registers. Used by both the write single register and
/// write multiple registers requests. Nothing is written unless every
/// target address is mapped.
fn register_write(
    registers: &mut HashMap<u16, u16>,
    addr: u16,
    values: &[u16],
) -> Result<(), ExceptionCode> {
    let targets: Vec<u16> = (0..values.len())
        .map(|i| addr.wrapping_add(i as u16))
        .collect();
    if let Some(missing) = targets.iter().find(|a| !registers.contains_key(a)) {
        debug!("SIMULATOR: Exception::IllegalDataAddress at {}", missing);
        return Err(ExceptionCode::IllegalDataAddress);
    }
    for (reg_addr, value) in targets.into_iter().zip(values) {
        registers.insert(reg_addr, *value);
    }

    Ok(())
}
