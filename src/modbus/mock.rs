// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Mock transport
//!
//! An in-memory register map implementing [`RegisterTransport`], used to
//! exercise sessions and polling loops without a network. Clones share the
//! same state, so a test can keep a handle to script faults and inspect
//! traffic while the transport itself is owned by a session.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::debug;

use super::{RegisterTransport, TransportError};

#[derive(Debug, Default)]
struct MockState {
    registers: HashMap<u16, u16>,
    failing: HashSet<u16>,
    refuse_connect: bool,
    drop_connection: bool,
    drop_once: bool,
    connected: bool,
    connect_attempts: usize,
    read_calls: usize,
    writes: Vec<(u16, Vec<u16>)>,
}

/// Scripted in-memory transport.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builder form of [`MockTransport::set_word`].
    pub fn with_word(self, address: u16, word: u16) -> Self {
        self.set_word(address, word);
        self
    }

    pub fn set_word(&self, address: u16, word: u16) {
        self.state().registers.insert(address, word);
    }

    pub fn word(&self, address: u16) -> Option<u16> {
        self.state().registers.get(&address).copied()
    }

    /// Make every request touching `address` fail with an exception.
    pub fn fail_address(&self, address: u16) {
        self.state().failing.insert(address);
    }

    pub fn heal_address(&self, address: u16) {
        self.state().failing.remove(&address);
    }

    /// Make subsequent `connect()` calls fail (or succeed again).
    pub fn refuse_connect(&self, refuse: bool) {
        self.state().refuse_connect = refuse;
    }

    /// While set, every read or write drops the link.
    pub fn drop_connection(&self, drop: bool) {
        self.state().drop_connection = drop;
    }

    /// Drop the link on the next read or write only.
    pub fn drop_connection_once(&self) {
        self.state().drop_once = true;
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn connect_attempts(&self) -> usize {
        self.state().connect_attempts
    }

    /// Number of `read_words` calls that reached the connected device.
    pub fn read_calls(&self) -> usize {
        self.state().read_calls
    }

    /// Every successful `write_words` call, in order.
    pub fn writes(&self) -> Vec<(u16, Vec<u16>)> {
        self.state().writes.clone()
    }

    fn check_link(state: &mut MockState) -> Result<(), TransportError> {
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.drop_connection || std::mem::take(&mut state.drop_once) {
            state.connected = false;
            return Err(TransportError::Connection(
                "connection reset by peer".to_string(),
            ));
        }
        Ok(())
    }
}

fn addresses(address: u16, count: usize) -> impl Iterator<Item = u16> {
    (0..count).map(move |offset| address.wrapping_add(offset as u16))
}

#[async_trait]
impl RegisterTransport for MockTransport {
    async fn connect(&mut self) -> bool {
        let mut state = self.state();
        state.connect_attempts += 1;
        state.connected = !state.refuse_connect;
        state.connected
    }

    async fn close(&mut self) {
        self.state().connected = false;
    }

    async fn read_words(&mut self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        let mut state = self.state();
        Self::check_link(&mut state)?;
        state.read_calls += 1;

        let mut words = Vec::with_capacity(count as usize);
        for addr in addresses(address, count as usize) {
            if state.failing.contains(&addr) {
                debug!("Mock: scripted failure at address {}", addr);
                return Err(TransportError::Exception {
                    address: addr,
                    reason: "Illegal data address".to_string(),
                });
            }
            match state.registers.get(&addr) {
                Some(word) => words.push(*word),
                None => {
                    return Err(TransportError::Exception {
                        address: addr,
                        reason: "Illegal data address".to_string(),
                    })
                }
            }
        }
        Ok(words)
    }

    async fn write_words(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::check_link(&mut state)?;

        if let Some(addr) = addresses(address, values.len()).find(|a| state.failing.contains(a)) {
            return Err(TransportError::Exception {
                address: addr,
                reason: "Illegal data address".to_string(),
            });
        }
        for (addr, value) in addresses(address, values.len()).zip(values) {
            state.registers.insert(addr, *value);
        }
        state.writes.push((address, values.to_vec()));
        Ok(())
    }
}
