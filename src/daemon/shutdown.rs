// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop request shared by the supervisor and every polling loop.
///
/// The flag only ever goes from "running" to "stopped". Loops observe it
/// between steps, so a stop takes effect within one poll interval.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` for the first request only.
    pub fn request(&self) -> bool {
        !self.requested.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
