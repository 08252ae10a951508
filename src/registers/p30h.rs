// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! P30H register map
//!
//! Holding registers polled on every P30H network meter.
//!
//! | Address | Quantity | Type |
//! |---------|----------|------|
//! | 4000 | Status word | u16 |
//! | 4001 | Alarm flags | u16 |
//! | 7500-7505 | Phase voltages L1..L3 | f32, high word first |
//! | 7506-7511 | Phase currents L1..L3 | f32, high word first |
//! | 7530 | Total active power | f32, high word first |
//! | 7536 | Total reactive power | f32, high word first |
//! | 7542 | Power factor | f32, high word first |
//! | 7548 | Frequency | f32, high word first |
//! | 7600 / 7700 | Imported active energy | f32, low word first, split |
//! | 7601 / 7701 | Exported active energy | f32, low word first, split |

use super::RegisterDescriptor;

pub const P30H_REGISTERS: &[RegisterDescriptor] = &[
    RegisterDescriptor::int16("Status", "ST", "-", 4000),
    RegisterDescriptor::int16("Alarms", "AL", "-", 4001),
    RegisterDescriptor::float32("Voltage L1-N", "U1", "V", 7500, false),
    RegisterDescriptor::float32("Voltage L2-N", "U2", "V", 7502, false),
    RegisterDescriptor::float32("Voltage L3-N", "U3", "V", 7504, false),
    RegisterDescriptor::float32("Current L1", "I1", "A", 7506, false),
    RegisterDescriptor::float32("Current L2", "I2", "A", 7508, false),
    RegisterDescriptor::float32("Current L3", "I3", "A", 7510, false),
    RegisterDescriptor::float32("Active power", "P", "W", 7530, false),
    RegisterDescriptor::float32("Reactive power", "Q", "var", 7536, false),
    RegisterDescriptor::float32("Power factor", "PF", "-", 7542, false),
    RegisterDescriptor::float32("Frequency", "f", "Hz", 7548, false),
    // Energy counters keep their low half in the 7600 bank and the high
    // half in the 7700 bank.
    RegisterDescriptor::split_float32("Active energy imported", "EP+", "kWh", 7600, 7700, true),
    RegisterDescriptor::split_float32("Active energy exported", "EP-", "kWh", 7601, 7701, true),
];
