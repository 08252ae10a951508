// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-p30h-logger project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register codec
//!
//! Pure conversion between 16-bit Modbus register words and the typed values
//! they carry. A 32-bit float occupies two words; which of the two holds the
//! high half of the IEEE-754 pattern is selected by the `low_first` flag of
//! the register descriptor.
//!
//! The conversion is a bit reinterpretation, never a numeric cast: NaN
//! payloads, infinities and signed zeros survive a round trip unchanged.

/// Assemble two register words into a binary32 value.
///
/// `word_a` is the word read from the primary address, `word_b` the one read
/// from the second address (contiguous `+1` or the explicit secondary address).
///
/// With `low_first == false` the byte sequence is
/// `[hi(a), lo(a), hi(b), lo(b)]`, with `low_first == true` it is
/// `[hi(b), lo(b), hi(a), lo(a)]`, interpreted big-endian.
///
/// # Examples
///
/// ```
/// use rust_p30h_logger::registers::codec::decode_float32;
///
/// let value = decode_float32(0x4048, 0xF5C3, false);
/// assert_eq!(value, 3.14_f32);
/// ```
pub fn decode_float32(word_a: u16, word_b: u16, low_first: bool) -> f32 {
    let (high, low) = if low_first {
        (word_b, word_a)
    } else {
        (word_a, word_b)
    };
    let [b0, b1] = high.to_be_bytes();
    let [b2, b3] = low.to_be_bytes();
    f32::from_be_bytes([b0, b1, b2, b3])
}

/// Split a binary32 value into the two words to store at the primary and
/// second address, in that order. Exact inverse of [`decode_float32`].
pub fn encode_float32(value: f32, low_first: bool) -> (u16, u16) {
    let bits = value.to_bits();
    let high = (bits >> 16) as u16;
    let low = (bits & 0xFFFF) as u16;
    if low_first {
        (low, high)
    } else {
        (high, low)
    }
}
