//! Minecraft protocol VarInt: 7 data bits per byte, least significant group
//! first, high bit set on every byte except the last.

use thiserror::Error;

/// A 32-bit value never needs more than five groups.
pub const MAX_VARINT_LEN: usize = 5;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VarIntError {
    /// The buffer ended before the terminating byte; read more and retry.
    #[error("VarInt is incomplete")]
    Incomplete,
    /// Longer than five bytes, or the fifth byte overflows 32 bits.
    #[error("VarInt is too long")]
    Malformed,
}

/// Encode `value`, always emitting at least one byte.
pub fn encode(value: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_VARINT_LEN);
    write(&mut out, value);
    out
}

/// Append the encoding of `value` to `out`.
pub fn write(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value as u8) & SEGMENT_BITS;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | CONTINUE_BIT);
    }
}

/// Decode a VarInt starting at `offset`, returning the value and how many
/// bytes it occupied.
pub fn decode(buf: &[u8], offset: usize) -> Result<(u32, usize), VarIntError> {
    let mut value: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        let Some(&byte) = buf.get(offset + i) else {
            return Err(VarIntError::Incomplete);
        };
        if i == MAX_VARINT_LEN - 1 && byte & 0xF0 != 0 {
            // continuation bit still set, or bits beyond the 32nd
            return Err(VarIntError::Malformed);
        }
        value |= u32::from(byte & SEGMENT_BITS) << (7 * i);
        if byte & CONTINUE_BIT == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(VarIntError::Malformed)
}
