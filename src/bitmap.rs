//! MSB-first bit addressing for null bitmaps.
//!
//! Bit `0` of a byte is its most significant bit (`0x80`); bit `i` of a byte
//! sequence is bit `i % 8` of byte `i / 8`. Rows and schemas on the wire use
//! this layout for their null / nullable bitmaps.

use thiserror::Error;

/// A single bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bit {
    Zero,
    One,
}

impl Bit {
    pub fn is_set(self) -> bool {
        self == Bit::One
    }
}

impl From<bool> for Bit {
    fn from(b: bool) -> Self {
        if b { Bit::One } else { Bit::Zero }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitmapError {
    #[error("bit index {index} out of range (0..{bits})")]
    OutOfRange { index: usize, bits: usize },
}

#[inline]
fn mask(i: usize) -> u8 {
    0x80 >> i
}

#[inline]
fn check(index: usize, bits: usize) -> Result<(), BitmapError> {
    if index >= bits {
        return Err(BitmapError::OutOfRange { index, bits });
    }
    Ok(())
}

/// Read bit `i` of `byte`.
pub fn get_bit(byte: u8, i: usize) -> Result<Bit, BitmapError> {
    check(i, 8)?;
    Ok(Bit::from(byte & mask(i) != 0))
}

/// Return `byte` with bit `i` set to `bit`; all other bits are unchanged.
pub fn set_bit(byte: u8, i: usize, bit: Bit) -> Result<u8, BitmapError> {
    check(i, 8)?;
    Ok(match bit {
        Bit::One => byte | mask(i),
        Bit::Zero => byte & !mask(i),
    })
}

/// Read bit `i` of a byte sequence.
pub fn get_bit_in(bytes: &[u8], i: usize) -> Result<Bit, BitmapError> {
    check(i, bytes.len() * 8)?;
    get_bit(bytes[i / 8], i % 8)
}

/// Set bit `i` of a byte sequence in place.
pub fn set_bit_in(bytes: &mut [u8], i: usize, bit: Bit) -> Result<(), BitmapError> {
    check(i, bytes.len() * 8)?;
    bytes[i / 8] = set_bit(bytes[i / 8], i % 8, bit)?;
    Ok(())
}

/// Build a bitmap of `len` bits from a predicate, padded to whole bytes.
pub fn from_fn(len: usize, mut f: impl FnMut(usize) -> bool) -> Vec<u8> {
    let mut out = vec![0u8; len.div_ceil(8)];
    for i in 0..len {
        if f(i) {
            out[i / 8] |= mask(i % 8);
        }
    }
    out
}
