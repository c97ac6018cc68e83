//! # BitReader - Cursor-Based Bit-Level Reader
//!
//! Reads integers of 1..=64 bits, floats, byte runs and NUL-terminated strings from a
//! fixed byte buffer at arbitrary bit positions.
//!
//! ## Bit Order
//!
//! Bit order within a byte follows the byte order of the field being read:
//! - **Big endian**: bits are consumed MSB-first (bit 7 of the first byte is the field's
//!   most significant bit)
//! - **Little endian**: bits are consumed LSB-first (bit 0 of the first byte is the field's
//!   least significant bit)
//!
//! For byte-aligned whole-byte fields both conventions reduce to plain big/little endian
//! loads, which take a fast path.
//!
//! ## Bounds
//!
//! The reader never touches a byte outside its buffer. An optional limit (e.g. a packet's
//! content size) further restricts how far the cursor may advance; requests beyond it fail
//! with [`DecodeError::Bounds`] before any byte is read.
//!
//! Arrays and sequences whose elements may occupy no bits are not bounded by the input, so
//! the reader also carries an element budget that such elements draw from; running out
//! fails with [`DecodeError::ElementLimit`].

use crate::error::{DecodeError, DecodeResult};
use ctf_types::ByteOrder;

/// Default number of zero-size array/sequence elements one decode may produce
pub const DEFAULT_MAX_SEQUENCE_LENGTH: u64 = 1 << 20;

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Cursor in bits from the start of `data`
    pos: u64,
    /// Readable extent in bits, `<= data.len() * 8`
    limit: u64,
    /// Zero-size elements that may still be decoded
    element_budget: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            limit: data.len() as u64 * 8,
            element_budget: DEFAULT_MAX_SEQUENCE_LENGTH,
        }
    }

    /// Reader over `data` that may not advance past `limit` bits
    pub fn with_limit(data: &'a [u8], limit: u64) -> Self {
        let mut reader = Self::new(data);
        reader.limit = limit.min(reader.limit);
        reader
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining_bits(&self) -> u64 {
        self.limit - self.pos
    }

    pub fn set_position(&mut self, pos: u64) -> DecodeResult<()> {
        if pos > self.limit {
            return Err(DecodeError::bounds(
                pos.saturating_sub(self.pos),
                self.pos,
                self.remaining_bits(),
            ));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn element_budget(&self) -> u64 {
        self.element_budget
    }

    /// Reset the number of zero-size array/sequence elements still allowed
    pub fn set_element_budget(&mut self, budget: u64) {
        self.element_budget = budget;
    }

    /// Draw `count` zero-size elements from the budget
    pub fn take_elements(&mut self, count: u64) -> DecodeResult<()> {
        if count > self.element_budget {
            return Err(DecodeError::element_limit(count, self.element_budget, self.pos));
        }
        self.element_budget -= count;
        Ok(())
    }

    /// Shrink (never grow past the buffer) the readable extent
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit.min(self.data.len() as u64 * 8).max(self.pos);
    }

    /// Bits of padding needed to reach the next multiple of `boundary`
    pub fn padding_to(&self, boundary: u64) -> u64 {
        if boundary <= 1 {
            return 0;
        }
        let rem = self.pos % boundary;
        if rem == 0 {
            0
        } else {
            boundary - rem
        }
    }

    /// Advance the cursor to the next multiple of `boundary` bits; no-op when aligned
    pub fn align(&mut self, boundary: u64) -> DecodeResult<()> {
        let padding = self.padding_to(boundary);
        self.skip(padding)
    }

    pub fn skip(&mut self, bits: u64) -> DecodeResult<()> {
        self.ensure(bits)?;
        self.pos += bits;
        Ok(())
    }

    fn ensure(&self, bits: u64) -> DecodeResult<()> {
        if bits > self.remaining_bits() {
            return Err(DecodeError::bounds(bits, self.pos, self.remaining_bits()));
        }
        Ok(())
    }

    fn check_length(&self, length: u8) -> DecodeResult<()> {
        if length == 0 || length > 64 {
            return Err(DecodeError::encoding(
                self.pos,
                format!("unsupported integer length {length} (expected 1..=64)"),
            ));
        }
        Ok(())
    }

    /// Read `length` bits as an unsigned integer
    pub fn read_unsigned_int(&mut self, length: u8, byte_order: ByteOrder) -> DecodeResult<u64> {
        self.check_length(length)?;
        self.ensure(u64::from(length))?;

        let value = if self.pos % 8 == 0 && length % 8 == 0 {
            self.read_aligned(length, byte_order)
        } else {
            self.read_unaligned(length, byte_order)
        };
        self.pos += u64::from(length);
        Ok(value)
    }

    /// Read `length` bits and sign-extend from bit `length - 1`
    pub fn read_signed_int(&mut self, length: u8, byte_order: ByteOrder) -> DecodeResult<i64> {
        let raw = self.read_unsigned_int(length, byte_order)?;
        Ok(sign_extend(raw, length))
    }

    /// Read an IEEE-754 value of `exponent + mantissa + 1` bits.
    ///
    /// Only the binary32 (8/23) and binary64 (11/52) layouts are supported.
    pub fn read_float(
        &mut self,
        exponent: u8,
        mantissa: u8,
        byte_order: ByteOrder,
    ) -> DecodeResult<f64> {
        match (exponent, mantissa) {
            (8, 23) => {
                let raw = self.read_unsigned_int(32, byte_order)?;
                Ok(f64::from(f32::from_bits(raw as u32)))
            }
            (11, 52) => {
                let raw = self.read_unsigned_int(64, byte_order)?;
                Ok(f64::from_bits(raw))
            }
            _ => Err(DecodeError::encoding(
                self.pos,
                format!(
                    "unsupported floating point layout: {exponent} exponent bits, {mantissa} mantissa bits"
                ),
            )),
        }
    }

    /// Read `count` whole bytes; the cursor must be byte aligned
    pub fn read_bytes(&mut self, count: u64) -> DecodeResult<&'a [u8]> {
        self.require_byte_aligned()?;
        self.ensure(count.saturating_mul(8))?;
        let start = (self.pos / 8) as usize;
        let bytes = &self.data[start..start + count as usize];
        self.pos += count * 8;
        Ok(bytes)
    }

    /// Read bytes up to (excluding) the next NUL and step past the terminator.
    ///
    /// The cursor must be byte aligned. Reaching the limit without a terminator is an
    /// encoding error and leaves the cursor untouched.
    pub fn read_null_terminated_bytes(&mut self) -> DecodeResult<&'a [u8]> {
        self.require_byte_aligned()?;
        let start = (self.pos / 8) as usize;
        let end = (self.limit / 8) as usize;
        let window = &self.data[start..end];
        match window.iter().position(|&b| b == 0) {
            Some(len) => {
                self.pos += (len as u64 + 1) * 8;
                Ok(&window[..len])
            }
            None => Err(DecodeError::encoding(
                self.pos,
                format!("unterminated string: no NUL in the remaining {} bytes", window.len()),
            )),
        }
    }

    fn require_byte_aligned(&self) -> DecodeResult<()> {
        if self.pos % 8 != 0 {
            return Err(DecodeError::encoding(
                self.pos,
                "byte read requested at a non byte-aligned position",
            ));
        }
        Ok(())
    }

    fn read_aligned(&self, length: u8, byte_order: ByteOrder) -> u64 {
        let start = (self.pos / 8) as usize;
        let bytes = &self.data[start..start + usize::from(length / 8)];
        match byte_order {
            ByteOrder::BigEndian => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
            ByteOrder::LittleEndian => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
        }
    }

    fn read_unaligned(&self, length: u8, byte_order: ByteOrder) -> u64 {
        let shift = (self.pos % 8) as u32;
        let start = (self.pos / 8) as usize;
        // At most 9 bytes: 7 bits of leading offset + 64 bits of payload
        let nbytes = (shift as usize + usize::from(length) + 7) / 8;
        let bytes = &self.data[start..start + nbytes];

        let word = match byte_order {
            ByteOrder::BigEndian => {
                let word = bytes.iter().fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
                word >> (nbytes as u32 * 8 - shift - u32::from(length))
            }
            ByteOrder::LittleEndian => {
                let word = bytes
                    .iter()
                    .rev()
                    .fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
                word >> shift
            }
        };
        (word as u64) & mask(length)
    }
}

fn mask(length: u8) -> u64 {
    if length >= 64 {
        u64::MAX
    } else {
        (1u64 << length) - 1
    }
}

/// Sign-extend the low `length` bits of `raw`
pub fn sign_extend(raw: u64, length: u8) -> i64 {
    if length >= 64 {
        return raw as i64;
    }
    let shift = 64 - u32::from(length);
    ((raw << shift) as i64) >> shift
}
