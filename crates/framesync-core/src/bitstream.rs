// SPDX-License-Identifier: Apache-2.0
//! Binary arithmetic coder over a 32-bit `[min, max)` code interval.
//!
//! The coder keeps a running interval that narrows with every call to
//! [`ArithmeticEncoder::encode`]; three bound constants drive the
//! underflow-safe rescaling so the interval never needs more than 32 bits of
//! precision regardless of stream length. See `spec.md` §4.1.

use thiserror::Error;

/// The coder's interval register width (bits).
const NUM_BITS: u32 = 32;

/// Rescale window when the interval collapses into the lower half.
const BOUND0: Code = 0;
/// Lower underflow bound (`2^29`).
const BOUND1: Code = 1 << (NUM_BITS - 3);
/// Midpoint of the interval (`2^30`).
const BOUND2: Code = 1 << (NUM_BITS - 2);
/// Upper underflow bound (`3 * 2^29`).
const BOUND3: Code = BOUND1 | BOUND2;
/// Top of the interval (`2^31`).
const BOUND4: Code = 1 << (NUM_BITS - 1);

/// The coder's code register type.
pub type Code = u32;

/// Largest denominator `Encode`/`Decode` accept (`BOUND1 - 1`).
pub const MAX_DENOM: Code = BOUND1 - 1;

/// Errors raised by precondition violations in the coder.
///
/// These are assertion-grade: every call site in this crate constructs
/// ranges that satisfy the precondition, so in practice this variant
/// indicates a bug in the caller, not a malformed remote packet (malformed
/// packets are handled by dropping at a higher layer, per `spec.md` §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// `encode`/`decode` was called with `a`, `b`, or `denom` outside
    /// `0 <= a < b <= denom <= MAX_DENOM`.
    #[error("bad range: violates 0 <= a < b <= denom <= {MAX_DENOM}")]
    BadRange,
}

/// Arithmetic encoder writing into an owned byte buffer.
#[derive(Debug, Clone)]
pub struct ArithmeticEncoder {
    buffer: Vec<u8>,
    bit_index: i32,
    underflow: u32,
    min: Code,
    max: Code,
}

impl Default for ArithmeticEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArithmeticEncoder {
    /// Creates an encoder with an empty output buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            bit_index: 7,
            underflow: 0,
            min: BOUND0,
            max: BOUND4,
        }
    }

    fn write_bit(&mut self, bit: u8) {
        self.bit_index += 1;
        if self.bit_index == 8 {
            self.buffer.push(0);
            self.bit_index = 0;
        }
        if let Some(last) = self.buffer.last_mut() {
            *last |= bit << self.bit_index;
        }
    }

    fn rescale(&mut self, window: Code) {
        self.min = self.min.wrapping_sub(window) << 1;
        self.max = self.max.wrapping_sub(window) << 1;
    }

    /// Encodes the sub-range `[a/denom, b/denom)` of the current interval.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BadRange`] unless
    /// `0 <= a < b <= denom <= MAX_DENOM`.
    pub fn encode(&mut self, a: Code, b: Code, denom: Code) -> Result<(), CodecError> {
        if !(a < b && b <= denom && denom <= MAX_DENOM) {
            return Err(CodecError::BadRange);
        }
        let step = (self.max - self.min) / denom;
        self.max = self.min + step * b;
        self.min = self.min + step * a;

        loop {
            if self.max <= BOUND2 {
                self.write_bit(0);
                while self.underflow > 0 {
                    self.write_bit(1);
                    self.underflow -= 1;
                }
                self.rescale(BOUND0);
            } else if BOUND2 <= self.min {
                self.write_bit(1);
                while self.underflow > 0 {
                    self.write_bit(0);
                    self.underflow -= 1;
                }
                self.rescale(BOUND2);
            } else {
                break;
            }
        }

        while BOUND1 <= self.min && self.max <= BOUND3 {
            self.rescale(BOUND1);
            self.underflow += 1;
        }

        Ok(())
    }

    /// Encodes `x` uniformly among `d` equally likely symbols (`Encode(x, x+1, d)`).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BadRange`] unless `x < d <= MAX_DENOM`.
    pub fn encode_uniform(&mut self, x: Code, d: Code) -> Result<(), CodecError> {
        self.encode(x, x + 1, d)
    }

    /// Encodes the low `n` bits of `value`, splitting into two calls when
    /// `n > 28` so the per-call denominator (`1 << n`) never exceeds
    /// [`MAX_DENOM`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BadRange`] if `n > 32`.
    pub fn encode_bits(&mut self, value: u32, n: u32) -> Result<(), CodecError> {
        if n > 32 {
            return Err(CodecError::BadRange);
        }
        if n > 28 {
            self.encode_bits(value, 16)?;
            self.encode_bits(value >> 16, n - 16)?;
            return Ok(());
        }
        let mask = if n == 32 { u32::MAX } else { (1u32 << n) - 1 };
        self.encode_uniform(value & mask, 1 << n)
    }

    /// Flushes the coder by emitting a single terminator bit.
    ///
    /// Consumes the encoder and returns the finished byte buffer.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.write_bit(1);
        self.buffer
    }

    /// Byte length of the buffer written so far (for telemetry).
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Arithmetic decoder reading from a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ArithmeticDecoder<'a> {
    buffer: &'a [u8],
    byte_index: usize,
    bit_index: i32,
    min: Code,
    max: Code,
    code: Code,
    step: Code,
}

impl<'a> ArithmeticDecoder<'a> {
    /// Creates a decoder over `buffer`, seeding the code register from the
    /// first `NUM_BITS - 1` bits. Reads past the end of `buffer` return 0,
    /// per `spec.md` §4.1.
    #[must_use]
    pub fn new(buffer: &'a [u8]) -> Self {
        let mut decoder = Self {
            buffer,
            byte_index: 0,
            bit_index: 0,
            min: BOUND0,
            max: BOUND4,
            code: 0,
            step: 0,
        };
        for _ in 1..NUM_BITS {
            let bit = decoder.read_bit();
            decoder.code = (decoder.code << 1) | u32::from(bit);
        }
        decoder
    }

    fn read_bit(&mut self) -> u8 {
        if self.byte_index >= self.buffer.len() {
            return 0;
        }
        let bit = (self.buffer[self.byte_index] >> self.bit_index) & 1;
        self.bit_index += 1;
        if self.bit_index == 8 {
            self.byte_index += 1;
            self.bit_index = 0;
        }
        bit
    }

    fn rescale(&mut self, window: Code) {
        self.min = self.min.wrapping_sub(window) << 1;
        self.max = self.max.wrapping_sub(window) << 1;
        let bit = self.read_bit();
        self.code = (self.code.wrapping_sub(window) << 1) | u32::from(bit);
    }

    /// Returns `x` such that `x/denom` lies in the interval named by the
    /// matching [`ArithmeticEncoder::encode`] call. The caller must follow
    /// with [`Self::confirm`] using the same `a, b` the encoder used.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BadRange`] unless `0 < denom <= MAX_DENOM`.
    pub fn decode(&mut self, denom: Code) -> Result<Code, CodecError> {
        if denom == 0 || denom > MAX_DENOM {
            return Err(CodecError::BadRange);
        }
        self.step = (self.max - self.min) / denom;
        Ok((self.code - self.min) / self.step)
    }

    /// Narrows the interval to `[a/denom, b/denom)` identically to the
    /// encoder's `encode(a, b, denom)`, without emitting bits.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BadRange`] unless `a < b`.
    pub fn confirm(&mut self, a: Code, b: Code) -> Result<(), CodecError> {
        if a >= b {
            return Err(CodecError::BadRange);
        }
        self.max = self.min + self.step * b;
        self.min = self.min + self.step * a;

        loop {
            if self.max <= BOUND2 {
                self.rescale(BOUND0);
            } else if BOUND2 <= self.min {
                self.rescale(BOUND2);
            } else {
                break;
            }
        }

        while BOUND1 <= self.min && self.max <= BOUND3 {
            self.rescale(BOUND1);
        }

        Ok(())
    }

    /// Decodes a value uniform among `d` symbols (`decode` + `confirm`).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BadRange`] unless `d <= MAX_DENOM`.
    pub fn decode_uniform(&mut self, d: Code) -> Result<Code, CodecError> {
        let x = self.decode(d)?;
        self.confirm(x, x + 1)?;
        Ok(x)
    }

    /// Decodes `n` raw bits previously written by
    /// [`ArithmeticEncoder::encode_bits`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BadRange`] if `n > 32`.
    pub fn decode_bits(&mut self, n: u32) -> Result<u32, CodecError> {
        if n > 32 {
            return Err(CodecError::BadRange);
        }
        if n > 28 {
            let lo = self.decode_bits(16)?;
            let hi = self.decode_bits(n - 16)?;
            return Ok((hi << 16) | lo);
        }
        self.decode_uniform(1 << n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn encode_decode_uniform_roundtrip() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut triples = Vec::with_capacity(10_000);
        let mut encoder = ArithmeticEncoder::new();
        for _ in 0..10_000 {
            let d: Code = rng.gen_range(1..=10_000);
            let a: Code = rng.gen_range(0..d);
            let b: Code = rng.gen_range(a + 1..=d);
            encoder.encode(a, b, d).expect("valid range");
            triples.push((a, b, d));
        }
        let bytes = encoder.finish();
        let mut decoder = ArithmeticDecoder::new(&bytes);
        for (a, b, d) in triples {
            let x = decoder.decode(d).expect("valid denom");
            assert!(x >= a && x < b, "decoded {x} outside [{a}, {b})");
            decoder.confirm(a, b).expect("valid confirm");
        }
    }

    #[test]
    fn raw_bits_roundtrip() {
        for n in 0..=32u32 {
            let v: u32 = if n == 32 { u32::MAX } else { (1u32 << n) - 1 };
            let mut encoder = ArithmeticEncoder::new();
            encoder.encode_bits(v, n).expect("valid n");
            let bytes = encoder.finish();
            assert!(bytes.len() <= n.div_ceil(8) as usize + 1);
            let mut decoder = ArithmeticDecoder::new(&bytes);
            let out = decoder.decode_bits(n).expect("valid n");
            assert_eq!(out, v, "n={n}");
        }
    }

    #[test]
    fn sixty_four_uniform_ints_are_compact() {
        let mut rng = StdRng::seed_from_u64(1);
        let values: Vec<u32> = (0..64).map(|_| rng.gen_range(0..1000)).collect();
        let mut encoder = ArithmeticEncoder::new();
        for &v in &values {
            encoder.encode_uniform(v, 1000).expect("valid range");
        }
        let bytes = encoder.finish();
        assert!(bytes.len() < 64 * 4);
        let mut decoder = ArithmeticDecoder::new(&bytes);
        for &v in &values {
            let out = decoder.decode_uniform(1000).expect("valid range");
            assert_eq!(out, v);
        }
    }

    #[test]
    fn bad_range_is_rejected() {
        let mut encoder = ArithmeticEncoder::new();
        assert_eq!(encoder.encode(2, 1, 10), Err(CodecError::BadRange));
        assert_eq!(encoder.encode(0, 11, 10), Err(CodecError::BadRange));
        assert_eq!(
            encoder.encode(0, 1, MAX_DENOM + 1),
            Err(CodecError::BadRange)
        );
    }

    #[test]
    fn reads_past_end_return_zero() {
        let decoder = ArithmeticDecoder::new(&[]);
        // Constructing over an empty buffer must not panic; all seed bits
        // come back as 0 per spec.md §4.1.
        drop(decoder);
    }

    proptest::proptest! {
        #[test]
        fn encoded_symbols_always_decode_inside_their_interval(
            denom in 1..=MAX_DENOM,
            a_raw in 0u32..10_000,
            width in 1u32..10_000,
        ) {
            let a = a_raw % denom;
            let b = (a + 1 + width % (denom - a)).min(denom);
            let mut encoder = ArithmeticEncoder::new();
            encoder.encode(a, b, denom).unwrap();
            let bytes = encoder.finish();
            let mut decoder = ArithmeticDecoder::new(&bytes);
            let x = decoder.decode(denom).unwrap();
            proptest::prop_assert!(x >= a && x < b);
            decoder.confirm(a, b).unwrap();
        }
    }
}
