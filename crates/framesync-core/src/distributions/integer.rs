// SPDX-License-Identifier: Apache-2.0
//! Adaptive model over `i32` values, bucketed by bit-length and sign.

use super::symbol::SymbolDistribution;
use crate::bitstream::{ArithmeticDecoder, ArithmeticEncoder, CodecError};

/// Smallest `i` in `0..=31` such that `value >> i` equals `0` (non-negative
/// `value`) or `-1` (negative `value`); `31` if no such `i` exists below it.
fn count_significant_bits(value: i32) -> u32 {
    let sign = if value < 0 { -1 } else { 0 };
    for i in 0..31 {
        if value >> i == sign {
            return i;
        }
    }
    31
}

/// Adaptive model over signed integers: a 64-bucket [`SymbolDistribution`]
/// keyed by `(bit length, sign)`, with the bits below the most significant
/// one coded uniformly once the bucket is known.
#[derive(Debug, Clone)]
pub struct IntegerDistribution {
    dist: SymbolDistribution,
}

impl Default for IntegerDistribution {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegerDistribution {
    /// Creates a fresh distribution with all 64 buckets equally likely.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dist: SymbolDistribution::new(64),
        }
    }

    fn bucket_of(value: i32) -> usize {
        let bits = count_significant_bits(value);
        bits as usize + if value < 0 { 32 } else { 0 }
    }

    /// Expected coding cost of one draw, in nats (bucket selection plus the
    /// uniform low-bit tail).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn expected_cost(&self) -> f32 {
        let mut cost = 0.0f32;
        for bits in 0u32..32 {
            let tail_bits = bits.saturating_sub(1) as f32;
            let p = self.dist.probability(bits as usize);
            cost += p * (-p.ln() + tail_bits);

            let p = self.dist.probability(bits as usize + 32);
            cost += p * (-p.ln() + tail_bits);
        }
        cost
    }

    /// Records `value` without coding it: only the bucket count is updated,
    /// the low bits below the most significant one are never tallied.
    pub fn tally(&mut self, value: i32) {
        self.dist.tally(Self::bucket_of(value));
    }

    /// Encodes `value` against the current model, then tallies it.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying encoder.
    pub fn encode_and_tally(
        &mut self,
        encoder: &mut ArithmeticEncoder,
        value: i32,
    ) -> Result<(), CodecError> {
        let bits = count_significant_bits(value);
        let bucket = bits as usize + if value < 0 { 32 } else { 0 };
        self.dist.encode_and_tally(encoder, bucket)?;
        if bits > 0 {
            let unsigned = if value < 0 { !value } else { value };
            #[allow(clippy::cast_sign_loss)]
            encoder.encode_bits(unsigned as u32, bits - 1)?;
        }
        Ok(())
    }

    /// Decodes a value against the current model, then tallies it.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying decoder.
    pub fn decode_and_tally(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> Result<i32, CodecError> {
        let bucket = self.dist.decode_and_tally(decoder)?;
        let bits = (bucket & 0x1F) as u32;
        let value: i32 = if bits > 0 {
            #[allow(clippy::cast_possible_wrap)]
            let low = decoder.decode_bits(bits - 1)? as i32;
            low | (1 << (bits - 1))
        } else {
            0
        };
        Ok(if bucket & 0x20 != 0 { !value } else { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries() {
        assert_eq!(count_significant_bits(0), 0);
        assert_eq!(count_significant_bits(-1), 0);
        assert_eq!(count_significant_bits(5), 3);
        assert_eq!(count_significant_bits(-5), 3);
        assert_eq!(count_significant_bits(i32::MIN), 31);
        assert_eq!(count_significant_bits(i32::MAX), 31);
    }

    #[test]
    fn roundtrips_mixed_sign_values() {
        let values = [0i32, 1, -1, 5, -5, 1000, -1000, i32::MAX, i32::MIN, 42];
        let mut enc_dist = IntegerDistribution::new();
        let mut encoder = ArithmeticEncoder::new();
        for &v in &values {
            enc_dist.encode_and_tally(&mut encoder, v).unwrap();
        }
        let bytes = encoder.finish();

        let mut dec_dist = IntegerDistribution::new();
        let mut decoder = ArithmeticDecoder::new(&bytes);
        for &v in &values {
            assert_eq!(dec_dist.decode_and_tally(&mut decoder).unwrap(), v);
        }
    }

    #[test]
    fn tally_raises_bucket_probability() {
        let mut dist = IntegerDistribution::new();
        dist.tally(12345);
        assert!(dist.dist.probability(IntegerDistribution::bucket_of(12345)) > 1.0 / 64.0);
    }
}
