// SPDX-License-Identifier: Apache-2.0
//! Adaptive cumulative-frequency model over a fixed alphabet.

use crate::bitstream::{ArithmeticDecoder, ArithmeticEncoder, CodecError, Code};

/// Adaptive frequency table over `symbols` outcomes, each starting at count 1
/// (Laplace-smoothed: no symbol is ever given zero probability).
#[derive(Debug, Clone)]
pub struct SymbolDistribution {
    counts: Vec<Code>,
}

impl SymbolDistribution {
    /// Creates a distribution over `symbols` outcomes, each initially
    /// equally likely.
    #[must_use]
    pub fn new(symbols: usize) -> Self {
        Self {
            counts: vec![1; symbols],
        }
    }

    /// Number of outcomes this distribution models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether this distribution models zero outcomes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn range(&self, symbol: usize) -> (Code, Code, Code) {
        let a: Code = self.counts[..symbol].iter().sum();
        let b = a + self.counts[symbol];
        let d: Code = self.counts.iter().sum();
        (a, b, d)
    }

    /// The model's current estimate of `symbol`'s probability, including the
    /// Laplace smoothing term (so never exactly zero).
    #[must_use]
    pub fn probability(&self, symbol: usize) -> f32 {
        let (a, b, d) = self.range(symbol);
        (b - a) as f32 / d as f32
    }

    /// Expected coding cost of one draw from this distribution, in nats.
    #[must_use]
    pub fn expected_cost(&self) -> f32 {
        (0..self.counts.len())
            .map(|i| {
                let p = self.probability(i);
                p * -p.ln()
            })
            .sum()
    }

    /// Records an occurrence of `symbol` without coding it.
    pub fn tally(&mut self, symbol: usize) {
        self.counts[symbol] += 1;
    }

    /// Encodes `symbol` against the current model, then tallies it.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying encoder; this
    /// cannot happen for a well-formed distribution.
    pub fn encode_and_tally(
        &mut self,
        encoder: &mut ArithmeticEncoder,
        symbol: usize,
    ) -> Result<(), CodecError> {
        let (a, b, d) = self.range(symbol);
        encoder.encode(a, b, d)?;
        self.tally(symbol);
        Ok(())
    }

    /// Decodes a symbol against the current model, then tallies it.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying decoder.
    pub fn decode_and_tally(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> Result<usize, CodecError> {
        let d: Code = self.counts.iter().sum();
        let x = decoder.decode(d)?;

        let mut a: Code = 0;
        for (i, &count) in self.counts.iter().enumerate() {
            let b = a + count;
            if b > x {
                decoder.confirm(a, b)?;
                self.tally(i);
                return Ok(i);
            }
            a = b;
        }
        Err(CodecError::BadRange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_sequence_of_symbols() {
        let symbols = [0usize, 2, 2, 1, 2, 0, 3, 2];
        let mut enc_dist = SymbolDistribution::new(4);
        let mut encoder = ArithmeticEncoder::new();
        for &s in &symbols {
            enc_dist.encode_and_tally(&mut encoder, s).unwrap();
        }
        let bytes = encoder.finish();

        let mut dec_dist = SymbolDistribution::new(4);
        let mut decoder = ArithmeticDecoder::new(&bytes);
        for &s in &symbols {
            assert_eq!(dec_dist.decode_and_tally(&mut decoder).unwrap(), s);
        }
    }

    #[test]
    fn frequent_symbols_converge_to_higher_probability() {
        let mut dist = SymbolDistribution::new(2);
        for _ in 0..50 {
            dist.tally(0);
        }
        assert!(dist.probability(0) > dist.probability(1));
    }
}
