// SPDX-License-Identifier: Apache-2.0
//! Per-field ensemble of [`IntegerDistribution`]s, one per predictor, with a
//! tally-all/encode-best discipline so every model tracks the residual its
//! own predictor would have produced.

use super::curve::CurvePredictor;
use super::integer::IntegerDistribution;
use crate::bitstream::{ArithmeticDecoder, ArithmeticEncoder, CodecError};

/// Five [`IntegerDistribution`]s covering the zero/constant/linear/
/// quadratic/cubic predictors for one field; `index 0` pairs with
/// `predictors[0]` (zero), `index i` with `predictors[i]` for `i` in `1..=4`.
#[derive(Debug, Clone)]
pub struct FieldDistribution {
    dists: [IntegerDistribution; 5],
}

impl Default for FieldDistribution {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldDistribution {
    /// Creates five fresh, independent distributions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dists: std::array::from_fn(|_| IntegerDistribution::new()),
        }
    }

    /// Index of the distribution with the lowest expected coding cost among
    /// the first `sample_count + 1` (those whose predictor has enough prior
    /// samples to be meaningful).
    #[must_use]
    pub fn best_distribution(&self, sample_count: usize) -> usize {
        let mut best = 0;
        let mut best_cost = self.dists[0].expected_cost();
        for i in 1..=sample_count {
            let cost = self.dists[i].expected_cost();
            if cost < best_cost {
                best = i;
                best_cost = cost;
            }
        }
        best
    }

    /// Encodes `value`'s residual against the cheapest predictor's
    /// distribution, then tallies every other in-range distribution against
    /// its own residual without coding it — every model sees every sample.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying encoder.
    pub fn encode_and_tally(
        &mut self,
        encoder: &mut ArithmeticEncoder,
        value: i32,
        prev_values: [i32; 4],
        predictors: &[CurvePredictor; 5],
        sample_count: usize,
    ) -> Result<(), CodecError> {
        let best = self.best_distribution(sample_count);
        self.dists[best].encode_and_tally(encoder, value - predictors[best].call(prev_values))?;
        for i in 0..=sample_count {
            if i != best {
                self.dists[i].tally(value - predictors[i].call(prev_values));
            }
        }
        Ok(())
    }

    /// Decodes a value using the cheapest predictor's distribution, then
    /// tallies every other in-range distribution against its own residual.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying decoder.
    pub fn decode_and_tally(
        &mut self,
        decoder: &mut ArithmeticDecoder<'_>,
        prev_values: [i32; 4],
        predictors: &[CurvePredictor; 5],
        sample_count: usize,
    ) -> Result<i32, CodecError> {
        let best = self.best_distribution(sample_count);
        let value = self.dists[best].decode_and_tally(decoder)? + predictors[best].call(prev_values);
        for i in 0..=sample_count {
            if i != best {
                self.dists[i].tally(value - predictors[i].call(prev_values));
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictors() -> [CurvePredictor; 5] {
        [
            CurvePredictor::zero(),
            CurvePredictor::constant(),
            CurvePredictor::linear(-1, -2),
            CurvePredictor::quadratic(-1, -2, -3),
            CurvePredictor::cubic(-1, -2, -3, -4),
        ]
    }

    #[test]
    fn roundtrips_a_converging_series() {
        let preds = predictors();
        let values = [10i32, 11, 13, 16, 20, 25, 31, 38];
        let mut history = [0i32; 4];

        let mut enc_field = FieldDistribution::new();
        let mut encoder = ArithmeticEncoder::new();
        for (i, &v) in values.iter().enumerate() {
            let sample_count = i.min(3);
            enc_field
                .encode_and_tally(&mut encoder, v, history, &preds, sample_count)
                .unwrap();
            history = [v, history[0], history[1], history[2]];
        }
        let bytes = encoder.finish();

        let mut dec_field = FieldDistribution::new();
        let mut decoder = ArithmeticDecoder::new(&bytes);
        let mut history = [0i32; 4];
        for (i, &v) in values.iter().enumerate() {
            let sample_count = i.min(3);
            let decoded = dec_field
                .decode_and_tally(&mut decoder, history, &preds, sample_count)
                .unwrap();
            assert_eq!(decoded, v);
            history = [decoded, history[0], history[1], history[2]];
        }
    }
}
