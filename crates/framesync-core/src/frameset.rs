// SPDX-License-Identifier: Apache-2.0
//! Selection of baseline frames and the curve predictors built from them.

use std::collections::BTreeMap;

use crate::bitstream::{ArithmeticDecoder, ArithmeticEncoder, Code, CodecError};
use crate::distribs::Distribs;
use crate::distributions::CurvePredictor;
use crate::schema::ClassDef;

/// The oldest frame still inside the delta-compression horizon relative to
/// `frame`, per `max_frame_delta`. Frames older than this are never named as
/// a baseline and are eventually retired from the retained snapshot window.
#[must_use]
pub(crate) fn frame_cutoff(frame: i32, max_frame_delta: u32) -> i32 {
    let delta = i32::try_from(max_frame_delta).unwrap_or(i32::MAX);
    frame.saturating_sub(delta)
}

/// Encodes `frames` (current frame first, then baselines, most recent first)
/// as: a count uniform over `0..=max_frames`, the first frame as 32 raw bits,
/// then each following frame as a delta from its predecessor uniform over
/// the shrinking remaining horizon.
///
/// # Errors
///
/// Propagates [`CodecError::BadRange`] from the underlying encoder.
pub(crate) fn encode_framelist(
    encoder: &mut ArithmeticEncoder,
    frames: &[i32],
    max_frames: usize,
    max_frame_delta: u32,
) -> Result<(), CodecError> {
    debug_assert!(frames.len() <= max_frames);
    #[allow(clippy::cast_possible_truncation)]
    encoder.encode_uniform(frames.len() as Code, max_frames as Code + 1)?;
    if let Some(&first) = frames.first() {
        #[allow(clippy::cast_sign_loss)]
        encoder.encode_bits(first as u32, 32)?;
    }
    let mut remaining = max_frame_delta;
    for pair in frames.windows(2) {
        let delta = pair[0] - pair[1];
        #[allow(clippy::cast_sign_loss)]
        encoder.encode_uniform(delta as Code, remaining + 1)?;
        #[allow(clippy::cast_sign_loss)]
        {
            remaining -= delta as Code;
        }
    }
    Ok(())
}

/// Decodes a framelist written by [`encode_framelist`].
///
/// # Errors
///
/// Propagates [`CodecError::BadRange`] from the underlying decoder.
pub(crate) fn decode_framelist(
    decoder: &mut ArithmeticDecoder<'_>,
    max_frames: usize,
    max_frame_delta: u32,
) -> Result<Vec<i32>, CodecError> {
    #[allow(clippy::cast_possible_truncation)]
    let count = decoder.decode_uniform(max_frames as Code + 1)? as usize;
    let mut frames = Vec::with_capacity(count);
    if count > 0 {
        #[allow(clippy::cast_possible_wrap)]
        frames.push(decoder.decode_bits(32)? as i32);
    }
    let mut remaining = max_frame_delta;
    for _ in 1..count {
        let delta = decoder.decode_uniform(remaining + 1)?;
        #[allow(clippy::cast_possible_wrap)]
        frames.push(frames[frames.len() - 1] - delta as i32);
        remaining -= delta;
    }
    Ok(frames)
}

/// The current frame plus up to four baselines (most recent first), with the
/// curve predictors those baselines support already built. Constructed fresh
/// for every `produce_update`/`consume_update` call from the frame list named
/// in the message and the snapshot map it delta-compresses against.
pub struct Frameset<'a> {
    frame: i32,
    prev_frames: [i32; 4],
    prev_states: [Option<&'a [i32]>; 4],
    predictors: [CurvePredictor; 5],
}

impl<'a> Frameset<'a> {
    /// Builds a frameset from `frames` (current frame first, then up to four
    /// baselines, as named by the wire framelist) and `frame_states` (the
    /// retained snapshot window). A baseline frame absent from
    /// `frame_states` is treated the same as `0` (no baseline at that slot)
    /// — callers that must distinguish "absent baseline" from "malformed
    /// packet naming an unretained frame" check [`Self::missing_baseline`]
    /// themselves before constructing, per §4.7.
    #[must_use]
    pub fn new(frames: &[i32], frame_states: &'a BTreeMap<i32, Vec<i32>>) -> Self {
        let frame = frames.first().copied().unwrap_or(0);
        let mut prev_frames = [0i32; 4];
        for (slot, &f) in frames.iter().skip(1).take(4).enumerate() {
            prev_frames[slot] = f;
        }
        let prev_states = prev_frames.map(|f| {
            if f == 0 {
                None
            } else {
                frame_states.get(&f).map(Vec::as_slice)
            }
        });
        let predictors = Self::build_predictors(frame, prev_frames);
        Self {
            frame,
            prev_frames,
            prev_states,
            predictors,
        }
    }

    /// Whether baseline slot `i` (`0..4`) names a nonzero frame this
    /// frameset could not find a snapshot for — the packet is malformed or
    /// names a frame that has already been retired, and §4.7 says to drop it
    /// silently rather than decode further.
    #[must_use]
    pub const fn missing_baseline(&self, i: usize) -> bool {
        self.prev_frames[i] != 0 && self.prev_states[i].is_none()
    }

    fn build_predictors(frame: i32, prev: [i32; 4]) -> [CurvePredictor; 5] {
        let delta = |i: usize| i64::from(frame) - i64::from(prev[i]);
        let p0 = CurvePredictor::zero();
        let p1 = if prev[0] != 0 {
            CurvePredictor::constant()
        } else {
            p0
        };
        let p2 = if prev[1] != 0 {
            CurvePredictor::linear(delta(0), delta(1))
        } else {
            p1
        };
        // Deliberately falls back to p1 (constant), not p2 (linear): matches
        // the source's RefreshPredictors, which skips straight past the
        // two-point fit when only three baselines are available.
        let p3 = if prev[2] != 0 {
            CurvePredictor::quadratic(delta(0), delta(1), delta(2))
        } else {
            p1
        };
        let p4 = if prev[3] != 0 {
            CurvePredictor::cubic(delta(0), delta(1), delta(2), delta(3))
        } else {
            p1
        };
        [p0, p1, p2, p3, p4]
    }

    /// The frame this update/response names as current.
    #[must_use]
    pub const fn current_frame(&self) -> i32 {
        self.frame
    }

    /// The most recent baseline frame (`0` if none).
    #[must_use]
    pub const fn previous_frame(&self) -> i32 {
        self.prev_frames[0]
    }

    /// The oldest named baseline frame (`0` if fewer than four are named).
    #[must_use]
    pub const fn earliest_frame(&self) -> i32 {
        self.prev_frames[3]
    }

    /// How many of this frameset's baselines are old enough to contain an
    /// object first added on `frame_added` — `0` if the object did not exist
    /// in any of them.
    #[must_use]
    pub fn sample_count(&self, frame_added: i32) -> usize {
        for i in (1..=4).rev() {
            if frame_added <= self.prev_frames[i - 1] {
                return i;
            }
        }
        0
    }

    /// Encodes every variable int field of `cl` for one object, predicting
    /// each from up to four prior samples and tallying every candidate
    /// predictor's distribution, per §4.2's tally-all/encode-best discipline.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying encoder.
    pub fn encode_and_tally_object(
        &self,
        distribs: &mut Distribs,
        encoder: &mut ArithmeticEncoder,
        cl: &ClassDef,
        state_offset: usize,
        frame_added: i32,
        state: &[i32],
    ) -> Result<(), CodecError> {
        let sample_count = self.sample_count(frame_added);
        for field in cl.var_fields() {
            let slot = state_offset + field.slot();
            let prev_values = self.prev_values(slot, sample_count);
            distribs.var_field_dist(field.unique_id()).encode_and_tally(
                encoder,
                state[slot],
                prev_values,
                &self.predictors,
                sample_count,
            )?;
        }
        Ok(())
    }

    /// Decodes every variable int field of `cl` for one object into `state`,
    /// mirroring [`Self::encode_and_tally_object`] exactly.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying decoder.
    pub fn decode_and_tally_object(
        &self,
        distribs: &mut Distribs,
        decoder: &mut ArithmeticDecoder<'_>,
        cl: &ClassDef,
        state_offset: usize,
        frame_added: i32,
        state: &mut [i32],
    ) -> Result<(), CodecError> {
        let sample_count = self.sample_count(frame_added);
        for field in cl.var_fields() {
            let slot = state_offset + field.slot();
            let prev_values = self.prev_values(slot, sample_count);
            let value = distribs.var_field_dist(field.unique_id()).decode_and_tally(
                decoder,
                prev_values,
                &self.predictors,
                sample_count,
            )?;
            state[slot] = value;
        }
        Ok(())
    }

    fn prev_values(&self, slot: usize, sample_count: usize) -> [i32; 4] {
        let mut values = [0i32; 4];
        for (i, value) in values.iter_mut().enumerate() {
            if sample_count > i {
                if let Some(state) = self.prev_states[i] {
                    *value = state[slot];
                }
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictor_3_falls_back_to_p1_not_p2() {
        let frame_states = BTreeMap::new();
        // Two baselines present (prev[0], prev[1]) so p2 is a genuine linear
        // fit and differs from p1 (constant); prev[2] absent triggers p3's
        // fallback, which the source points at p1, not p2.
        let frameset = Frameset::new(&[40, 30, 20], &frame_states);
        assert_ne!(frameset.predictors[2], frameset.predictors[1]);
        assert_eq!(frameset.predictors[3], frameset.predictors[1]);
        assert_eq!(frameset.predictors[4], frameset.predictors[1]);
    }

    #[test]
    fn sample_count_matches_baseline_coverage() {
        let frame_states = BTreeMap::new();
        let frameset = Frameset::new(&[40, 30, 20, 10, 0], &frame_states);
        assert_eq!(frameset.sample_count(5), 3);
        assert_eq!(frameset.sample_count(25), 1);
        assert_eq!(frameset.sample_count(35), 0);
    }

    #[test]
    fn cold_start_with_no_baselines_uses_zero_predictor_everywhere() {
        let frame_states = BTreeMap::new();
        let frameset = Frameset::new(&[1], &frame_states);
        for p in &frameset.predictors[1..] {
            assert_eq!(*p, CurvePredictor::zero());
        }
    }

    #[test]
    fn framelist_roundtrips_through_shrinking_deltas() {
        let frames = [120, 100, 90, 70];
        let mut encoder = ArithmeticEncoder::new();
        encode_framelist(&mut encoder, &frames, 5, 60).unwrap();
        let bytes = encoder.finish();
        let mut decoder = ArithmeticDecoder::new(&bytes);
        let decoded = decode_framelist(&mut decoder, 5, 60).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn empty_framelist_roundtrips() {
        let mut encoder = ArithmeticEncoder::new();
        encode_framelist(&mut encoder, &[], 4, 30).unwrap();
        let bytes = encoder.finish();
        let mut decoder = ArithmeticDecoder::new(&bytes);
        assert_eq!(decode_framelist(&mut decoder, 4, 30).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn frame_cutoff_saturates_instead_of_overflowing() {
        assert_eq!(frame_cutoff(i32::MIN + 10, 100), i32::MIN);
        assert_eq!(frame_cutoff(100, 30), 70);
    }
}
