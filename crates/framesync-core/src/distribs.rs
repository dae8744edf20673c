// SPDX-License-Identifier: Apache-2.0
//! The bundle of adaptive models shared by one frame's worth of encode or
//! decode work on one side of a peer.

use crate::distributions::{FieldDistribution, IntegerDistribution, SymbolDistribution};
use crate::schema::{ClassDef, Protocol};

/// Every probability model needed to code one frame's delta against its
/// baselines. A local set and a remote set each keep a `Distribs` per
/// retained frame (`frame -> Distribs`) and advance a *copy* of the previous
/// frame's instance every time a new frame is produced or consumed, so both
/// sides of a peer observe byte-identical model state provided they process
/// the same sequence of `EncodeAndTally`/`DecodeAndTally` calls.
///
/// Reference fields are coded as `currentId - prevId` through
/// [`Self::unique_id_dist`] — the same model used to code newly-visible
/// objects' network IDs — rather than a distribution of their own; the
/// original design reuses it because both quantities are "a small signed
/// delta over object identities" and splitting them bought nothing.
#[derive(Debug, Clone)]
pub struct Distribs {
    var_field_dists: Vec<FieldDistribution>,
    const_field_dists: Vec<IntegerDistribution>,
    event_count_dist: IntegerDistribution,
    new_object_count_dist: IntegerDistribution,
    del_object_count_dist: IntegerDistribution,
    unique_id_dist: IntegerDistribution,
    object_class_dist: SymbolDistribution,
    event_class_dist: SymbolDistribution,
}

impl Distribs {
    /// Creates a fresh set of models sized for `protocol`, all at their
    /// initial (equally-likely) state.
    #[must_use]
    pub fn new(protocol: &Protocol) -> Self {
        Self {
            var_field_dists: (0..protocol.num_var_int_fields())
                .map(|_| FieldDistribution::new())
                .collect(),
            const_field_dists: (0..protocol.num_const_int_fields())
                .map(|_| IntegerDistribution::new())
                .collect(),
            event_count_dist: IntegerDistribution::new(),
            new_object_count_dist: IntegerDistribution::new(),
            del_object_count_dist: IntegerDistribution::new(),
            unique_id_dist: IntegerDistribution::new(),
            object_class_dist: SymbolDistribution::new(protocol.object_class_count()),
            event_class_dist: SymbolDistribution::new(protocol.event_class_count()),
        }
    }

    pub(crate) fn var_field_dist(&mut self, unique_id: usize) -> &mut FieldDistribution {
        &mut self.var_field_dists[unique_id]
    }

    pub(crate) fn const_field_dist(&mut self, unique_id: usize) -> &mut IntegerDistribution {
        &mut self.const_field_dists[unique_id]
    }

    pub(crate) fn event_count_dist(&mut self) -> &mut IntegerDistribution {
        &mut self.event_count_dist
    }

    pub(crate) fn new_object_count_dist(&mut self) -> &mut IntegerDistribution {
        &mut self.new_object_count_dist
    }

    pub(crate) fn del_object_count_dist(&mut self) -> &mut IntegerDistribution {
        &mut self.del_object_count_dist
    }

    pub(crate) fn unique_id_dist(&mut self) -> &mut IntegerDistribution {
        &mut self.unique_id_dist
    }

    pub(crate) fn object_class_dist(&mut self) -> &mut SymbolDistribution {
        &mut self.object_class_dist
    }

    pub(crate) fn event_class_dist(&mut self) -> &mut SymbolDistribution {
        &mut self.event_class_dist
    }
}

use crate::bitstream::{ArithmeticDecoder, ArithmeticEncoder, CodecError};

/// Encodes every constant field of `cl`, in declaration order, reading each
/// one's value out of `state` (a buffer shaped by `cl`'s constant-field
/// layout) and tallying its dedicated distribution.
pub(crate) fn encode_and_tally_constants(
    distribs: &mut Distribs,
    encoder: &mut ArithmeticEncoder,
    cl: &ClassDef,
    state: &[i32],
) -> Result<(), CodecError> {
    for field in cl.const_fields() {
        let value = state[field.slot()];
        distribs
            .const_field_dist(field.unique_id())
            .encode_and_tally(encoder, value)?;
    }
    Ok(())
}

/// Decodes every constant field of `cl`, in declaration order, returning a
/// freshly allocated state buffer shaped by `cl`'s constant-field layout.
pub(crate) fn decode_and_tally_constants(
    distribs: &mut Distribs,
    decoder: &mut ArithmeticDecoder<'_>,
    cl: &ClassDef,
) -> Result<Vec<i32>, CodecError> {
    let mut state = vec![0i32; cl.const_slots()];
    for field in cl.const_fields() {
        let value = distribs
            .const_field_dist(field.unique_id())
            .decode_and_tally(decoder)?;
        state[field.slot()] = value;
    }
    Ok(state)
}
