// SPDX-License-Identifier: Apache-2.0
//! A peer's mirrored replica of its counterpart's local set: the objects
//! and events decoded from their updates, re-identified by unique id across
//! transient visibility drops, and garbage-collected once no longer
//! referenced by the most recent frame.

use std::collections::{BTreeMap, HashMap};

use crate::alloc::RangeAllocator;
use crate::arena::Arena;
use crate::bitstream::{ArithmeticDecoder, ArithmeticEncoder, Code, CodecError};
use crate::distribs::{decode_and_tally_constants, Distribs};
use crate::frameset::{decode_framelist, encode_framelist, frame_cutoff, Frameset};
use crate::schema::{ClassId, ClassKind, IntField, Protocol, RefField};
use crate::{MAX_ACK_FRAMES, MAX_UPDATE_FRAMES};
use std::rc::Rc;

/// Marker type distinguishing [`RemoteObjectHandle`]s from other arena
/// handles.
#[derive(Debug)]
pub struct RemoteObjectSlot;

/// Identifies one object or event mirrored from a peer's counterpart.
pub type RemoteObjectHandle = crate::arena::Handle<RemoteObjectSlot>;

struct RemoteObjectData {
    class: ClassId,
    unique_id: i32,
    frame_added: i32,
    const_state: Vec<i32>,
    var_state_offset: usize,
}

struct RemoteFrame {
    views: Vec<RemoteObjectHandle>,
    distribs: Distribs,
}

/// Outcome of [`RemoteSet::consume_update`]: whether the decoded update was
/// applied or silently dropped per the failure semantics of a delta stream
/// that never retransmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The update named a new current frame and was applied.
    Applied,
    /// The update's current frame was no newer than the one already held.
    StaleFrame,
    /// The update named a baseline frame with no retained snapshot.
    MissingBaseline,
}

/// A mirrored replica, decoded frame by frame from a peer's updates.
pub struct RemoteSet {
    protocol: Rc<Protocol>,
    alloc: RangeAllocator,
    frames: BTreeMap<i32, RemoteFrame>,
    frame_states: BTreeMap<i32, Vec<i32>>,
    id_index: HashMap<i32, RemoteObjectHandle>,
    objects: Arena<RemoteObjectSlot, RemoteObjectData>,
    events: Vec<RemoteObjectHandle>,
}

impl RemoteSet {
    /// Creates an empty remote set for `protocol`.
    #[must_use]
    pub fn new(protocol: Rc<Protocol>) -> Self {
        Self {
            protocol,
            alloc: RangeAllocator::new(),
            frames: BTreeMap::new(),
            frame_states: BTreeMap::new(),
            id_index: HashMap::new(),
            objects: Arena::new(),
            events: Vec::new(),
        }
    }

    /// The most recently applied current frame number (`0` if nothing has
    /// been decoded yet).
    #[must_use]
    pub fn latest_frame(&self) -> i32 {
        self.frames.keys().next_back().copied().unwrap_or(0)
    }

    /// Number of objects currently visible: the latest frame's views plus
    /// this call's freshly decoded events.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.frames.values().next_back().map_or(0, |f| f.views.len()) + self.events.len()
    }

    /// The `index`-th currently visible object (views first, then events).
    #[must_use]
    pub fn object_at(&self, index: usize) -> Option<RemoteObjectHandle> {
        let view_count = self.frames.values().next_back().map_or(0, |f| f.views.len());
        if index < view_count {
            return self.frames.values().next_back().map(|f| f.views[index]);
        }
        self.events.get(index - view_count).copied()
    }

    /// The object this set re-identified as `id`, if it is still part of
    /// the most recently decoded frame.
    #[must_use]
    pub fn object_from_unique_id(&self, id: i32) -> Option<RemoteObjectHandle> {
        let handle = *self.id_index.get(&id)?;
        let latest = self.frames.values().next_back()?;
        latest.views.contains(&handle).then_some(handle)
    }

    /// The unique id `handle` was most recently decoded under, or `0` if it
    /// is stale or not part of the latest frame.
    #[must_use]
    pub fn unique_id_of(&self, handle: RemoteObjectHandle) -> i32 {
        let Some(latest) = self.frames.values().next_back() else {
            return 0;
        };
        if !latest.views.contains(&handle) {
            return 0;
        }
        self.objects.get(handle).map_or(0, |d| d.unique_id)
    }

    /// The class `handle` was decoded with.
    #[must_use]
    pub fn class_of(&self, handle: RemoteObjectHandle) -> Option<ClassId> {
        self.objects.get(handle).map(|d| d.class)
    }

    /// Reads an integer field from the most recently decoded state. Returns
    /// `0` for a stale handle or a field declared on a different class.
    #[must_use]
    pub fn get_int(&self, handle: RemoteObjectHandle, field: IntField) -> i32 {
        let Some(data) = self.objects.get(handle) else {
            return 0;
        };
        if field.class() != data.class {
            return 0;
        }
        if field.is_const() {
            return data.const_state[field.slot()];
        }
        let Some(state) = self.frame_states.values().next_back() else {
            return 0;
        };
        state[data.var_state_offset + field.slot()]
    }

    /// The raw wire id a reference field holds: positive names an object in
    /// this same remote set, negative names an object in the counterpart's
    /// own local set (see [`crate::peer::Peer::resolve_ref`]), zero is null.
    #[must_use]
    pub(crate) fn raw_ref(&self, handle: RemoteObjectHandle, field: RefField) -> i32 {
        let Some(data) = self.objects.get(handle) else {
            return 0;
        };
        if field.class() != data.class {
            return 0;
        }
        let Some(state) = self.frame_states.values().next_back() else {
            return 0;
        };
        state[data.var_state_offset + field.slot()]
    }

    /// Decodes one update from `decoder`: the framelist, events published
    /// since the last baseline, object creations and deletions, and every
    /// live view's field deltas. Drops silently (returning the matching
    /// [`ConsumeOutcome`]) if the update is stale or names a baseline this
    /// side has already retired.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying decoder.
    pub fn consume_update(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> Result<ConsumeOutcome, CodecError> {
        let max_frame_delta = self.protocol.max_frame_delta();
        let most_recent_frame = self.frames.keys().next_back().copied().unwrap_or(0);

        let frame_list = decode_framelist(decoder, MAX_UPDATE_FRAMES, max_frame_delta)?;
        let frameset = Frameset::new(&frame_list, &self.frame_states);

        if frameset.current_frame() <= most_recent_frame {
            return Ok(ConsumeOutcome::StaleFrame);
        }
        for i in 0..4 {
            if frameset.missing_baseline(i) {
                return Ok(ConsumeOutcome::MissingBaseline);
            }
        }

        let mut distribs = if frameset.previous_frame() == 0 {
            Distribs::new(&self.protocol)
        } else {
            self.frames
                .get(&frameset.previous_frame())
                .map(|f| f.distribs.clone())
                .unwrap_or_else(|| Distribs::new(&self.protocol))
        };

        for handle in self.events.drain(..) {
            self.objects.remove(handle);
        }
        for i in (frameset.previous_frame() + 1)..=frameset.current_frame() {
            let count = distribs.event_count_dist().decode_and_tally(decoder)?;
            for _ in 0..count {
                let class_index = distribs.event_class_dist().decode_and_tally(decoder)?;
                #[allow(clippy::cast_possible_truncation)]
                let cl_id = ClassId::new(ClassKind::Event, class_index as u32);
                let cl = self.protocol.class(cl_id);
                let const_state = decode_and_tally_constants(&mut distribs, decoder, cl)?;
                if i > most_recent_frame {
                    let handle = self.objects.insert(RemoteObjectData {
                        class: cl_id,
                        unique_id: 0,
                        frame_added: i,
                        const_state,
                        var_state_offset: 0,
                    });
                    self.events.push(handle);
                }
            }
        }

        let old_views: Vec<RemoteObjectHandle> = if frameset.previous_frame() == 0 {
            Vec::new()
        } else {
            self.frames
                .get(&frameset.previous_frame())
                .map(|f| f.views.clone())
                .unwrap_or_default()
        };
        let mut views: Vec<Option<RemoteObjectHandle>> = old_views.iter().copied().map(Some).collect();
        let del_count = distribs.del_object_count_dist().decode_and_tally(decoder)?;
        for _ in 0..del_count {
            #[allow(clippy::cast_possible_truncation)]
            let len = views.len() as Code;
            if len == 0 {
                return Err(CodecError::BadRange);
            }
            let index = decoder.decode_uniform(len)?;
            if let Some(slot) = views.get_mut(index as usize) {
                *slot = None;
            }
        }
        for removed in old_views.iter().filter(|h| !views.contains(&Some(**h))) {
            if let Some(data) = self.objects.remove(*removed) {
                self.alloc.free(data.var_state_offset, self.protocol.class(data.class).var_slots());
            }
        }
        let mut views: Vec<RemoteObjectHandle> = views.into_iter().flatten().collect();

        let new_count = distribs.new_object_count_dist().decode_and_tally(decoder)?;
        for _ in 0..new_count {
            let class_index = distribs.object_class_dist().decode_and_tally(decoder)?;
            let unique_id = distribs.unique_id_dist().decode_and_tally(decoder)?;
            #[allow(clippy::cast_possible_truncation)]
            let cl_id = ClassId::new(ClassKind::Object, class_index as u32);
            let cl = self.protocol.class(cl_id);
            let const_state = decode_and_tally_constants(&mut distribs, decoder, cl)?;

            let handle = if let Some(&existing) = self.id_index.get(&unique_id) {
                existing
            } else {
                let var_state_offset = self.alloc.allocate(cl.var_slots());
                let handle = self.objects.insert(RemoteObjectData {
                    class: cl_id,
                    unique_id,
                    frame_added: frameset.current_frame(),
                    const_state,
                    var_state_offset,
                });
                self.id_index.insert(unique_id, handle);
                handle
            };
            views.push(handle);
        }

        let mut state = vec![0i32; self.alloc.total_capacity()];
        for &handle in &views {
            if let Some(data) = self.objects.get(handle) {
                let cl = self.protocol.class(data.class);
                frameset.decode_and_tally_object(&mut distribs, decoder, cl, data.var_state_offset, data.frame_added, &mut state)?;
                for field in cl.var_refs() {
                    let offset = data.var_state_offset + field.slot();
                    let prev_id = if data.frame_added <= frameset.previous_frame() {
                        self.frame_states.get(&frameset.previous_frame()).map_or(0, |s| s[offset])
                    } else {
                        0
                    };
                    let delta = distribs.unique_id_dist().decode_and_tally(decoder)?;
                    state[offset] = prev_id + delta;
                }
            }
        }
        self.frame_states.insert(frameset.current_frame(), state);
        self.frames.insert(frameset.current_frame(), RemoteFrame { views, distribs });

        let last_keep = frame_cutoff(frameset.current_frame(), max_frame_delta).min(frameset.earliest_frame());
        self.frames.retain(|&f, _| f >= last_keep);
        self.frame_states.retain(|&f, _| f >= last_keep);
        let objects = &self.objects;
        self.id_index.retain(|_, h| objects.get(*h).is_some());

        Ok(ConsumeOutcome::Applied)
    }

    /// Encodes an acknowledgment framelist: up to four most recently
    /// decoded frame numbers, newest first.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying encoder.
    pub fn produce_response(&self, encoder: &mut ArithmeticEncoder) -> Result<(), CodecError> {
        let frames: Vec<i32> = self.frames.keys().rev().take(MAX_ACK_FRAMES).copied().collect();
        encode_framelist(encoder, &frames, MAX_ACK_FRAMES, self.protocol.max_frame_delta())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Authority;
    use crate::peer::Peer;
    use crate::schema::ProtocolBuilder;

    fn one_var_int_protocol() -> (Rc<Protocol>, IntField) {
        let mut builder = ProtocolBuilder::new(30).object_class();
        let x = builder.var_int();
        (Rc::new(builder.build().build()), x)
    }

    #[test]
    fn replaying_the_same_update_reports_a_stale_frame() {
        let (protocol, x_field) = one_var_int_protocol();
        let mut authority = Authority::new(Rc::clone(&protocol));
        let mut peer = Peer::new(&mut authority, Rc::clone(&protocol));
        let object = authority.create_object(x_field.class()).unwrap();
        authority.set_object_visibility(peer.handle(), object, true);
        authority.publish_frame();
        let update = peer.produce_message(&mut authority).unwrap();

        let mut remote = RemoteSet::new(protocol);
        let mut decoder = ArithmeticDecoder::new(&update);
        let first = remote.consume_update(&mut decoder).unwrap();
        assert_eq!(first, ConsumeOutcome::Applied);
        assert_eq!(remote.object_count(), 1);

        let mut decoder = ArithmeticDecoder::new(&update);
        let second = remote.consume_update(&mut decoder).unwrap();
        assert_eq!(second, ConsumeOutcome::StaleFrame);
    }

    #[test]
    fn latest_frame_is_zero_before_anything_is_decoded() {
        let (protocol, _) = one_var_int_protocol();
        let remote = RemoteSet::new(protocol);
        assert_eq!(remote.latest_frame(), 0);
    }
}
