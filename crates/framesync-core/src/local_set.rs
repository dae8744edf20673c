// SPDX-License-Identifier: Apache-2.0
//! A peer's view of what the authority shows it: which objects and events
//! are currently visible, and the per-frame probability models used to
//! encode updates sent to that peer.

use std::collections::{BTreeMap, HashSet};

use crate::arena::Arena;
use crate::authority::{raw_to_handle, EventData, EventHandle, EventSlot, ObjectData, ObjectHandle, ObjectSlot};
use crate::bitstream::{ArithmeticDecoder, ArithmeticEncoder, Code, CodecError};
use crate::distribs::{encode_and_tally_constants, Distribs};
use crate::frameset::{decode_framelist, encode_framelist, frame_cutoff, Frameset};
use crate::schema::Protocol;
use crate::{MAX_ACK_FRAMES, MAX_UPDATE_FRAMES};

#[derive(Debug, Clone, Copy)]
struct Record {
    object: ObjectHandle,
    unique_id: i32,
    frame_added: i32,
    frame_removed: i32,
}

impl Record {
    fn is_live(self, frame: i32) -> bool {
        self.frame_added <= frame && frame < self.frame_removed
    }
}

/// One peer's visibility roster, pending visibility changes, and the
/// per-frame [`Distribs`] used to code updates for it. Lives inside the
/// authority, keyed by [`crate::authority::PeerHandle`] — see
/// [`crate::peer::Peer`] for the counterpart that decodes this peer's
/// replies.
#[derive(Debug)]
pub struct LocalSet {
    records: Vec<Record>,
    visible_events: HashSet<EventHandle>,
    vis_changes: Vec<(ObjectHandle, bool)>,
    frame_distribs: BTreeMap<i32, Distribs>,
    ack_frames: Vec<i32>,
    next_id: i32,
}

impl Default for LocalSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSet {
    /// Creates an empty local set with no visible objects or events.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            visible_events: HashSet::new(),
            vis_changes: Vec::new(),
            frame_distribs: BTreeMap::new(),
            ack_frames: Vec::new(),
            next_id: 1,
        }
    }

    pub(crate) fn oldest_ack_frame(&self) -> i32 {
        self.ack_frames.last().copied().unwrap_or(0)
    }

    /// Queues `object` to become visible (or not) starting with the next
    /// publish.
    pub(crate) fn set_object_visibility(&mut self, object: ObjectHandle, visible: bool) {
        self.vis_changes.push((object, visible));
    }

    /// Sets whether `event` is sent to this peer. A no-op once `event` has
    /// been published (an event's visibility is fixed at publish time).
    pub(crate) fn set_event_visibility(&mut self, event: EventHandle, visible: bool, is_published: bool) {
        if is_published {
            return;
        }
        if visible {
            self.visible_events.insert(event);
        } else {
            self.visible_events.remove(&event);
        }
    }

    pub(crate) fn purge_event(&mut self, event: EventHandle) {
        self.visible_events.remove(&event);
    }

    /// The object this peer's record named `id`, if one is live.
    pub(crate) fn object_from_unique_id(&self, id: i32) -> Option<ObjectHandle> {
        self.records.iter().find(|r| r.unique_id == id).map(|r| r.object)
    }

    fn get_net_id(&self, object: Option<ObjectHandle>, frame: i32) -> i32 {
        let Some(object) = object else { return 0 };
        self.records
            .iter()
            .find(|r| r.object == object && r.is_live(frame))
            .map_or(0, |r| r.unique_id)
    }

    /// Applies queued visibility changes, opens or closes the matching
    /// record, and retires records and per-frame distributions that have
    /// fallen outside both this peer's acknowledgment and the protocol's
    /// delta horizon.
    pub(crate) fn on_publish_frame(&mut self, frame: i32, max_frame_delta: u32) {
        for (object, visible) in std::mem::take(&mut self.vis_changes) {
            let currently_live = self.records.iter().any(|r| r.object == object && r.is_live(frame));
            if currently_live == visible {
                continue;
            }
            if visible {
                self.records.push(Record {
                    object,
                    unique_id: self.next_id,
                    frame_added: frame,
                    frame_removed: i32::MAX,
                });
                self.next_id += 1;
            } else if let Some(record) = self
                .records
                .iter_mut()
                .find(|r| r.object == object && r.is_live(frame))
            {
                record.frame_removed = frame;
            }
        }

        let oldest_ack = self.oldest_ack_frame();
        let cutoff = frame_cutoff(frame, max_frame_delta);
        let floor = cutoff.min(oldest_ack);
        self.records.retain(|r| r.frame_removed >= oldest_ack && r.frame_removed >= cutoff);
        self.frame_distribs.retain(|&f, _| f >= floor);
    }

    /// Encodes one update for this peer: the framelist it should
    /// acknowledge, events published since the last baseline, object
    /// creations and deletions, and every live object's field deltas.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying encoder.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn produce_update(
        &mut self,
        encoder: &mut ArithmeticEncoder,
        frame: i32,
        protocol: &Protocol,
        frame_states: &BTreeMap<i32, Vec<i32>>,
        event_history: &BTreeMap<i32, Vec<EventHandle>>,
        objects: &Arena<ObjectSlot, ObjectData>,
        events: &Arena<EventSlot, EventData>,
    ) -> Result<(), CodecError> {
        let max_frame_delta = protocol.max_frame_delta();
        let cutoff = frame_cutoff(frame, max_frame_delta);

        let mut frame_list = vec![frame];
        frame_list.extend(self.ack_frames.iter().copied().filter(|&f| f >= cutoff));
        frame_list.truncate(MAX_UPDATE_FRAMES);
        encode_framelist(encoder, &frame_list, MAX_UPDATE_FRAMES, max_frame_delta)?;

        let frameset = Frameset::new(&frame_list, frame_states);
        let mut distribs = self.baseline_distribs(frameset.previous_frame(), protocol);

        for i in (frameset.previous_frame() + 1)..=frameset.current_frame() {
            let send_events: Vec<EventHandle> = event_history
                .get(&i)
                .into_iter()
                .flatten()
                .copied()
                .filter(|h| self.visible_events.contains(h))
                .collect();
            #[allow(clippy::cast_possible_truncation)]
            distribs
                .event_count_dist()
                .encode_and_tally(encoder, send_events.len() as i32)?;
            for handle in send_events {
                if let Some(data) = events.get(handle) {
                    distribs
                        .event_class_dist()
                        .encode_and_tally(encoder, data.class.index() as usize)?;
                    encode_and_tally_constants(&mut distribs, encoder, protocol.class(data.class), &data.const_state)?;
                }
            }
        }

        let mut deleted_indices: Vec<Code> = Vec::new();
        let mut new_records: Vec<Record> = Vec::new();
        let mut num_prev_objects: Code = 0;
        for record in &self.records {
            if record.is_live(frameset.previous_frame()) {
                if !record.is_live(frameset.current_frame()) {
                    deleted_indices.push(num_prev_objects);
                }
                num_prev_objects += 1;
            } else if record.is_live(frameset.current_frame()) {
                new_records.push(*record);
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        distribs
            .del_object_count_dist()
            .encode_and_tally(encoder, deleted_indices.len() as i32)?;
        for index in deleted_indices {
            encoder.encode_uniform(index, num_prev_objects)?;
        }

        #[allow(clippy::cast_possible_truncation)]
        distribs
            .new_object_count_dist()
            .encode_and_tally(encoder, new_records.len() as i32)?;
        for record in &new_records {
            if let Some(data) = objects.get(record.object) {
                distribs
                    .object_class_dist()
                    .encode_and_tally(encoder, data.class.index() as usize)?;
                distribs.unique_id_dist().encode_and_tally(encoder, record.unique_id)?;
                encode_and_tally_constants(&mut distribs, encoder, protocol.class(data.class), &data.const_state)?;
            }
        }

        let current_state = frame_states.get(&frameset.current_frame());
        let prev_state = frame_states.get(&frameset.previous_frame());
        if let Some(state) = current_state {
            for record in &self.records {
                if !record.is_live(frameset.current_frame()) {
                    continue;
                }
                let Some(data) = objects.get(record.object) else {
                    continue;
                };
                let cl = protocol.class(data.class);
                frameset.encode_and_tally_object(&mut distribs, encoder, cl, data.var_state_offset, record.frame_added, state)?;

                for field in cl.var_refs() {
                    let offset = data.var_state_offset + field.slot();
                    let value = Self::ref_handle_at(objects, state, offset);
                    let prev_value = if record.is_live(frameset.previous_frame()) {
                        prev_state.and_then(|s| Self::ref_handle_at(objects, s, offset))
                    } else {
                        None
                    };
                    let id = self.get_net_id(value, frameset.current_frame());
                    let prev_id = self.get_net_id(prev_value, frameset.previous_frame());
                    distribs.unique_id_dist().encode_and_tally(encoder, id - prev_id)?;
                }
            }
        }

        self.frame_distribs.insert(frameset.current_frame(), distribs);
        Ok(())
    }

    fn ref_handle_at(objects: &Arena<ObjectSlot, ObjectData>, state: &[i32], offset: usize) -> Option<ObjectHandle> {
        raw_to_handle(objects, state[offset])
    }

    fn baseline_distribs(&self, previous_frame: i32, protocol: &Protocol) -> Distribs {
        if previous_frame == 0 {
            return Distribs::new(protocol);
        }
        self.frame_distribs
            .get(&previous_frame)
            .cloned()
            .unwrap_or_else(|| Distribs::new(protocol))
    }

    /// Decodes this peer's acknowledgment framelist, adopting it only if it
    /// names a more recent current frame than the one already on record.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying decoder.
    pub(crate) fn consume_response(&mut self, decoder: &mut ArithmeticDecoder<'_>, max_frame_delta: u32) -> Result<(), CodecError> {
        let frames = decode_framelist(decoder, MAX_ACK_FRAMES, max_frame_delta)?;
        if frames.is_empty() {
            return Ok(());
        }
        if self.ack_frames.first().is_none_or(|&f| f < frames[0]) {
            self.ack_frames = frames;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_open_and_close_with_visibility() {
        let mut set = LocalSet::new();
        let mut objects: Arena<ObjectSlot, i32> = Arena::new();
        let handle = objects.insert(0);
        set.set_object_visibility(handle, true);
        set.on_publish_frame(1, 30);
        assert_eq!(set.records.len(), 1);
        assert!(set.records[0].is_live(1));

        set.set_object_visibility(handle, false);
        set.on_publish_frame(2, 30);
        assert!(!set.records[0].is_live(2));
    }

    #[test]
    fn get_net_id_is_zero_for_unknown_objects() {
        let set = LocalSet::new();
        assert_eq!(set.get_net_id(None, 1), 0);
    }
}
