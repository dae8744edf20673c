// SPDX-License-Identifier: Apache-2.0
//! The authority: owns every object, event, and peer, and is the only
//! place new state is written. Everything a peer sends is a delta against
//! what the authority publishes here.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::arena::Arena;
use crate::bitstream::{ArithmeticDecoder, ArithmeticEncoder, CodecError};
use crate::local_set::LocalSet;
use crate::remote_set::ConsumeOutcome;
use crate::schema::{ClassId, ClassKind, IntField, Protocol, RefField, SchemaError};
use crate::telemetry::{NullTelemetry, Telemetry};

/// Marker type distinguishing [`ObjectHandle`]s from other arena handles.
#[derive(Debug)]
pub struct ObjectSlot;
/// Marker type distinguishing [`EventHandle`]s from other arena handles.
#[derive(Debug)]
pub struct EventSlot;
/// Marker type distinguishing [`PeerHandle`]s from other arena handles.
#[derive(Debug)]
pub struct PeerSlot;

/// Identifies one persistent object owned by an [`Authority`].
pub type ObjectHandle = crate::arena::Handle<ObjectSlot>;
/// Identifies one one-frame event owned by an [`Authority`].
pub type EventHandle = crate::arena::Handle<EventSlot>;
/// Identifies one peer registered with an [`Authority`].
pub type PeerHandle = crate::arena::Handle<PeerSlot>;

pub(crate) struct ObjectData {
    pub(crate) class: ClassId,
    pub(crate) const_state: Vec<i32>,
    pub(crate) var_state_offset: usize,
    is_published: bool,
}

pub(crate) struct EventData {
    pub(crate) class: ClassId,
    pub(crate) const_state: Vec<i32>,
    is_published: bool,
}

/// Encodes a reference value into the raw `i32` slot a ref field occupies in
/// the flat state buffer: `0` for "no reference", else `1 + index`.
///
/// The original reinterprets a raw 8-byte object pointer into the 4-byte
/// slot a ref field reserves (`NCint`'s constructor sizes every field,
/// including refs, as `sizeof(int32_t)`), which is only safe on a 32-bit
/// build. Storing a plain arena index instead keeps the slot width honest
/// while preserving the same "equality after a destroy invalidates the
/// reference" semantics, because every removal purges matching references
/// first (see [`Authority::purge_references_to_object`]).
pub(crate) fn ref_to_raw(handle: Option<ObjectHandle>) -> i32 {
    handle.map_or(0, |h| i32::try_from(h.index() + 1).unwrap_or(0))
}

/// Inverse of [`ref_to_raw`].
pub(crate) fn raw_to_handle(objects: &Arena<ObjectSlot, ObjectData>, raw: i32) -> Option<ObjectHandle> {
    if raw == 0 {
        return None;
    }
    let index = usize::try_from(raw - 1).ok()?;
    objects.handle_at(index)
}

/// Owns every object, event, and peer in one replicated world, and is the
/// sole place that writes new state. Publishing a frame snapshots the
/// current state so peers can delta-compress updates against it.
pub struct Authority {
    protocol: Rc<Protocol>,
    alloc: crate::alloc::RangeAllocator,
    objects: Arena<ObjectSlot, ObjectData>,
    events: Arena<EventSlot, EventData>,
    pending_events: Vec<EventHandle>,
    state: Vec<i32>,
    frame: i32,
    frame_states: BTreeMap<i32, Vec<i32>>,
    event_history: BTreeMap<i32, Vec<EventHandle>>,
    peers: Arena<PeerSlot, LocalSet>,
    telemetry: Box<dyn Telemetry>,
}

impl Authority {
    /// Creates an authority for `protocol`, with no objects, events, or
    /// peers and no published frames yet.
    #[must_use]
    pub fn new(protocol: Rc<Protocol>) -> Self {
        Self::with_telemetry(protocol, Box::new(NullTelemetry))
    }

    /// Creates an authority reporting to `telemetry` instead of the silent
    /// default.
    #[must_use]
    pub fn with_telemetry(protocol: Rc<Protocol>, telemetry: Box<dyn Telemetry>) -> Self {
        Self {
            protocol,
            alloc: crate::alloc::RangeAllocator::new(),
            objects: Arena::new(),
            events: Arena::new(),
            pending_events: Vec::new(),
            state: Vec::new(),
            frame: 0,
            frame_states: BTreeMap::new(),
            event_history: BTreeMap::new(),
            peers: Arena::new(),
            telemetry,
        }
    }

    /// The protocol this authority replicates.
    #[must_use]
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// The most recently published frame number (`0` before the first
    /// publish).
    #[must_use]
    pub const fn current_frame(&self) -> i32 {
        self.frame
    }

    /// The retained state snapshot for `frame`, if still within the
    /// retention window.
    #[must_use]
    pub fn frame_state(&self, frame: i32) -> Option<&[i32]> {
        self.frame_states.get(&frame).map(Vec::as_slice)
    }

    /// Registers a new peer with an empty local set.
    pub fn create_peer(&mut self) -> PeerHandle {
        self.peers.insert(LocalSet::new())
    }

    /// Unregisters `peer`; subsequent dispatch calls naming it are no-ops.
    pub fn remove_peer(&mut self, peer: PeerHandle) {
        self.peers.remove(peer);
    }

    /// Creates a new persistent object of `class`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::ForeignClass`] if `class` is an event class.
    pub fn create_object(&mut self, class: ClassId) -> Result<ObjectHandle, SchemaError> {
        if class.kind() != ClassKind::Object {
            return Err(SchemaError::ForeignClass);
        }
        let def = self.protocol.class(class);
        let var_state_offset = self.alloc.allocate(def.var_slots());
        if self.alloc.total_capacity() > self.state.len() {
            self.state.resize(self.alloc.total_capacity(), 0);
        }
        let const_state = vec![0i32; def.const_slots()];
        Ok(self.objects.insert(ObjectData {
            class,
            const_state,
            var_state_offset,
            is_published: false,
        }))
    }

    /// Creates a new one-frame event of `class`, visible starting with the
    /// next [`Self::publish_frame`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::ForeignClass`] if `class` is an object class.
    pub fn create_event(&mut self, class: ClassId) -> Result<EventHandle, SchemaError> {
        if class.kind() != ClassKind::Event {
            return Err(SchemaError::ForeignClass);
        }
        let def = self.protocol.class(class);
        let const_state = vec![0i32; def.const_slots()];
        let handle = self.events.insert(EventData {
            class,
            const_state,
            is_published: false,
        });
        self.pending_events.push(handle);
        Ok(handle)
    }

    /// The class `object` was created with, or `None` if the handle is
    /// stale.
    #[must_use]
    pub fn object_class(&self, object: ObjectHandle) -> Option<ClassId> {
        self.objects.get(object).map(|data| data.class)
    }

    /// Reads an integer field. Returns `0` for a stale handle or a field
    /// declared on a different class than `object`'s.
    #[must_use]
    pub fn get_int(&self, object: ObjectHandle, field: IntField) -> i32 {
        let Some(data) = self.objects.get(object) else {
            return 0;
        };
        if field.class() != data.class {
            return 0;
        }
        if field.is_const() {
            data.const_state[field.slot()]
        } else {
            self.state[data.var_state_offset + field.slot()]
        }
    }

    /// Reads a reference field. Returns `None` for a stale handle, a field
    /// declared on a different class, or a null reference.
    #[must_use]
    pub fn get_ref(&self, object: ObjectHandle, field: RefField) -> Option<ObjectHandle> {
        let data = self.objects.get(object)?;
        if field.class() != data.class {
            return None;
        }
        let raw = self.state[data.var_state_offset + field.slot()];
        raw_to_handle(&self.objects, raw)
    }

    /// Sets an integer field. A no-op for a stale handle, a foreign field,
    /// or setting a constant field after `object` has been published once.
    pub fn set_int(&mut self, object: ObjectHandle, field: IntField, value: i32) {
        let Some(data) = self.objects.get_mut(object) else {
            return;
        };
        if field.class() != data.class {
            return;
        }
        if field.is_const() {
            if !data.is_published {
                data.const_state[field.slot()] = value;
            }
        } else {
            self.state[data.var_state_offset + field.slot()] = value;
        }
    }

    /// Sets a reference field. A no-op for a stale handle or a foreign
    /// field.
    pub fn set_ref(&mut self, object: ObjectHandle, field: RefField, value: Option<ObjectHandle>) {
        let Some(data) = self.objects.get(object) else {
            return;
        };
        if field.class() != data.class {
            return;
        }
        let offset = data.var_state_offset + field.slot();
        self.state[offset] = ref_to_raw(value);
    }

    /// Sets a constant integer field on an event. A no-op for a stale
    /// handle, a foreign field, or once the event has been published.
    pub fn set_event_int(&mut self, event: EventHandle, field: IntField, value: i32) {
        let Some(data) = self.events.get_mut(event) else {
            return;
        };
        if field.class() != data.class || !field.is_const() || data.is_published {
            return;
        }
        data.const_state[field.slot()] = value;
    }

    /// Reads a constant integer field from an event. Returns `0` for a
    /// stale handle or a foreign field.
    #[must_use]
    pub fn get_event_int(&self, event: EventHandle, field: IntField) -> i32 {
        let Some(data) = self.events.get(event) else {
            return 0;
        };
        if field.class() != data.class {
            return 0;
        }
        data.const_state[field.slot()]
    }

    /// Marks `object` visible (or not) to `peer` starting with the next
    /// publish. A no-op if `peer` is unregistered.
    pub fn set_object_visibility(&mut self, peer: PeerHandle, object: ObjectHandle, visible: bool) {
        if let Some(local) = self.peers.get_mut(peer) {
            local.set_object_visibility(object, visible);
        }
    }

    /// Marks `event` visible (or not) to `peer`. A no-op if `peer` is
    /// unregistered or `event` has already been published (events cannot
    /// change visibility retroactively).
    pub fn set_event_visibility(&mut self, peer: PeerHandle, event: EventHandle, visible: bool) {
        let is_published = self.events.get(event).map_or(true, |data| data.is_published);
        if let Some(local) = self.peers.get_mut(peer) {
            local.set_event_visibility(event, visible, is_published);
        }
    }

    /// Destroys `object`: purges every reference to it, frees its variable
    /// state, hides it from every peer, and invalidates its handle. A
    /// no-op if `object` is already stale.
    pub fn destroy_object(&mut self, object: ObjectHandle) {
        let Some(data) = self.objects.get(object) else {
            return;
        };
        let class = data.class;
        let var_state_offset = data.var_state_offset;
        self.purge_references_to_object(object);
        let var_slots = self.protocol.class(class).var_slots();
        self.alloc.free(var_state_offset, var_slots);
        for (_, local) in self.peers.iter_mut() {
            local.set_object_visibility(object, false);
        }
        self.objects.remove(object);
    }

    /// Destroys `event`. A no-op if `event` is stale or already published
    /// (a published event's history entry is immutable).
    pub fn destroy_event(&mut self, event: EventHandle) {
        let Some(data) = self.events.get(event) else {
            return;
        };
        if data.is_published {
            return;
        }
        for (_, local) in self.peers.iter_mut() {
            local.set_event_visibility(event, false, false);
        }
        self.events.remove(event);
        self.pending_events.retain(|&h| h != event);
    }

    fn purge_references_to_object(&mut self, object: ObjectHandle) {
        let target_raw = ref_to_raw(Some(object));
        let protocol = &self.protocol;
        let state = &mut self.state;
        for (_, data) in self.objects.iter_mut() {
            for field in protocol.class(data.class).var_refs() {
                let offset = data.var_state_offset + field.slot();
                if state[offset] == target_raw {
                    state[offset] = 0;
                }
            }
        }
    }

    /// Looks up the object a peer's local set assigned `id` to, or `None`
    /// if `peer` is unregistered or no record matches. Used to resolve a
    /// negative reference id decoded from that peer's mirrored view back to
    /// one of this authority's own objects.
    #[must_use]
    pub fn object_from_unique_id(&self, peer: PeerHandle, id: i32) -> Option<ObjectHandle> {
        self.peers.get(peer)?.object_from_unique_id(id)
    }

    /// Advances to the next frame: snapshots the current state, hands every
    /// pending event to history, fans visibility changes and retirement out
    /// to every peer, and prunes state older than every peer's
    /// acknowledgment plus the protocol's delta horizon.
    pub fn publish_frame(&mut self) {
        self.frame += 1;
        for (_, data) in self.objects.iter_mut() {
            data.is_published = true;
        }
        self.frame_states.insert(self.frame, self.state.clone());
        for handle in &self.pending_events {
            if let Some(data) = self.events.get_mut(*handle) {
                data.is_published = true;
            }
        }
        self.event_history
            .insert(self.frame, std::mem::take(&mut self.pending_events));

        let max_frame_delta = self.protocol.max_frame_delta();
        let mut oldest_ack = i32::MAX;
        for (_, local) in self.peers.iter_mut() {
            local.on_publish_frame(self.frame, max_frame_delta);
            oldest_ack = oldest_ack.min(local.oldest_ack_frame());
        }
        let last_keep = crate::frameset::frame_cutoff(self.frame, max_frame_delta).min(oldest_ack);

        self.frame_states.retain(|&f, _| f >= last_keep);
        let expired: Vec<i32> = self
            .event_history
            .range(..last_keep)
            .map(|(&f, _)| f)
            .collect();
        for f in expired {
            let Some(handles) = self.event_history.remove(&f) else {
                continue;
            };
            for handle in handles {
                for (_, local) in self.peers.iter_mut() {
                    local.purge_event(handle);
                }
                self.events.remove(handle);
            }
        }

        self.telemetry.frame_published(self.frame);
    }

    /// Encodes an update for `peer` into `encoder`: the peer's acked
    /// baselines, every newly visible event, object creations and
    /// deletions, and every live object's field deltas. A no-op if `peer`
    /// is unregistered.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying encoder.
    pub fn produce_update(&mut self, peer: PeerHandle, encoder: &mut ArithmeticEncoder) -> Result<(), CodecError> {
        let Self {
            peers,
            frame,
            frame_states,
            event_history,
            objects,
            events,
            protocol,
            telemetry,
            ..
        } = self;
        let Some(local) = peers.get_mut(peer) else {
            return Ok(());
        };
        let before = encoder.len();
        local.produce_update(encoder, *frame, protocol, frame_states, event_history, objects, events)?;
        telemetry.message_produced(peer, encoder.len() - before);
        Ok(())
    }

    /// Decodes `peer`'s acknowledgment framelist from `decoder`. A no-op if
    /// `peer` is unregistered.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying decoder.
    pub fn consume_response(&mut self, peer: PeerHandle, decoder: &mut ArithmeticDecoder<'_>) -> Result<(), CodecError> {
        let max_frame_delta = self.protocol.max_frame_delta();
        if let Some(local) = self.peers.get_mut(peer) {
            local.consume_response(decoder, max_frame_delta)?;
        }
        Ok(())
    }

    pub(crate) fn report_consume(&self, peer: PeerHandle, bytes: usize, outcome: ConsumeOutcome) {
        match outcome {
            ConsumeOutcome::Applied => self.telemetry.message_consumed(peer, bytes),
            ConsumeOutcome::StaleFrame => self.telemetry.packet_dropped(peer, "stale_frame"),
            ConsumeOutcome::MissingBaseline => self.telemetry.packet_dropped(peer, "missing_baseline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProtocolBuilder;

    fn one_ref_protocol() -> (Rc<Protocol>, RefField) {
        let mut builder = ProtocolBuilder::new(30).object_class();
        let link = builder.reference();
        (Rc::new(builder.build().build()), link)
    }

    #[test]
    fn create_object_rejects_an_event_class() {
        let mut builder = ProtocolBuilder::new(30).event_class();
        let _ = builder.const_int();
        let protocol = Rc::new(builder.build().build());
        let mut authority = Authority::new(protocol);
        let event_class_id = ClassId::new(ClassKind::Event, 0);
        assert_eq!(authority.create_object(event_class_id), Err(SchemaError::ForeignClass));
    }

    #[test]
    fn destroying_a_target_nulls_every_reference_to_it() {
        let (protocol, link) = one_ref_protocol();
        let mut authority = Authority::new(protocol);
        let class = link.class();
        let a = authority.create_object(class).unwrap();
        let b = authority.create_object(class).unwrap();
        authority.set_ref(a, link, Some(b));
        assert_eq!(authority.get_ref(a, link), Some(b));

        authority.destroy_object(b);
        assert_eq!(authority.get_ref(a, link), None);
    }

    #[test]
    fn stale_handle_reads_return_defaults() {
        let (protocol, link) = one_ref_protocol();
        let mut authority = Authority::new(protocol);
        let class = link.class();
        let a = authority.create_object(class).unwrap();
        authority.destroy_object(a);
        assert_eq!(authority.object_class(a), None);
        assert_eq!(authority.get_ref(a, link), None);
    }

    #[test]
    fn ref_to_raw_and_raw_to_handle_round_trip() {
        let (protocol, link) = one_ref_protocol();
        let mut authority = Authority::new(protocol);
        let class = link.class();
        let object = authority.create_object(class).unwrap();
        let raw = ref_to_raw(Some(object));
        assert_eq!(raw_to_handle(&authority.objects, raw), Some(object));
        assert_eq!(ref_to_raw(None), 0);
        assert_eq!(raw_to_handle(&authority.objects, 0), None);
    }
}
