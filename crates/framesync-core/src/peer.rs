// SPDX-License-Identifier: Apache-2.0
//! One connection to a remote counterpart: a registration with the
//! authority's local set plus this side's mirrored view of what the
//! counterpart publishes. Framing matches the authority's side exactly — a
//! single arithmetic-coded stream carrying the ack framelist first, then the
//! update, so both directions of one logical exchange share one byte buffer.

use std::rc::Rc;

use crate::authority::{Authority, ObjectHandle, PeerHandle};
use crate::bitstream::{ArithmeticDecoder, ArithmeticEncoder, CodecError};
use crate::remote_set::{RemoteObjectHandle, RemoteSet};
use crate::schema::{Protocol, RefField};

/// A reference field resolved to whichever side actually owns the target:
/// an object this peer mirrors from its counterpart, or one of this side's
/// own objects the counterpart referenced back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    /// An object owned by the local [`Authority`].
    Local(ObjectHandle),
    /// An object mirrored into this peer's [`RemoteSet`].
    Remote(RemoteObjectHandle),
}

/// One registered connection: an authority-side [`PeerHandle`] paired with
/// this side's decoded mirror of the counterpart. Owned by the embedder,
/// not the authority, since only the embedder knows which transport
/// connects the two sides.
pub struct Peer {
    handle: PeerHandle,
    remote: RemoteSet,
}

impl Peer {
    /// Registers a new peer with `authority` and creates an empty mirror
    /// for its counterpart.
    #[must_use]
    pub fn new(authority: &mut Authority, protocol: Rc<Protocol>) -> Self {
        Self {
            handle: authority.create_peer(),
            remote: RemoteSet::new(protocol),
        }
    }

    /// This peer's registration with its authority.
    #[must_use]
    pub const fn handle(&self) -> PeerHandle {
        self.handle
    }

    /// This side's mirrored replica of the counterpart's published state.
    #[must_use]
    pub const fn remote(&self) -> &RemoteSet {
        &self.remote
    }

    /// Unregisters this peer from `authority`. After this, `authority`
    /// silently ignores any further dispatch naming this peer's handle.
    pub fn disconnect(self, authority: &mut Authority) {
        authority.remove_peer(self.handle);
    }

    /// Produces one message for this peer: this side's acknowledgment of
    /// what it has decoded so far, followed by the authority's update for
    /// it.
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying encoder.
    pub fn produce_message(&mut self, authority: &mut Authority) -> Result<Vec<u8>, CodecError> {
        let mut encoder = ArithmeticEncoder::new();
        self.remote.produce_response(&mut encoder)?;
        authority.produce_update(self.handle, &mut encoder)?;
        Ok(encoder.finish())
    }

    /// Consumes one message from this peer: this side's acknowledgment of
    /// the authority's prior updates, followed by the counterpart's update
    /// to mirror into this side's [`RemoteSet`].
    ///
    /// # Errors
    ///
    /// Propagates [`CodecError::BadRange`] from the underlying decoder.
    pub fn consume_message(&mut self, authority: &mut Authority, data: &[u8]) -> Result<(), CodecError> {
        let mut decoder = ArithmeticDecoder::new(data);
        authority.consume_response(self.handle, &mut decoder)?;
        let outcome = self.remote.consume_update(&mut decoder)?;
        authority.report_consume(self.handle, data.len(), outcome);
        Ok(())
    }

    /// Resolves a reference field on a mirrored object to whichever side
    /// owns its target, following the wire id's sign: positive names
    /// another mirrored object, negative names one of `authority`'s own
    /// objects that the counterpart referenced back.
    #[must_use]
    pub fn resolve_ref(&self, authority: &Authority, object: RemoteObjectHandle, field: RefField) -> Option<ObjectRef> {
        let id = self.remote.raw_ref(object, field);
        if id > 0 {
            self.remote.object_from_unique_id(id).map(ObjectRef::Remote)
        } else if id < 0 {
            authority.object_from_unique_id(self.handle, -id).map(ObjectRef::Local)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer").field("handle", &self.handle).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProtocolBuilder;

    #[test]
    fn resolve_ref_is_none_for_a_null_reference() {
        let mut builder = ProtocolBuilder::new(30).object_class();
        let link = builder.reference();
        let protocol = Rc::new(builder.build().build());
        let class = link.class();

        let mut authority = Authority::new(Rc::clone(&protocol));
        let mut peer = Peer::new(&mut authority, Rc::clone(&protocol));
        let object = authority.create_object(class).unwrap();
        authority.set_object_visibility(peer.handle(), object, true);
        authority.publish_frame();
        let update = peer.produce_message(&mut authority).unwrap();

        let mut remote_authority = Authority::new(Rc::clone(&protocol));
        let mut remote_peer = Peer::new(&mut remote_authority, protocol);
        remote_peer.consume_message(&mut remote_authority, &update).unwrap();

        let mirrored = remote_peer.remote().object_at(0).unwrap();
        assert_eq!(remote_peer.resolve_ref(&remote_authority, mirrored, link), None);
    }
}
