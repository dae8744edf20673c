// SPDX-License-Identifier: Apache-2.0
//! Thin client-side helper around a [`Peer`]. Transport is intentionally
//! abstract: see [`tool::FramesyncPort`] for the channel-backed adapter a
//! tool plugs in instead of a real socket.

pub mod tool;

use std::rc::Rc;

use anyhow::Result;
use framesync_core::{Authority, ObjectRef, Peer, PeerHandle, Protocol, RefField, RemoteObjectHandle, RemoteSet};

/// Owns the client-side half of a replication session: a [`Peer`] mirroring
/// the counterpart's authority, plus the otherwise-empty [`Authority`] a
/// `Peer` needs to exist (this side never creates its own objects — it is
/// a pure mirror of whatever the server publishes).
pub struct FramesyncClient {
    authority: Authority,
    peer: Peer,
}

impl FramesyncClient {
    /// Creates a client with its own empty authority, registered as a peer
    /// of that authority purely so [`Peer`]'s API has somewhere to write.
    #[must_use]
    pub fn new(protocol: Rc<Protocol>) -> Self {
        let mut authority = Authority::new(Rc::clone(&protocol));
        let peer = Peer::new(&mut authority, protocol);
        Self { authority, peer }
    }

    /// This client's peer handle on its own (otherwise unused) authority.
    #[must_use]
    pub fn handle(&self) -> PeerHandle {
        self.peer.handle()
    }

    /// The mirrored replica decoded from the counterpart so far.
    #[must_use]
    pub fn remote(&self) -> &RemoteSet {
        self.peer.remote()
    }

    /// Encodes one outbound message: this side's acknowledgment framelist
    /// followed by its own (empty) update.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying arithmetic coder's preconditions
    /// are violated, which should not happen through this API.
    pub fn produce_message(&mut self) -> Result<Vec<u8>> {
        Ok(self.peer.produce_message(&mut self.authority)?)
    }

    /// Decodes one inbound message from the counterpart.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a validly framed message.
    pub fn consume_message(&mut self, data: &[u8]) -> Result<()> {
        self.peer.consume_message(&mut self.authority, data)?;
        Ok(())
    }

    /// Resolves a mirrored reference field to whichever side actually owns
    /// the object it names.
    #[must_use]
    pub fn resolve_ref(&self, object: RemoteObjectHandle, field: RefField) -> Option<ObjectRef> {
        self.peer.resolve_ref(&self.authority, object, field)
    }
}
