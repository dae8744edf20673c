// SPDX-License-Identifier: Apache-2.0
//! Transport-agnostic port a [`crate::FramesyncClient`] pumps messages
//! through, plus a channel-backed implementation for in-process use (tests,
//! the bundled example, or any host that hands out `mpsc` pairs instead of
//! a socket).

use std::sync::mpsc::{Receiver, Sender, TryRecvError};

use anyhow::{anyhow, Result};

use crate::FramesyncClient;

/// Abstract byte transport: a tool implements this once and the replication
/// logic in [`crate::FramesyncClient`] never needs to know whether it's a
/// socket, a channel, or something else entirely.
pub trait FramesyncPort {
    /// Sends one outbound message. Errors if the transport is gone.
    fn send(&self, message: Vec<u8>) -> Result<()>;
    /// Non-blockingly takes the next inbound message, if any is queued.
    fn try_recv(&self) -> Option<Vec<u8>>;
}

/// A [`FramesyncPort`] backed by a plain `std::sync::mpsc` channel pair.
pub struct ChannelPort {
    outbound: Sender<Vec<u8>>,
    inbound: Receiver<Vec<u8>>,
}

impl ChannelPort {
    /// Wraps an existing channel pair as a port.
    #[must_use]
    pub fn new(outbound: Sender<Vec<u8>>, inbound: Receiver<Vec<u8>>) -> Self {
        Self { outbound, inbound }
    }
}

impl FramesyncPort for ChannelPort {
    fn send(&self, message: Vec<u8>) -> Result<()> {
        self.outbound.send(message).map_err(|_| anyhow!("framesync port disconnected"))
    }

    fn try_recv(&self) -> Option<Vec<u8>> {
        match self.inbound.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Drains every message currently queued on `port` into `client`, then
/// produces and sends one outbound message. The pump step a tool calls once
/// per its own tick.
///
/// # Errors
///
/// Returns an error if a queued message fails to decode, or if producing or
/// sending the outbound message fails.
pub fn pump(client: &mut FramesyncClient, port: &impl FramesyncPort) -> Result<()> {
    while let Some(message) = port.try_recv() {
        client.consume_message(&message)?;
    }
    let outbound = client.produce_message()?;
    port.send(outbound)
}
