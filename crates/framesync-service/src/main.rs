// SPDX-License-Identifier: Apache-2.0
//! Headless authority host. Owns one `Authority`, accepts peers, and drives
//! `publish_frame` on a fixed tick. Real transport is out of scope: each
//! peer is connected through a pair of in-process channels instead of a
//! socket, so the tick loop below is exactly what a socket-backed front end
//! would drive once framing is added on top.

use std::env;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use framesync_core::{Authority, Peer, PeerHandle, Protocol, ProtocolBuilder, Telemetry};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Tick interval and capacity limits, read from the environment rather than
/// a file-backed store: this service has no state worth persisting between
/// runs (§6.3 of the replication protocol is explicitly out of scope for
/// this host).
#[derive(Debug, Clone, Copy)]
struct ServiceConfig {
    tick: Duration,
    max_peers: usize,
}

impl ServiceConfig {
    fn from_env() -> Self {
        let tick_ms = env::var("FRAMESYNC_TICK_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50);
        let max_peers = env::var("FRAMESYNC_MAX_PEERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(64);
        Self {
            tick: Duration::from_millis(tick_ms),
            max_peers,
        }
    }
}

/// Forwards every [`Telemetry`] hook to `tracing`, at the fixed levels
/// named in the instrumentation seam's own doc comments.
#[derive(Debug, Clone, Copy, Default)]
struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn frame_published(&self, frame: i32) {
        debug!(frame, "published frame");
    }

    fn message_produced(&self, peer: PeerHandle, bytes: usize) {
        debug!(?peer, bytes, "produced update");
    }

    fn message_consumed(&self, peer: PeerHandle, bytes: usize) {
        debug!(?peer, bytes, "consumed message");
    }

    fn packet_dropped(&self, peer: PeerHandle, reason: &'static str) {
        warn!(?peer, reason, "dropped inbound packet");
    }
}

/// A minimal protocol used to exercise the tick loop. A real deployment
/// registers its own application classes at startup the same way; this one
/// exists so the host has something to replicate without depending on a
/// concrete application crate.
fn demo_protocol() -> Protocol {
    let mut builder = ProtocolBuilder::new(30).object_class();
    let _x = builder.var_int();
    let _y = builder.var_int();
    builder.build().build()
}

/// One peer's connection: the channel pair a socket-backed front end would
/// eventually sit behind, and the mirrored [`Peer`] the authority exchanges
/// updates with.
struct PeerLink {
    peer: Peer,
    inbound: mpsc::Receiver<Vec<u8>>,
    outbound: mpsc::Sender<Vec<u8>>,
}

/// A handle a transport layer gets back from [`Service::connect_peer`]:
/// feed bytes in, read produced updates out.
struct PeerChannels {
    to_service: mpsc::Sender<Vec<u8>>,
    from_service: mpsc::Receiver<Vec<u8>>,
}

struct Service {
    authority: Authority,
    protocol: Rc<Protocol>,
    config: ServiceConfig,
    links: Vec<PeerLink>,
}

impl Service {
    fn new(config: ServiceConfig) -> Self {
        let protocol = Rc::new(demo_protocol());
        let authority = Authority::with_telemetry(Rc::clone(&protocol), Box::new(TracingTelemetry));
        Self {
            authority,
            protocol,
            config,
            links: Vec::new(),
        }
    }

    fn connect_peer(&mut self) -> Option<PeerChannels> {
        if self.links.len() >= self.config.max_peers {
            warn!(max_peers = self.config.max_peers, "refusing peer, at capacity");
            return None;
        }
        let peer = Peer::new(&mut self.authority, Rc::clone(&self.protocol));
        let (to_service_tx, to_service_rx) = mpsc::channel(64);
        let (from_service_tx, from_service_rx) = mpsc::channel(64);
        info!(?peer, "peer connected");
        self.links.push(PeerLink {
            peer,
            inbound: to_service_rx,
            outbound: from_service_tx,
        });
        Some(PeerChannels {
            to_service: to_service_tx,
            from_service: from_service_rx,
        })
    }

    /// Drains every pending inbound message, publishes one frame, then
    /// produces and sends an update to every connected peer.
    async fn tick(&mut self) {
        for link in &mut self.links {
            while let Ok(message) = link.inbound.try_recv() {
                if let Err(err) = link.peer.consume_message(&mut self.authority, &message) {
                    warn!(?err, peer = ?link.peer.handle(), "failed to decode inbound message");
                }
            }
        }

        self.authority.publish_frame();

        for link in &mut self.links {
            match link.peer.produce_message(&mut self.authority) {
                Ok(bytes) => {
                    if link.outbound.try_send(bytes).is_err() {
                        warn!(peer = ?link.peer.handle(), "outbound channel full, dropping update");
                    }
                }
                Err(err) => warn!(?err, peer = ?link.peer.handle(), "failed to produce update"),
            }
        }
    }

    async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = ServiceConfig::from_env();
    info!(?config, "starting framesync service");
    Service::new(config).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_receives_an_update_after_one_tick() {
        let mut service = Service::new(ServiceConfig {
            tick: Duration::from_millis(10),
            max_peers: 8,
        });
        let mut channels = service.connect_peer().expect("room for one peer");

        service.tick().await;

        let update = channels.from_service.try_recv().expect("an update was produced");
        assert!(!update.is_empty());
        assert!(channels.to_service.try_send(Vec::new()).is_ok());
    }

    #[tokio::test]
    async fn capacity_limit_refuses_further_peers() {
        let mut service = Service::new(ServiceConfig {
            tick: Duration::from_millis(10),
            max_peers: 1,
        });
        assert!(service.connect_peer().is_some());
        assert!(service.connect_peer().is_none());
    }
}
