// SPDX-License-Identifier: Apache-2.0
//! Exercises the full produce/consume loop without a real transport: a
//! tiny in-process "server" authority publishes a moving object, a
//! `FramesyncClient` mirrors it over a channel pair, and each tick logs
//! what the mirror sees.

use std::rc::Rc;
use std::sync::mpsc;

use anyhow::Result;
use framesync_client::tool::{pump, ChannelPort};
use framesync_client::FramesyncClient;
use framesync_core::{Authority, Peer, ProtocolBuilder};
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut builder = ProtocolBuilder::new(30).object_class();
    let x_field = builder.var_int();
    let protocol = Rc::new(builder.build().build());
    let class = x_field.class();

    let mut server = Authority::new(Rc::clone(&protocol));
    let mut server_peer = Peer::new(&mut server, Rc::clone(&protocol));
    let object = server.create_object(class)?;
    server.set_object_visibility(server_peer.handle(), object, true);

    let (to_client_tx, to_client_rx) = mpsc::channel::<Vec<u8>>();
    let (to_server_tx, to_server_rx) = mpsc::channel::<Vec<u8>>();
    let client_port = ChannelPort::new(to_server_tx, to_client_rx);
    let mut client = FramesyncClient::new(Rc::clone(&protocol));

    for tick in 0..10 {
        server.set_int(object, x_field, tick);
        server.publish_frame();

        let update = server_peer.produce_message(&mut server)?;
        to_client_tx.send(update).ok();
        if let Ok(ack) = to_server_rx.try_recv() {
            server_peer.consume_message(&mut server, &ack)?;
        }

        pump(&mut client, &client_port)?;

        if let Some(mirrored) = client.remote().object_at(0) {
            info!(tick, x = client.remote().get_int(mirrored, x_field), "mirrored state");
        }
    }

    Ok(())
}
