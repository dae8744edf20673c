// SPDX-License-Identifier: Apache-2.0
//! End-to-end replication scenarios, driven entirely through the public API.

use std::rc::Rc;

use framesync_core::{Authority, Peer, Protocol, ProtocolBuilder};

fn two_var_int_protocol() -> (Rc<Protocol>, framesync_core::IntField, framesync_core::IntField) {
    let mut builder = ProtocolBuilder::new(30).object_class();
    let x = builder.var_int();
    let y = builder.var_int();
    let protocol = builder.build().build();
    (Rc::new(protocol), x, y)
}

#[test]
fn fifty_objects_replicate_with_matching_positions() {
    let (protocol, x_field, y_field) = two_var_int_protocol();
    let class = x_field.class();

    let mut authority = Authority::new(Rc::clone(&protocol));
    let mut peer = Peer::new(&mut authority, Rc::clone(&protocol));

    let mut rng_state = 0x2545_f491_4f6c_dd1du64;
    let mut next = || {
        rng_state ^= rng_state << 13;
        rng_state ^= rng_state >> 7;
        rng_state ^= rng_state << 17;
        (rng_state % 2000) as i32 - 1000
    };

    let mut expected = Vec::with_capacity(50);
    for _ in 0..50 {
        let object = authority.create_object(class).unwrap();
        let (px, py) = (next(), next());
        authority.set_int(object, x_field, px);
        authority.set_int(object, y_field, py);
        authority.set_object_visibility(peer.handle(), object, true);
        expected.push((px, py));
    }
    authority.publish_frame();

    let message = peer.produce_message(&mut authority).unwrap();

    let mut remote_authority = Authority::new(Rc::clone(&protocol));
    let mut remote_peer = Peer::new(&mut remote_authority, Rc::clone(&protocol));
    remote_peer.consume_message(&mut remote_authority, &message).unwrap();

    assert_eq!(remote_peer.remote().object_count(), 50);
    let mut seen: Vec<(i32, i32)> = (0..50)
        .map(|i| {
            let handle = remote_peer.remote().object_at(i).unwrap();
            (
                remote_peer.remote().get_int(handle, x_field),
                remote_peer.remote().get_int(handle, y_field),
            )
        })
        .collect();
    seen.sort_unstable();
    let mut expected_sorted = expected;
    expected_sorted.sort_unstable();
    assert_eq!(seen, expected_sorted);
}

#[test]
fn state_catches_up_within_the_delta_horizon_despite_dropped_messages() {
    let (protocol, x_field, y_field) = two_var_int_protocol();
    let class = x_field.class();

    let mut server = Authority::new(Rc::clone(&protocol));
    let mut peer_server = Peer::new(&mut server, Rc::clone(&protocol));
    let object = server.create_object(class).unwrap();
    server.set_object_visibility(peer_server.handle(), object, true);

    let mut client = Authority::new(Rc::clone(&protocol));
    let mut peer_client = Peer::new(&mut client, Rc::clone(&protocol));

    for frame in 1..=200i32 {
        server.set_int(object, x_field, frame);
        server.set_int(object, y_field, frame * 2);
        server.publish_frame();

        let update = peer_server.produce_message(&mut server).unwrap();
        if frame % 3 != 0 {
            peer_client.consume_message(&mut client, &update).unwrap();
        }

        let ack = peer_client.produce_message(&mut client).unwrap();
        if frame % 5 != 0 {
            peer_server.consume_message(&mut server, &ack).unwrap();
        }
    }

    assert!(peer_client.remote().latest_frame() >= server.current_frame() - 30);
    let mirrored = peer_client.remote().object_at(0).unwrap();
    let caught_up_frame = peer_client.remote().latest_frame();
    assert_eq!(peer_client.remote().get_int(mirrored, x_field), caught_up_frame);
    assert_eq!(peer_client.remote().get_int(mirrored, y_field), caught_up_frame * 2);
}

#[test]
fn event_visible_to_one_peer_vanishes_from_both_on_the_next_frame() {
    let mut builder = ProtocolBuilder::new(30).event_class();
    let payload = builder.const_int();
    let protocol = Rc::new(builder.build().build());

    let mut authority = Authority::new(Rc::clone(&protocol));
    let mut peer_a = Peer::new(&mut authority, Rc::clone(&protocol));
    let mut peer_b = Peer::new(&mut authority, Rc::clone(&protocol));

    let event = authority.create_event(payload.class()).unwrap();
    authority.set_event_int(event, payload, 7);
    authority.set_event_visibility(peer_a.handle(), event, true);
    authority.publish_frame();

    let msg_a1 = peer_a.produce_message(&mut authority).unwrap();
    let msg_b1 = peer_b.produce_message(&mut authority).unwrap();

    let mut remote_a_authority = Authority::new(Rc::clone(&protocol));
    let mut remote_peer_a = Peer::new(&mut remote_a_authority, Rc::clone(&protocol));
    remote_peer_a.consume_message(&mut remote_a_authority, &msg_a1).unwrap();

    let mut remote_b_authority = Authority::new(Rc::clone(&protocol));
    let mut remote_peer_b = Peer::new(&mut remote_b_authority, Rc::clone(&protocol));
    remote_peer_b.consume_message(&mut remote_b_authority, &msg_b1).unwrap();

    assert_eq!(remote_peer_a.remote().object_count(), 1);
    let mirrored_event = remote_peer_a.remote().object_at(0).unwrap();
    assert_eq!(remote_peer_a.remote().get_int(mirrored_event, payload), 7);
    assert_eq!(remote_peer_b.remote().object_count(), 0);

    authority.publish_frame();
    let msg_a2 = peer_a.produce_message(&mut authority).unwrap();
    remote_peer_a.consume_message(&mut remote_a_authority, &msg_a2).unwrap();
    assert_eq!(remote_peer_a.remote().object_count(), 0);
}

#[test]
fn destroying_a_referenced_object_nulls_the_reference_on_peers() {
    let mut builder = ProtocolBuilder::new(30).object_class();
    let link = builder.reference();
    let protocol = Rc::new(builder.build().build());
    let class = link.class();

    let mut authority = Authority::new(Rc::clone(&protocol));
    let mut peer = Peer::new(&mut authority, Rc::clone(&protocol));

    let a = authority.create_object(class).unwrap();
    let b = authority.create_object(class).unwrap();
    authority.set_ref(a, link, Some(b));
    authority.set_object_visibility(peer.handle(), a, true);
    authority.set_object_visibility(peer.handle(), b, true);
    authority.publish_frame();
    let first = peer.produce_message(&mut authority).unwrap();

    authority.destroy_object(b);
    authority.publish_frame();
    let second = peer.produce_message(&mut authority).unwrap();

    let mut remote_authority = Authority::new(Rc::clone(&protocol));
    let mut remote_peer = Peer::new(&mut remote_authority, Rc::clone(&protocol));
    remote_peer.consume_message(&mut remote_authority, &first).unwrap();

    let before = remote_peer.remote().object_count();
    assert_eq!(before, 2);
    let mirrored_a_before = (0..before)
        .map(|i| remote_peer.remote().object_at(i).unwrap())
        .find(|&h| remote_peer.resolve_ref(&remote_authority, h, link).is_some())
        .expect("one mirrored object holds the reference before destroy");

    remote_peer.consume_message(&mut remote_authority, &second).unwrap();
    assert_eq!(remote_peer.remote().object_count(), 1);
    assert_eq!(
        remote_peer.resolve_ref(&remote_authority, mirrored_a_before, link),
        None,
        "reference must be nulled once its target is destroyed"
    );
}
