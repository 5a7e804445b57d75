//! End-to-end handshakes with the real crypto provider.

mod common;

use std::sync::Arc;
use std::time::Instant;

use dakex::crypto::rust_crypto::RustCryptoProvider;
use dakex::{Config, Initiator, InitiatorState, Responder, ResponderState};

use common::{drain, local_addr, peer_addr, pump, Event};

fn real_pair(now: Instant) -> (Initiator, Responder) {
    let config = Arc::new(Config::builder().rng_seed(42).build());

    let initiator = Initiator::new(
        config.clone(),
        Box::new(RustCryptoProvider::new(Some(1))),
        peer_addr(),
        local_addr(),
        now,
    );
    let responder = Responder::new(
        config,
        Box::new(RustCryptoProvider::new(Some(2))),
        local_addr(),
        peer_addr(),
        now,
    );

    (initiator, responder)
}

fn connected_pair(now: Instant) -> (Initiator, Responder) {
    let (mut initiator, mut responder) = real_pair(now);
    let (mut ev_i, mut ev_r) = (Vec::new(), Vec::new());

    initiator.connect(now).expect("connect");
    pump(now, &mut initiator, &mut responder, &mut ev_i, &mut ev_r);

    assert!(initiator.is_connected(), "initiator should be connected");
    assert!(responder.is_connected(), "responder should be connected");
    assert_eq!(ev_i, vec![Event::Connected]);
    assert_eq!(ev_r, vec![Event::Connected]);

    (initiator, responder)
}

#[test]
fn full_handshake_derives_matching_keys() {
    let now = Instant::now();
    let (initiator, responder) = connected_pair(now);

    let key_i = initiator.session_key().expect("initiator session key");
    let key_r = responder.session_key().expect("responder session key");
    assert_eq!(key_i, key_r, "both sides must derive the same session key");
}

#[test]
fn data_frames_flow_both_ways() {
    let now = Instant::now();
    let (mut initiator, mut responder) = connected_pair(now);
    let (mut ev_i, mut ev_r) = (Vec::new(), Vec::new());

    initiator
        .send_data(b"sensor reading 23.5C")
        .expect("initiator send");
    pump(now, &mut initiator, &mut responder, &mut ev_i, &mut ev_r);
    assert_eq!(
        ev_r,
        vec![Event::ApplicationData(b"sensor reading 23.5C".to_vec())]
    );

    responder.send_data(b"ack, next in 60s").expect("responder send");
    pump(now, &mut initiator, &mut responder, &mut ev_i, &mut ev_r);
    assert_eq!(ev_i, vec![Event::ApplicationData(b"ack, next in 60s".to_vec())]);
}

#[test]
fn send_data_requires_a_session() {
    let now = Instant::now();
    let (mut initiator, mut responder) = real_pair(now);

    assert!(initiator.send_data(b"too early").is_err());
    assert!(responder.send_data(b"too early").is_err());
}

#[test]
fn initiator_close_clears_both_sides() {
    let now = Instant::now();
    let (mut initiator, mut responder) = connected_pair(now);
    let (mut ev_i, mut ev_r) = (Vec::new(), Vec::new());

    initiator.close(now).expect("close");
    pump(now, &mut initiator, &mut responder, &mut ev_i, &mut ev_r);

    assert_eq!(ev_i, vec![Event::Disconnected]);
    assert_eq!(ev_r, vec![Event::Disconnected]);
    assert_eq!(initiator.state(), InitiatorState::Idle);
    assert_eq!(responder.state(), ResponderState::AwaitSyn);
    assert_eq!(initiator.session_key(), None);
    assert_eq!(responder.session_key(), None);
}

#[test]
fn responder_close_clears_both_sides() {
    let now = Instant::now();
    let (mut initiator, mut responder) = connected_pair(now);
    let (mut ev_i, mut ev_r) = (Vec::new(), Vec::new());

    responder.close(now).expect("close");
    pump(now, &mut initiator, &mut responder, &mut ev_i, &mut ev_r);

    assert_eq!(ev_i, vec![Event::Disconnected]);
    assert_eq!(ev_r, vec![Event::Disconnected]);
    assert_eq!(initiator.state(), InitiatorState::Idle);
    assert_eq!(responder.state(), ResponderState::AwaitSyn);
}

#[test]
fn responder_accepts_a_new_session_after_close() {
    let now = Instant::now();
    let (mut initiator, mut responder) = connected_pair(now);
    let (mut ev_i, mut ev_r) = (Vec::new(), Vec::new());

    initiator.close(now).expect("close");
    pump(now, &mut initiator, &mut responder, &mut ev_i, &mut ev_r);

    ev_i.clear();
    ev_r.clear();

    initiator.connect(now).expect("reconnect");
    pump(now, &mut initiator, &mut responder, &mut ev_i, &mut ev_r);

    assert!(initiator.is_connected());
    assert!(responder.is_connected());
    assert_eq!(initiator.session_key(), responder.session_key());
}

#[test]
fn stray_packets_before_syn_are_ignored() {
    let now = Instant::now();
    let (mut initiator, mut responder) = real_pair(now);
    let mut events = Vec::new();

    responder.handle_packet(now, b"not even a record").expect("garbage");
    responder
        .handle_packet(now, &[1, 6, 0, 2, b'h', b'i'])
        .expect("data frame before handshake");

    assert_eq!(responder.state(), ResponderState::AwaitSyn);
    assert!(drain(&mut responder, &mut events).is_empty());
    assert!(events.is_empty());

    // A real session still works afterwards.
    initiator.connect(now).expect("connect");
    let (mut ev_i, mut ev_r) = (Vec::new(), Vec::new());
    pump(now, &mut initiator, &mut responder, &mut ev_i, &mut ev_r);
    assert!(responder.is_connected());
}
