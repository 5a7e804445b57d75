//! Shared helpers: a deterministic stub crypto provider and packet pumps.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dakex::crypto::{CryptoProvider, DhParams, RsaKey, RsaKeyPair, DIGEST_LEN};
use dakex::{Config, Error, Initiator, Output, Responder};

/// Transparent crypto for protocol tests: digests are XOR folds, "RSA" adds
/// the key exponent to each byte, the frame cipher XORs with the session
/// key. Every operation is trivially invertible by the test itself.
pub struct StubProvider {
    next_key: u64,
    next_exponent: u64,
}

impl StubProvider {
    /// `first_key` keeps the two endpoints' keypairs distinct.
    pub fn new(first_key: u64) -> Self {
        StubProvider {
            next_key: first_key,
            next_exponent: 2,
        }
    }
}

impl CryptoProvider for StubProvider {
    fn generate_keypair(&mut self) -> RsaKeyPair {
        self.next_key += 7;
        let k = self.next_key;
        RsaKeyPair {
            public: RsaKey {
                exponent: k,
                modulus: 0,
            },
            private: RsaKey {
                exponent: k,
                modulus: 0,
            },
        }
    }

    fn rsa_encrypt(&self, data: &[u8], key: &RsaKey) -> Vec<u64> {
        stub_encrypt(data, key.exponent)
    }

    fn rsa_decrypt(&self, data: &[u64], key: &RsaKey) -> Result<Vec<u8>, Error> {
        stub_decrypt(data, key.exponent)
    }

    fn digest(&self, data: &[u8]) -> [u8; DIGEST_LEN] {
        stub_digest(data)
    }

    fn generate_dh_params(&mut self) -> DhParams {
        DhParams {
            base: 7,
            modulus: 1_000_003,
        }
    }

    fn generate_dh_exponent(&mut self) -> u64 {
        self.next_exponent += 1;
        self.next_exponent
    }

    fn mod_pow(&self, base: u64, exponent: u64, modulus: u64) -> u64 {
        if modulus == 0 {
            return 0;
        }
        // Multiplication commutes, which is all the key agreement needs.
        (base % modulus).wrapping_mul(exponent) % modulus
    }

    fn data_encrypt(&self, session_key: u64, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(plaintext.iter().map(|b| b ^ session_key as u8).collect())
    }

    fn data_decrypt(&self, session_key: u64, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(ciphertext.iter().map(|b| b ^ session_key as u8).collect())
    }
}

pub fn stub_digest(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut out = [0; DIGEST_LEN];
    for (i, b) in data.iter().enumerate() {
        out[i % DIGEST_LEN] ^= b;
    }
    out
}

pub fn stub_encrypt(data: &[u8], key_exponent: u64) -> Vec<u64> {
    data.iter().map(|b| *b as u64 + key_exponent).collect()
}

pub fn stub_decrypt(data: &[u64], key_exponent: u64) -> Result<Vec<u8>, Error> {
    data.iter()
        .map(|v| {
            v.checked_sub(key_exponent)
                .and_then(|m| u8::try_from(m).ok())
                .ok_or_else(|| Error::CryptoError("stub value out of range".into()))
        })
        .collect()
}

/// Sign the way the stub provider does: fold-digest then add the exponent.
pub fn stub_sign(body: &[u8], key_exponent: u64) -> Vec<u64> {
    stub_encrypt(&stub_digest(body), key_exponent)
}

pub fn local_addr() -> SocketAddr {
    "10.0.0.1:4433".parse().unwrap()
}

pub fn peer_addr() -> SocketAddr {
    "10.0.0.2:5544".parse().unwrap()
}

pub fn test_config() -> Arc<Config> {
    Arc::new(Config::builder().rng_seed(42).build())
}

/// A stub-backed endpoint pair.
pub fn stub_pair(now: Instant) -> (Initiator, Responder) {
    let config = test_config();

    let initiator = Initiator::new(
        config.clone(),
        Box::new(StubProvider::new(100)),
        peer_addr(),
        local_addr(),
        now,
    );
    let responder = Responder::new(
        config,
        Box::new(StubProvider::new(200)),
        local_addr(),
        peer_addr(),
        now,
    );

    (initiator, responder)
}

/// Non-borrowing mirror of [`Output`] for collecting events.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    Connected,
    ApplicationData(Vec<u8>),
    Disconnected,
}

/// Either endpoint role, for the packet pumps below.
pub trait Endpoint {
    fn poll(&mut self) -> Output;
    fn packet(&mut self, now: Instant, packet: &[u8]) -> Result<(), Error>;
}

impl Endpoint for Initiator {
    fn poll(&mut self) -> Output {
        self.poll_output()
    }
    fn packet(&mut self, now: Instant, packet: &[u8]) -> Result<(), Error> {
        self.handle_packet(now, packet)
    }
}

impl Endpoint for Responder {
    fn poll(&mut self) -> Output {
        self.poll_output()
    }
    fn packet(&mut self, now: Instant, packet: &[u8]) -> Result<(), Error> {
        self.handle_packet(now, packet)
    }
}

/// Drain all pending packets, collecting events on the side.
pub fn drain(endpoint: &mut impl Endpoint, events: &mut Vec<Event>) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    loop {
        match endpoint.poll() {
            Output::Packet(p) => packets.push(p.to_vec()),
            Output::Timeout(_) => break,
            Output::Connected => events.push(Event::Connected),
            Output::ApplicationData(data) => events.push(Event::ApplicationData(data)),
            Output::Disconnected => events.push(Event::Disconnected),
        }
    }
    packets
}

/// Shuttle packets between the two endpoints until both go quiet.
pub fn pump(
    now: Instant,
    initiator: &mut Initiator,
    responder: &mut Responder,
    initiator_events: &mut Vec<Event>,
    responder_events: &mut Vec<Event>,
) {
    loop {
        let to_responder = drain(initiator, initiator_events);
        for p in &to_responder {
            responder.packet(now, p).expect("responder packet");
        }

        let to_initiator = drain(responder, responder_events);
        for p in &to_initiator {
            initiator.packet(now, p).expect("initiator packet");
        }

        if to_responder.is_empty() && to_initiator.is_empty() {
            break;
        }
    }
}
