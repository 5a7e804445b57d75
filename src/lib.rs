//! Mutual-authentication and key-agreement handshake for datagram
//! transports.
//!
//! A sans-IO implementation of a challenge-response handshake for
//! constrained endpoints: RSA-authenticated packages bound to freshness
//! nonces, a Diffie-Hellman exchange layered underneath the authenticated
//! channel, elapsed-time burst detection, and an encrypted data-transfer
//! phase with a graceful two-message close.
//!
//! The crate owns no sockets and no clock. Feed inbound datagrams to
//! [`Responder::handle_packet`] / [`Initiator::handle_packet`], drain
//! [`Output`] via `poll_output`, and call `handle_timeout` when the returned
//! deadline passes.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

use std::time::Instant;

pub mod challenge;
mod clock;
mod config;
pub mod crypto;
mod engine;
mod error;
mod event;
mod initiator;
mod keys;
pub mod message;
pub mod nonce;
mod responder;
mod rng;
mod session;
mod timing;

pub use config::{Config, ConfigBuilder};
pub use error::Error;
pub use initiator::{Initiator, InitiatorState};
pub use responder::{Responder, ResponderState};
pub use rng::SeededRng;
pub use timing::RoundTrip;

/// Output from polling a handshake driver.
#[derive(Debug, PartialEq, Eq)]
pub enum Output<'a> {
    /// A datagram to transmit to the peer.
    Packet(&'a [u8]),

    /// When to call `handle_timeout` if nothing else happens.
    Timeout(Instant),

    /// The handshake completed; a session key is established.
    Connected,

    /// A decrypted application frame.
    ApplicationData(Vec<u8>),

    /// The session terminated; all session and key state was cleared.
    Disconnected,
}
