//! Per-session key material.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::challenge::Challenge;
use crate::crypto::{RsaKey, RsaKeyPair};

/// The private Diffie-Hellman contribution of this endpoint.
#[derive(Debug, Clone, Copy, Default, Zeroize)]
pub(crate) struct DhSecret {
    pub base: u64,
    pub modulus: u64,
    pub exponent: u64,
}

/// Everything key-shaped a session owns.
///
/// The keypair and own challenge are regenerated once per authentication
/// phase; the session key is computed exactly once per successful
/// key-agreement phase and stays immutable until the session resets.
/// Clearing zeroizes all of it, as does dropping the session.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub(crate) struct KeyMaterial {
    /// Our RSA keypair for this session.
    pub local: Option<RsaKeyPair>,

    /// The peer's public key, learned from its authentication package.
    pub peer: Option<RsaKey>,

    /// The challenge we issued; the peer must answer this one.
    pub local_challenge: Option<Challenge>,

    /// The challenge the peer issued to us.
    pub peer_challenge: Option<Challenge>,

    /// Our private Diffie-Hellman contribution.
    pub dh: Option<DhSecret>,

    /// The derived symmetric session key.
    pub session_key: Option<u64>,
}

impl KeyMaterial {
    /// Zeroize and forget everything.
    pub fn clear(&mut self) {
        self.zeroize();
        self.local = None;
        self.peer = None;
        self.local_challenge = None;
        self.peer_challenge = None;
        self.dh = None;
        self.session_key = None;
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("authenticated", &self.peer.is_some())
            .field("session_key", &self.session_key.is_some())
            .finish()
    }
}
