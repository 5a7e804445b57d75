//! Per-session handshake bookkeeping shared by both endpoint roles.

use zeroize::Zeroize;

use crate::nonce::Nonce;
use crate::timing::RoundTrip;

/// Nonces, the sequence counter and timing markers for one session.
///
/// `nonce_a` is the initiator-originated freshness token, `nonce_b` the
/// responder-originated one. The sequence counter seeds nonce derivation and
/// is never reused within a session; it is reseeded randomly when a session
/// opens so nonces are not reused across sessions either.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub nonce_a: Nonce,
    pub nonce_b: Nonce,
    pub sequence: u64,
    pub timing: RoundTrip,
}

impl Session {
    /// Wipe all per-session values.
    pub fn reset(&mut self) {
        self.nonce_a.zeroize();
        self.nonce_b.zeroize();
        self.sequence = 0;
        self.timing.reset();
    }
}
