use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the handshake drivers.
///
/// Handshake validation failures are resolved internally into restart
/// transitions; handlers use these variants to tell the dispatcher which
/// class of failure they hit, and the dispatcher logs them. `handle_packet`
/// itself only returns the ambient variants (queue overflow, API misuse).
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),

    #[error("hash validation failed")]
    HashValidationFailed,

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("challenge answer rejected")]
    ChallengeAnswerRejected,

    #[error("freshness budget exceeded: elapsed {elapsed:?} > limit {limit:?}")]
    FreshnessBudgetExceeded { elapsed: Duration, limit: Duration },

    #[error("unsupported challenge operator 0x{0:02x}")]
    UnsupportedChallengeOperator(u8),

    #[error("crypto error: {0}")]
    CryptoError(String),

    #[error("transmit queue full")]
    TransmitQueueFull,

    #[error("no established session key")]
    NotConnected,
}

impl Error {
    /// Whether this failure is resolved by a state transition rather than
    /// bubbled to the caller.
    pub(crate) fn is_protocol_failure(&self) -> bool {
        !matches!(self, Error::TransmitQueueFull | Error::NotConnected)
    }
}
