//! Local events queued by the state machines for delivery via `poll_output`.

use crate::Output;

/// Events queued by a state machine for the application.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LocalEvent {
    /// The handshake completed and a session key is established.
    Connected,
    /// A decrypted application frame.
    ApplicationData(Vec<u8>),
    /// The session terminated and all key material was cleared.
    Disconnected,
}

impl LocalEvent {
    pub(crate) fn into_output<'a>(self) -> Output<'a> {
        match self {
            LocalEvent::Connected => Output::Connected,
            LocalEvent::ApplicationData(data) => Output::ApplicationData(data),
            LocalEvent::Disconnected => Output::Disconnected,
        }
    }
}
