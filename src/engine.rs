use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::crypto::{CryptoProvider, RsaKey};
use crate::event::LocalEvent;
use crate::rng::SeededRng;
use crate::{Config, Error, Output};

/// Plumbing in common between the two endpoint roles: outgoing packet and
/// event queues, the crypto provider and the signed-hash helpers.
pub(crate) struct Engine {
    config: Arc<Config>,

    /// Provider of all cryptographic operations.
    provider: Box<dyn CryptoProvider>,

    /// Non-key randomness (sequence seeding, challenge operands).
    rng: SeededRng,

    /// Spare datagram buffers, recycled so a long-lived session does not
    /// allocate per packet.
    buffers_free: Vec<Vec<u8>>,

    /// Queue of outgoing packets.
    queue_tx: VecDeque<Vec<u8>>,

    /// Queue of events for the application.
    queue_events: VecDeque<LocalEvent>,

    /// Holder of last packet. To be able to return a reference.
    last_packet: Option<Vec<u8>>,
}

impl Engine {
    pub fn new(config: Arc<Config>, provider: Box<dyn CryptoProvider>) -> Self {
        let rng = SeededRng::new(config.rng_seed());

        Engine {
            config,
            provider,
            rng,
            buffers_free: Vec::new(),
            queue_tx: VecDeque::new(),
            queue_events: VecDeque::new(),
            last_packet: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &dyn CryptoProvider {
        &*self.provider
    }

    pub fn provider_mut(&mut self) -> &mut dyn CryptoProvider {
        &mut *self.provider
    }

    pub fn rng_mut(&mut self) -> &mut SeededRng {
        &mut self.rng
    }

    /// Serialize one outgoing datagram via the callback and queue it.
    pub fn send(&mut self, f: impl FnOnce(&mut Vec<u8>)) -> Result<(), Error> {
        if self.queue_tx.len() >= self.config.max_queue_tx() {
            return Err(Error::TransmitQueueFull);
        }

        let mut datagram = self.buffers_free.pop().unwrap_or_default();
        f(&mut datagram);
        self.queue_tx.push_back(datagram);

        Ok(())
    }

    pub fn push_event(&mut self, event: LocalEvent) {
        self.queue_events.push_back(event);
    }

    fn poll_packet_tx(&mut self) -> Option<&[u8]> {
        // If there is a previous packet, return it to the pool.
        if let Some(mut last) = self.last_packet.take() {
            last.clear();
            self.buffers_free.push(last);
        }

        let datagram = self.queue_tx.pop_front()?;
        Some(self.last_packet.insert(datagram).as_slice())
    }

    /// Next thing the application should act on: an event, a packet to
    /// transmit, or the deadline to call `handle_timeout` at.
    pub fn poll_output(&mut self, deadline: Instant) -> Output {
        if let Some(event) = self.queue_events.pop_front() {
            return event.into_output();
        }

        if let Some(packet) = self.poll_packet_tx() {
            return Output::Packet(packet);
        }

        Output::Timeout(deadline)
    }

    /// Encrypt an application payload and hex-encode it for the wire.
    pub fn encrypt_frame(&self, session_key: u64, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let ciphertext = self.provider.data_encrypt(session_key, plaintext)?;
        Ok(hex::encode(ciphertext).into_bytes())
    }

    /// Hex-decode and decrypt an application payload.
    pub fn decrypt_frame(&self, session_key: u64, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let ciphertext =
            hex::decode(payload).map_err(|_| Error::MalformedMessage("frame payload is not hex"))?;
        self.provider.data_decrypt(session_key, &ciphertext)
    }

    /// Digest the body and encrypt the digest under the given (private) key.
    pub fn sign(&self, body: &[u8], key: &RsaKey) -> Vec<u64> {
        let digest = self.provider.digest(body);
        self.provider.rsa_encrypt(&digest, key)
    }

    /// Recompute the body digest locally and compare it against the
    /// decrypted signed hash. Nothing is trusted without this.
    pub fn verify(&self, body: &[u8], encrypted_hash: &[u64], key: &RsaKey) -> Result<(), Error> {
        let decrypted = self
            .provider
            .rsa_decrypt(encrypted_hash, key)
            .map_err(|_| Error::HashValidationFailed)?;

        let expected = self.provider.digest(body);

        if decrypted.as_slice() == expected.as_slice() {
            Ok(())
        } else {
            Err(Error::HashValidationFailed)
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("queue_tx", &self.queue_tx.len())
            .field("queue_events", &self.queue_events.len())
            .finish()
    }
}
