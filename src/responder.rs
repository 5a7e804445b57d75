// Handshake flow, responder side:
//
// 1. Initiator sends a Syn carrying its freshness token (nonce A)
// 2. Responder answers Ack{nonceA, nonceB} and starts the round-trip timer
// 3. Initiator sends its signed authentication package (public key +
//    challenge); responder validates the hash and nonce B
// 4. Responder generates a fresh keypair and challenge, answers the
//    initiator's challenge and sends its own signed package
// 5. Initiator answers the responder's challenge in a second signed package;
//    responder checks the elapsed-time budget first, then hash, nonce B and
//    the challenge answer
// 6. Responder opens the Diffie-Hellman exchange, RSA-encrypted under the
//    initiator's public key; the initiator replies in kind and both sides
//    derive the session key
// 7. Responder signs an acknowledgement token; encrypted data frames flow
// 8. Either side closes with DONE / DONE_ACK
//
// Every validation failure restarts the protocol rather than continuing with
// unverified state. Failures after the peer is authenticated request an
// explicit termination first.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::challenge::Challenge;
use crate::crypto::CryptoProvider;
use crate::engine::Engine;
use crate::event::LocalEvent;
use crate::keys::{DhSecret, KeyMaterial};
use crate::message::{
    Ack, DataFrame, DhAck, DhEnvelope, DhExchange, DhPackage, Record, RsaExchange, RsaPackage,
    DONE_ACK_MESSAGE, DONE_MESSAGE, SYN_MARKER,
};
use crate::nonce::{Nonce, NonceGenerator};
use crate::session::Session;
use crate::timing::hint_to_duration;
use crate::{Config, Error, Output};

/// The endpoint that owns the well-known port and drives the handshake in
/// response to an initiator.
pub struct Responder {
    engine: Engine,
    session: Session,
    keys: KeyMaterial,
    nonce_gen: NonceGenerator,
    state: ResponderState,
    deadline: Instant,
}

/// Current state of the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    /// Await a session-open request.
    AwaitSyn,

    /// Send the session-open acknowledgement.
    SendAck,

    /// Await the initiator's authentication package.
    AwaitRsa,

    /// Send our authentication package.
    SendRsa,

    /// Await the initiator's answer to our challenge.
    AwaitRsaAck,

    /// Open the key agreement.
    SendDh,

    /// Await the initiator's key-agreement reply.
    AwaitDh,

    /// Acknowledge the derived session key.
    SendDhAck,

    /// Send and receive encrypted data.
    DataTransfer,

    /// Request termination.
    SendDone,

    /// Await the acknowledgement of our termination request.
    AwaitDoneAck,

    /// Acknowledge the peer's termination request.
    SendDoneAck,
}

impl Responder {
    /// Create a new responder session for one peer address.
    ///
    /// Multi-peer servers hold one `Responder` per peer; instances share
    /// nothing.
    pub fn new(
        config: Arc<Config>,
        provider: Box<dyn CryptoProvider>,
        local: SocketAddr,
        peer: SocketAddr,
        now: Instant,
    ) -> Responder {
        let deadline = now + config.receive_timeout();

        Responder {
            engine: Engine::new(config, provider),
            session: Session::default(),
            keys: KeyMaterial::default(),
            nonce_gen: NonceGenerator::new(local, peer),
            state: ResponderState::AwaitSyn,
            deadline,
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> ResponderState {
        self.state
    }

    /// Whether a session key is established and data frames flow.
    pub fn is_connected(&self) -> bool {
        self.state == ResponderState::DataTransfer
    }

    /// The derived session key, once the key agreement has completed.
    pub fn session_key(&self) -> Option<u64> {
        self.keys.session_key
    }

    /// Feed one inbound datagram into the state machine.
    pub fn handle_packet(&mut self, now: Instant, packet: &[u8]) -> Result<(), Error> {
        self.deadline = now + self.engine.config().receive_timeout();

        let record = match Record::parse(packet) {
            Ok(record) => record,
            Err(e) => {
                debug!("Dropping datagram: {}", e);
                return Ok(());
            }
        };

        self.dispatch(now, record)?;
        self.drive_send(now)
    }

    /// Poll for the next packet, event or timeout deadline.
    pub fn poll_output(&mut self) -> Output {
        self.engine.poll_output(self.deadline)
    }

    /// Drive the receive deadline. Past the deadline, any state with a
    /// pending peer obligation restarts.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        if now < self.deadline {
            return Ok(());
        }
        self.deadline = now + self.engine.config().receive_timeout();

        match self.state {
            // Nothing is owed to us here; stay put.
            ResponderState::AwaitSyn | ResponderState::DataTransfer => {}
            ResponderState::AwaitDoneAck => {
                warn!("Termination acknowledgement never arrived");
                self.engine.push_event(LocalEvent::Disconnected);
                self.reset("termination timed out");
            }
            state => {
                warn!("Receive timeout in {:?}", state);
                self.reset("peer went quiet mid-handshake");
            }
        }

        Ok(())
    }

    /// Encrypt and queue an application frame.
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.state != ResponderState::DataTransfer {
            return Err(Error::NotConnected);
        }
        let key = self.keys.session_key.ok_or(Error::NotConnected)?;

        let payload = self.engine.encrypt_frame(key, data)?;
        let frame = DataFrame::new(&payload);
        self.engine.send(|out| frame.serialize(out))
    }

    /// Begin the graceful-termination sub-protocol.
    pub fn close(&mut self, now: Instant) -> Result<(), Error> {
        if self.state == ResponderState::AwaitSyn {
            return Ok(());
        }

        self.deadline = now + self.engine.config().receive_timeout();
        self.state = ResponderState::SendDone;
        self.drive_send(now)
    }

    fn dispatch(&mut self, now: Instant, record: Record) -> Result<(), Error> {
        match (self.state, record) {
            (ResponderState::AwaitSyn, Record::Syn(syn)) => self.on_syn(syn),
            (ResponderState::AwaitRsa, Record::RsaExchange(exchange)) => {
                self.on_rsa(now, exchange)
            }
            (ResponderState::AwaitRsaAck, Record::RsaExchange(exchange)) => {
                self.on_rsa_ack(now, exchange)
            }
            (ResponderState::AwaitDh, Record::DhEnvelope(envelope)) => self.on_dh(now, envelope),
            (ResponderState::DataTransfer, Record::Data(frame)) => self.on_frame(frame),
            (ResponderState::AwaitDoneAck, Record::Data(frame)) => self.on_done_ack(frame),
            (state, _) => {
                debug!("Dropping unexpected record in {:?}", state);
            }
        }

        Ok(())
    }

    /// Run the send-states until the machine settles in a receive state, so
    /// each inbound datagram yields at most one outbound datagram.
    fn drive_send(&mut self, now: Instant) -> Result<(), Error> {
        loop {
            let prev = self.state;

            let step = match self.state {
                ResponderState::SendAck => self.send_ack(now),
                ResponderState::SendRsa => self.send_rsa(now),
                ResponderState::SendDh => self.send_dh(now),
                ResponderState::SendDhAck => self.send_dh_ack(),
                ResponderState::SendDone => self.send_done(),
                ResponderState::SendDoneAck => self.send_done_ack(),
                _ => Ok(()),
            };

            if let Err(e) = step {
                if !e.is_protocol_failure() {
                    return Err(e);
                }
                warn!("Handshake step failed: {}", e);
                self.reset("send step failed");
            }

            if self.state == prev {
                break;
            }
        }

        Ok(())
    }

    fn on_syn(&mut self, syn: crate::message::Syn) {
        if syn.tag != SYN_MARKER {
            debug!("Dropping session-open request with bad marker");
            return;
        }

        self.session.nonce_a = syn.nonce;
        self.state = ResponderState::SendAck;
    }

    fn send_ack(&mut self, now: Instant) -> Result<(), Error> {
        // Fresh random seed per session; nonces never repeat across sessions.
        self.session.sequence = self.engine.rng_mut().random();
        self.session.nonce_b = self.generate_nonce(now);
        self.session.timing.start_network(now);

        let ack = Ack::new(self.session.nonce_a, self.session.nonce_b);
        self.engine.send(|out| ack.serialize(out))?;

        debug!("Ack sent, awaiting authentication package");
        self.state = ResponderState::AwaitRsa;
        Ok(())
    }

    fn on_rsa(&mut self, now: Instant, exchange: RsaExchange) {
        self.session
            .timing
            .stop_network(now, hint_to_duration(exchange.processing_hint));

        match self.check_rsa(&exchange) {
            Ok(()) => self.state = ResponderState::SendRsa,
            Err(e) => {
                warn!("Authentication package rejected: {}", e);
                self.reset("authentication failed");
            }
        }
    }

    fn check_rsa(&mut self, exchange: &RsaExchange) -> Result<(), Error> {
        // Trust-on-first-use: the signed hash is checked against the key the
        // package itself carries.
        let peer_key = exchange.package.public_key;

        let mut body = Vec::new();
        exchange.package.serialize(&mut body);
        self.engine.verify(&body, &exchange.encrypted_hash, &peer_key)?;

        if exchange.package.nonce_b != self.session.nonce_b {
            return Err(Error::NonceMismatch);
        }

        self.keys.peer = Some(peer_key);
        self.keys.peer_challenge = Some(exchange.package.challenge);
        self.session.nonce_a = exchange.package.nonce_a;

        Ok(())
    }

    fn send_rsa(&mut self, now: Instant) -> Result<(), Error> {
        self.session.timing.start_processing(now);

        let (Some(peer_key), Some(peer_challenge)) = (self.keys.peer, self.keys.peer_challenge)
        else {
            return Err(Error::CryptoError("peer key material missing".into()));
        };

        // Answer the peer's challenge; the input is the challenge issuer's
        // public exponent.
        let answer = peer_challenge.apply(peer_key.exponent)?;

        let pair = self.engine.provider_mut().generate_keypair();
        let challenge = Challenge::generate(self.engine.rng_mut());
        self.keys.local = Some(pair);
        self.keys.local_challenge = Some(challenge);

        self.session.nonce_b = self.generate_nonce(now);

        let package = RsaPackage {
            public_key: pair.public,
            challenge,
            answer,
            nonce_a: self.session.nonce_a,
            nonce_b: self.session.nonce_b,
        };

        let mut body = Vec::new();
        package.serialize(&mut body);
        let encrypted_hash = self.engine.sign(&body, &pair.private);

        self.session.timing.stop_processing(now);

        let exchange = RsaExchange {
            package,
            encrypted_hash,
            processing_hint: self.session.timing.processing().as_secs_f64(),
        };
        self.engine.send(|out| exchange.serialize(out))?;

        self.session.timing.start_round(now);
        self.state = ResponderState::AwaitRsaAck;
        Ok(())
    }

    fn on_rsa_ack(&mut self, now: Instant, exchange: RsaExchange) {
        // The budget check comes first and does not consume the payload. An
        // overdue reply smells like a replayed burst: replay the
        // acknowledgement with fresh tokens instead of trusting it.
        let elapsed = self.session.timing.round_elapsed(now);
        let limit = self
            .session
            .timing
            .limit(self.engine.config().freshness_slack());

        if elapsed > limit {
            warn!("{}", Error::FreshnessBudgetExceeded { elapsed, limit });
            self.state = ResponderState::SendAck;
            return;
        }

        match self.check_rsa_ack(&exchange) {
            Ok(()) => self.state = ResponderState::SendDh,
            Err(e) => {
                warn!("Challenge answer round rejected: {}", e);
                self.reset("authentication failed");
            }
        }
    }

    fn check_rsa_ack(&mut self, exchange: &RsaExchange) -> Result<(), Error> {
        let (Some(local), Some(peer_key), Some(challenge)) =
            (self.keys.local, self.keys.peer, self.keys.local_challenge)
        else {
            return Err(Error::CryptoError("key material missing".into()));
        };

        let mut body = Vec::new();
        exchange.package.serialize(&mut body);
        self.engine.verify(&body, &exchange.encrypted_hash, &peer_key)?;

        if exchange.package.nonce_b != self.session.nonce_b {
            return Err(Error::NonceMismatch);
        }

        // The peer must answer the challenge *we* issued.
        if !challenge.check_answer(exchange.package.answer, local.public.exponent)? {
            return Err(Error::ChallengeAnswerRejected);
        }

        Ok(())
    }

    fn send_dh(&mut self, now: Instant) -> Result<(), Error> {
        self.session.timing.start_processing(now);

        let (Some(local), Some(peer_key), Some(peer_challenge)) =
            (self.keys.local, self.keys.peer, self.keys.peer_challenge)
        else {
            return Err(Error::CryptoError("key material missing".into()));
        };

        let params = self.engine.provider_mut().generate_dh_params();
        let exponent = self.engine.provider_mut().generate_dh_exponent();
        let result = self
            .engine
            .provider()
            .mod_pow(params.base, exponent, params.modulus);

        self.keys.dh = Some(DhSecret {
            base: params.base,
            modulus: params.modulus,
            exponent,
        });

        let answer = peer_challenge.apply(peer_key.exponent)?;
        self.session.nonce_b = self.generate_nonce(now);

        let package = DhPackage {
            base: params.base,
            modulus: params.modulus,
            result,
            answer,
            nonce_a: self.session.nonce_a,
            nonce_b: self.session.nonce_b,
        };

        let mut body = Vec::new();
        package.serialize(&mut body);
        let encrypted_hash = self.engine.sign(&body, &local.private);

        let exchange = DhExchange {
            encrypted_hash,
            package,
        };
        let mut plain = Vec::new();
        exchange.serialize(&mut plain);

        // The whole signed exchange travels RSA-encrypted under the peer's
        // public key; only the authenticated initiator can open it.
        let cipher = self.engine.provider().rsa_encrypt(&plain, &peer_key);

        self.session.timing.stop_processing(now);

        let envelope = DhEnvelope {
            cipher,
            processing_hint: self.session.timing.processing().as_secs_f64(),
        };
        self.engine.send(|out| envelope.serialize(out))?;

        self.session.timing.start_round(now);
        self.state = ResponderState::AwaitDh;
        Ok(())
    }

    fn on_dh(&mut self, now: Instant, envelope: DhEnvelope) {
        let elapsed = self.session.timing.round_elapsed(now);
        let budget = self.engine.config().dh_freshness_budget();

        if elapsed > budget {
            warn!(
                "{}",
                Error::FreshnessBudgetExceeded {
                    elapsed,
                    limit: budget
                }
            );
            self.reset("key agreement round exceeded its budget");
            return;
        }

        match self.check_dh(&envelope) {
            Ok(()) => self.state = ResponderState::SendDhAck,
            Err(e) => {
                // The peer is authenticated by now; tell it the session is
                // over instead of silently restarting.
                warn!("Key agreement rejected: {}", e);
                self.state = ResponderState::SendDone;
            }
        }
    }

    fn check_dh(&mut self, envelope: &DhEnvelope) -> Result<(), Error> {
        let (Some(local), Some(peer_key), Some(challenge), Some(dh)) = (
            self.keys.local,
            self.keys.peer,
            self.keys.local_challenge,
            self.keys.dh,
        ) else {
            return Err(Error::CryptoError("key material missing".into()));
        };

        let plain = self
            .engine
            .provider()
            .rsa_decrypt(&envelope.cipher, &local.private)
            .map_err(|_| Error::HashValidationFailed)?;

        let exchange = match DhExchange::parse(&plain) {
            Ok(([], exchange)) => exchange,
            _ => return Err(Error::MalformedMessage("bad key-agreement payload")),
        };

        let mut body = Vec::new();
        exchange.package.serialize(&mut body);
        self.engine.verify(&body, &exchange.encrypted_hash, &peer_key)?;

        if exchange.package.nonce_b != self.session.nonce_b {
            return Err(Error::NonceMismatch);
        }

        if !challenge.check_answer(exchange.package.answer, local.public.exponent)? {
            return Err(Error::ChallengeAnswerRejected);
        }

        // The initiator must echo the group we chose.
        if exchange.package.base != dh.base || exchange.package.modulus != dh.modulus {
            return Err(Error::MalformedMessage("key-agreement group mismatch"));
        }

        let key = self
            .engine
            .provider()
            .mod_pow(exchange.package.result, dh.exponent, dh.modulus);
        self.keys.session_key = Some(key);

        Ok(())
    }

    fn send_dh_ack(&mut self) -> Result<(), Error> {
        let Some(local) = self.keys.local else {
            return Err(Error::CryptoError("key material missing".into()));
        };

        let body = DhAck::digest_input(crate::message::DH_ACK_MARKER, &self.session.nonce_a);
        let encrypted_hash = self.engine.sign(&body, &local.private);

        let ack = DhAck::new(self.session.nonce_a, encrypted_hash);
        self.engine.send(|out| ack.serialize(out))?;

        debug!("Session key established");
        self.engine.push_event(LocalEvent::Connected);
        self.state = ResponderState::DataTransfer;
        Ok(())
    }

    fn on_frame(&mut self, frame: DataFrame) {
        if frame.is_termination_request() {
            debug!("Peer requested termination");
            self.state = ResponderState::SendDoneAck;
            return;
        }
        if frame.is_termination_ack() {
            debug!("Dropping stray termination acknowledgement");
            return;
        }

        let Some(key) = self.keys.session_key else {
            debug!("Dropping frame without a session key");
            return;
        };

        match self.engine.decrypt_frame(key, frame.payload) {
            Ok(plaintext) => self.engine.push_event(LocalEvent::ApplicationData(plaintext)),
            Err(e) => debug!("Dropping undecodable frame: {}", e),
        }
    }

    fn send_done(&mut self) -> Result<(), Error> {
        let frame = DataFrame::new(DONE_MESSAGE);
        self.engine.send(|out| frame.serialize(out))?;
        self.state = ResponderState::AwaitDoneAck;
        Ok(())
    }

    fn on_done_ack(&mut self, frame: DataFrame) {
        if frame.is_termination_ack() {
            self.engine.push_event(LocalEvent::Disconnected);
            self.reset("session closed");
        } else {
            debug!("Still awaiting termination acknowledgement");
        }
    }

    fn send_done_ack(&mut self) -> Result<(), Error> {
        let frame = DataFrame::new(DONE_ACK_MESSAGE);
        self.engine.send(|out| frame.serialize(out))?;
        self.engine.push_event(LocalEvent::Disconnected);
        self.reset("peer closed the session");
        Ok(())
    }

    fn generate_nonce(&mut self, now: Instant) -> Nonce {
        self.nonce_gen
            .generate(self.engine.provider(), now, &mut self.session.sequence)
    }

    fn reset(&mut self, reason: &str) {
        debug!("Session reset: {}", reason);
        self.session.reset();
        self.keys.clear();
        self.state = ResponderState::AwaitSyn;
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("state", &self.state)
            .field("keys", &self.keys)
            .finish()
    }
}
