// Handshake flow, initiator side. The mirror of `responder.rs`: the
// initiator opens the session, sends the first authentication package,
// answers the responder's challenge and replies to the responder's
// key-agreement opening. See the flow comment in responder.rs for the
// message sequence.

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
    Syn, DH_ACK_MARKER, DONE_ACK_MESSAGE, DONE_MESSAGE,
};
use crate::nonce::{Nonce, NonceGenerator};
use crate::session::Session;
use crate::{Config, Error, Output};

/// The endpoint that opens a session towards a responder.
pub struct Initiator {
    engine: Engine,
    session: Session,
    keys: KeyMaterial,
    nonce_gen: NonceGenerator,
    state: InitiatorState,
    deadline: Instant,
}

/// Current state of the initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorState {
    /// No session in progress.
    Idle,

    /// Send the session-open request.
    SendSyn,

    /// Await the session-open acknowledgement.
    AwaitAck,

    /// Send our authentication package.
    SendRsa,

    /// Await the responder's authentication package.
    AwaitRsa,

    /// Answer the responder's challenge.
    SendRsaAck,

    /// Await the responder's key-agreement opening.
    AwaitDh,

    /// Send our key-agreement reply.
    SendDh,

    /// Await the key-agreement acknowledgement.
    AwaitDhAck,

    /// Send and receive encrypted data.
    DataTransfer,

    /// Request termination.
    SendDone,

    /// Await the acknowledgement of our termination request.
    AwaitDoneAck,

    /// Acknowledge the peer's termination request.
    SendDoneAck,
}

impl Initiator {
    /// Create a new initiator for one responder address.
    pub fn new(
        config: Arc<Config>,
        provider: Box<dyn CryptoProvider>,
        local: SocketAddr,
        peer: SocketAddr,
        now: Instant,
    ) -> Initiator {
        let deadline = now + config.receive_timeout();

        Initiator {
            engine: Engine::new(config, provider),
            session: Session::default(),
            keys: KeyMaterial::default(),
            nonce_gen: NonceGenerator::new(local, peer),
            state: InitiatorState::Idle,
            deadline,
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> InitiatorState {
        self.state
    }

    /// Whether a session key is established and data frames flow.
    pub fn is_connected(&self) -> bool {
        self.state == InitiatorState::DataTransfer
    }

    /// The derived session key, once the key agreement has completed.
    pub fn session_key(&self) -> Option<u64> {
        self.keys.session_key
    }

    /// Open a session: queue the session-open request.
    ///
    /// Any session in progress is discarded first.
    pub fn connect(&mut self, now: Instant) -> Result<(), Error> {
        self.session.reset();
        self.keys.clear();
        self.deadline = now + self.engine.config().receive_timeout();
        self.state = InitiatorState::SendSyn;
        self.drive_send(now)
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

    /// Drive the receive deadline. Past the deadline, a stalled handshake
    /// restarts from the session-open request.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        if now < self.deadline {
            return Ok(());
        }
        self.deadline = now + self.engine.config().receive_timeout();

        match self.state {
            InitiatorState::Idle | InitiatorState::DataTransfer => {}
            InitiatorState::AwaitDoneAck => {
                warn!("Termination acknowledgement never arrived");
                self.engine.push_event(LocalEvent::Disconnected);
                self.reset("termination timed out");
            }
            state => {
                warn!("Receive timeout in {:?}, restarting session open", state);
                self.restart(now)?;
            }
        }

        Ok(())
    }

    /// Encrypt and queue an application frame.
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.state != InitiatorState::DataTransfer {
            return Err(Error::NotConnected);
        }
        let key = self.keys.session_key.ok_or(Error::NotConnected)?;

        let payload = self.engine.encrypt_frame(key, data)?;
        let frame = DataFrame::new(&payload);
        self.engine.send(|out| frame.serialize(out))
    }

    /// Begin the graceful-termination sub-protocol.
    pub fn close(&mut self, now: Instant) -> Result<(), Error> {
        if self.state == InitiatorState::Idle {
            return Ok(());
        }

        self.deadline = now + self.engine.config().receive_timeout();
        self.state = InitiatorState::SendDone;
        self.drive_send(now)
    }

    fn dispatch(&mut self, now: Instant, record: Record) -> Result<(), Error> {
        match (self.state, record) {
            (InitiatorState::AwaitAck, Record::Ack(ack)) => self.on_ack(now, ack),
            (InitiatorState::AwaitRsa, Record::RsaExchange(exchange)) => {
                self.on_rsa(now, exchange)?
            }
            (InitiatorState::AwaitDh, Record::DhEnvelope(envelope)) => {
                self.on_dh(now, envelope)?
            }
            (InitiatorState::AwaitDhAck, Record::DhAck(ack)) => self.on_dh_ack(ack),
            (InitiatorState::DataTransfer, Record::Data(frame)) => self.on_frame(frame),
            (InitiatorState::AwaitDoneAck, Record::Data(frame)) => self.on_done_ack(frame),
            (state, _) => {
                debug!("Dropping unexpected record in {:?}", state);
            }
        }

        Ok(())
    }

    fn drive_send(&mut self, now: Instant) -> Result<(), Error> {
        loop {
            let prev = self.state;

            let step = match self.state {
                InitiatorState::SendSyn => self.send_syn(now),
                InitiatorState::SendRsa => self.send_rsa(now),
                InitiatorState::SendRsaAck => self.send_rsa_ack(now),
                InitiatorState::SendDh => self.send_dh(now),
                InitiatorState::SendDone => self.send_done(),
                InitiatorState::SendDoneAck => self.send_done_ack(),
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

    fn send_syn(&mut self, now: Instant) -> Result<(), Error> {
        self.session.sequence = self.engine.rng_mut().random();
        self.session.nonce_a = self.generate_nonce(now);
        self.session.timing.start_network(now);

        let syn = Syn::new(self.session.nonce_a);
        self.engine.send(|out| syn.serialize(out))?;

        debug!("Session-open request sent");
        self.state = InitiatorState::AwaitAck;
        Ok(())
    }

    fn on_ack(&mut self, now: Instant, ack: Ack) {
        if ack.nonce_a != self.session.nonce_a {
            debug!("Dropping acknowledgement echoing a foreign nonce");
            return;
        }

        self.session.timing.stop_network(now, std::time::Duration::ZERO);
        self.session.nonce_b = ack.nonce_b;
        self.state = InitiatorState::SendRsa;
    }

    fn send_rsa(&mut self, now: Instant) -> Result<(), Error> {
        self.session.timing.start_processing(now);

        let pair = self.engine.provider_mut().generate_keypair();
        let challenge = Challenge::generate(self.engine.rng_mut());
        self.keys.local = Some(pair);
        self.keys.local_challenge = Some(challenge);

        // Nothing to answer yet; the responder issues its challenge in the
        // reply.
        let package = RsaPackage {
            public_key: pair.public,
            challenge,
            answer: 0,
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
        self.state = InitiatorState::AwaitRsa;
        Ok(())
    }

    fn on_rsa(&mut self, now: Instant, exchange: RsaExchange) -> Result<(), Error> {
        let elapsed = self.session.timing.round_elapsed(now);
        let limit = self
            .session
            .timing
            .limit(self.engine.config().freshness_slack());

        if elapsed > limit {
            warn!("{}", Error::FreshnessBudgetExceeded { elapsed, limit });
            return self.restart(now);
        }

        match self.check_rsa(&exchange) {
            Ok(()) => self.state = InitiatorState::SendRsaAck,
            Err(e) => {
                warn!("Authentication package rejected: {}", e);
                return self.restart(now);
            }
        }

        Ok(())
    }

    fn check_rsa(&mut self, exchange: &RsaExchange) -> Result<(), Error> {
        let (Some(local), Some(challenge)) = (self.keys.local, self.keys.local_challenge) else {
            return Err(Error::CryptoError("key material missing".into()));
        };

        let peer_key = exchange.package.public_key;

        let mut body = Vec::new();
        exchange.package.serialize(&mut body);
        self.engine.verify(&body, &exchange.encrypted_hash, &peer_key)?;

        if exchange.package.nonce_a != self.session.nonce_a {
            return Err(Error::NonceMismatch);
        }

        if !challenge.check_answer(exchange.package.answer, local.public.exponent)? {
            return Err(Error::ChallengeAnswerRejected);
        }

        self.keys.peer = Some(peer_key);
        self.keys.peer_challenge = Some(exchange.package.challenge);
        // The responder minted a fresh token for this round.
        self.session.nonce_b = exchange.package.nonce_b;

        Ok(())
    }

    fn send_rsa_ack(&mut self, now: Instant) -> Result<(), Error> {
        self.session.timing.start_processing(now);

        let (Some(local), Some(local_challenge), Some(peer_key), Some(peer_challenge)) = (
            self.keys.local,
            self.keys.local_challenge,
            self.keys.peer,
            self.keys.peer_challenge,
        ) else {
            return Err(Error::CryptoError("key material missing".into()));
        };

        let answer = peer_challenge.apply(peer_key.exponent)?;

        let package = RsaPackage {
            public_key: local.public,
            challenge: local_challenge,
            answer,
            nonce_a: self.session.nonce_a,
            nonce_b: self.session.nonce_b,
        };

        let mut body = Vec::new();
        package.serialize(&mut body);
        let encrypted_hash = self.engine.sign(&body, &local.private);

        self.session.timing.stop_processing(now);

        let exchange = RsaExchange {
            package,
            encrypted_hash,
            processing_hint: self.session.timing.processing().as_secs_f64(),
        };
        self.engine.send(|out| exchange.serialize(out))?;

        self.session.timing.start_round(now);
        self.state = InitiatorState::AwaitDh;
        Ok(())
    }

    fn on_dh(&mut self, now: Instant, envelope: DhEnvelope) -> Result<(), Error> {
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
            return self.restart(now);
        }

        match self.check_dh(&envelope) {
            Ok(()) => self.state = InitiatorState::SendDh,
            Err(e) => {
                warn!("Key agreement rejected: {}", e);
                self.state = InitiatorState::SendDone;
            }
        }

        Ok(())
    }

    fn check_dh(&mut self, envelope: &DhEnvelope) -> Result<(), Error> {
        let (Some(local), Some(peer_key), Some(challenge)) =
            (self.keys.local, self.keys.peer, self.keys.local_challenge)
        else {
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

        if exchange.package.nonce_a != self.session.nonce_a {
            return Err(Error::NonceMismatch);
        }

        if !challenge.check_answer(exchange.package.answer, local.public.exponent)? {
            return Err(Error::ChallengeAnswerRejected);
        }

        // Adopt the responder's fresh token and group, derive our half.
        self.session.nonce_b = exchange.package.nonce_b;

        let exponent = self.engine.provider_mut().generate_dh_exponent();
        let key = self.engine.provider().mod_pow(
            exchange.package.result,
            exponent,
            exchange.package.modulus,
        );

        self.keys.dh = Some(DhSecret {
            base: exchange.package.base,
            modulus: exchange.package.modulus,
            exponent,
        });
        self.keys.session_key = Some(key);

        Ok(())
    }

    fn send_dh(&mut self, now: Instant) -> Result<(), Error> {
        self.session.timing.start_processing(now);

        let (Some(local), Some(peer_key), Some(peer_challenge), Some(dh)) = (
            self.keys.local,
            self.keys.peer,
            self.keys.peer_challenge,
            self.keys.dh,
        ) else {
            return Err(Error::CryptoError("key material missing".into()));
        };

        let result = self
            .engine
            .provider()
            .mod_pow(dh.base, dh.exponent, dh.modulus);
        let answer = peer_challenge.apply(peer_key.exponent)?;

        let package = DhPackage {
            base: dh.base,
            modulus: dh.modulus,
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

        let cipher = self.engine.provider().rsa_encrypt(&plain, &peer_key);

        self.session.timing.stop_processing(now);

        let envelope = DhEnvelope {
            cipher,
            processing_hint: self.session.timing.processing().as_secs_f64(),
        };
        self.engine.send(|out| envelope.serialize(out))?;

        self.session.timing.start_round(now);
        self.state = InitiatorState::AwaitDhAck;
        Ok(())
    }

    fn on_dh_ack(&mut self, ack: DhAck) {
        if ack.tag != DH_ACK_MARKER {
            debug!("Dropping key-agreement acknowledgement with bad marker");
            return;
        }

        match self.check_dh_ack(&ack) {
            Ok(()) => {
                debug!("Session key established");
                self.engine.push_event(LocalEvent::Connected);
                self.state = InitiatorState::DataTransfer;
            }
            Err(e) => {
                warn!("Key-agreement acknowledgement rejected: {}", e);
                self.state = InitiatorState::SendDone;
            }
        }
    }

    fn check_dh_ack(&mut self, ack: &DhAck) -> Result<(), Error> {
        let Some(peer_key) = self.keys.peer else {
            return Err(Error::CryptoError("key material missing".into()));
        };

        if ack.nonce != self.session.nonce_a {
            return Err(Error::NonceMismatch);
        }

        let body = DhAck::digest_input(ack.tag, &ack.nonce);
        self.engine.verify(&body, &ack.encrypted_hash, &peer_key)?;

        Ok(())
    }

    fn on_frame(&mut self, frame: DataFrame) {
        if frame.is_termination_request() {
            debug!("Peer requested termination");
            self.state = InitiatorState::SendDoneAck;
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
        self.state = InitiatorState::AwaitDoneAck;
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

    /// Drop all session state and re-send the session-open request.
    fn restart(&mut self, now: Instant) -> Result<(), Error> {
        self.session.reset();
        self.keys.clear();
        self.state = InitiatorState::SendSyn;
        self.drive_send(now)
    }

    fn reset(&mut self, reason: &str) {
        debug!("Session reset: {}", reason);
        self.session.reset();
        self.keys.clear();
        self.state = InitiatorState::Idle;
    }
}

impl std::fmt::Debug for Initiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initiator")
            .field("state", &self.state)
            .field("keys", &self.keys)
            .finish()
    }
}
