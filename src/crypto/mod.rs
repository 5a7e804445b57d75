//! Cryptographic primitives consumed by the handshake.
//!
//! The state machine never touches key arithmetic directly; everything goes
//! through the [`CryptoProvider`] seam so tests can substitute a
//! deterministic stub. Key sizes are deliberately tiny: the arithmetic is not
//! the point of this protocol, the message-validation rules around it are.

pub mod rust_crypto;

use zeroize::Zeroize;

use crate::Error;

/// Byte length of a message digest (and of the hash field inside signed
/// records): a lowercase-hex SHA-512 digest.
pub const DIGEST_LEN: usize = 128;

/// One half of an RSA keypair: an exponent and a modulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Zeroize)]
pub struct RsaKey {
    pub exponent: u64,
    pub modulus: u64,
}

/// An RSA keypair.
///
/// "Signing" in this protocol is encrypting a digest with the private key;
/// any holder of the public key can invert it and compare.
#[derive(Debug, Clone, Copy, Default, Zeroize)]
pub struct RsaKeyPair {
    pub public: RsaKey,
    pub private: RsaKey,
}

/// Diffie-Hellman domain parameters chosen by the side that opens the
/// exchange.
#[derive(Debug, Clone, Copy, Default, Zeroize)]
pub struct DhParams {
    pub base: u64,
    pub modulus: u64,
}

/// Provider of all cryptographic operations.
///
/// The default implementation is [`rust_crypto::RustCryptoProvider`].
pub trait CryptoProvider {
    /// Generate a fresh RSA keypair.
    fn generate_keypair(&mut self) -> RsaKeyPair;

    /// Encrypt bytes under the given key, one value per input byte.
    fn rsa_encrypt(&self, data: &[u8], key: &RsaKey) -> Vec<u64>;

    /// Invert [`CryptoProvider::rsa_encrypt`] with the paired key.
    ///
    /// Fails when a recovered value does not fit a byte, which is what
    /// tampered input or a wrong key produces.
    fn rsa_decrypt(&self, data: &[u64], key: &RsaKey) -> Result<Vec<u8>, Error>;

    /// Digest arbitrary bytes into the fixed hash field.
    fn digest(&self, data: &[u8]) -> [u8; DIGEST_LEN];

    /// Choose Diffie-Hellman domain parameters.
    fn generate_dh_params(&mut self) -> DhParams;

    /// Choose a private Diffie-Hellman exponent. The range is intentionally
    /// small.
    fn generate_dh_exponent(&mut self) -> u64;

    /// `base ^ exponent mod modulus`.
    fn mod_pow(&self, base: u64, exponent: u64, modulus: u64) -> u64;

    /// Encrypt an application frame under the derived session key.
    fn data_encrypt(&self, session_key: u64, plaintext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Decrypt an application frame under the derived session key.
    fn data_decrypt(&self, session_key: u64, ciphertext: &[u8]) -> Result<Vec<u8>, Error>;
}
