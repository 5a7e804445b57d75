//! Default cryptographic provider on the RustCrypto stack.
//!
//! SHA-512 for digests, AES-256-GCM for the data-transfer phase, and
//! schoolbook RSA/Diffie-Hellman arithmetic over small moduli via
//! `num-bigint`. The moduli are toy-sized on purpose; see the module docs of
//! [`crate::crypto`].

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use num_bigint::BigUint;
use sha2::{Digest, Sha512};

use crate::crypto::{CryptoProvider, DhParams, RsaKey, RsaKeyPair, DIGEST_LEN};
use crate::rng::SeededRng;
use crate::Error;

/// Range the RSA primes are drawn from. The lower bound keeps the modulus
/// above any single byte value so per-byte encryption stays invertible.
const PRIME_RANGE: std::ops::Range<u64> = 257..4096;

/// Private Diffie-Hellman exponents are drawn from `2..2 + DH_EXPONENT_SPAN`.
const DH_EXPONENT_SPAN: u64 = 14;

pub struct RustCryptoProvider {
    rng: SeededRng,
}

impl RustCryptoProvider {
    /// Create a provider, optionally seeded for deterministic key material.
    pub fn new(seed: Option<u64>) -> Self {
        RustCryptoProvider {
            rng: SeededRng::new(seed),
        }
    }

    fn random_prime(&mut self) -> u64 {
        loop {
            let candidate = self.rng.random_range(PRIME_RANGE) | 1;
            if is_prime(candidate) {
                return candidate;
            }
        }
    }
}

impl Default for RustCryptoProvider {
    fn default() -> Self {
        RustCryptoProvider::new(None)
    }
}

impl CryptoProvider for RustCryptoProvider {
    fn generate_keypair(&mut self) -> RsaKeyPair {
        let p = self.random_prime();
        let q = loop {
            let q = self.random_prime();
            if q != p {
                break q;
            }
        };

        let n = p * q;
        let phi = (p - 1) * (q - 1);

        let e = loop {
            let candidate = self.rng.random_range(3..phi) | 1;
            if gcd(candidate, phi) == 1 {
                break candidate;
            }
        };
        // gcd(e, phi) == 1, so the inverse exists.
        let d = mod_inverse(e, phi).unwrap();

        RsaKeyPair {
            public: RsaKey {
                exponent: e,
                modulus: n,
            },
            private: RsaKey {
                exponent: d,
                modulus: n,
            },
        }
    }

    fn rsa_encrypt(&self, data: &[u8], key: &RsaKey) -> Vec<u64> {
        data.iter()
            .map(|b| self.mod_pow(*b as u64, key.exponent, key.modulus))
            .collect()
    }

    fn rsa_decrypt(&self, data: &[u64], key: &RsaKey) -> Result<Vec<u8>, Error> {
        data.iter()
            .map(|v| {
                let m = self.mod_pow(*v, key.exponent, key.modulus);
                u8::try_from(m)
                    .map_err(|_| Error::CryptoError("recovered value exceeds a byte".into()))
            })
            .collect()
    }

    fn digest(&self, data: &[u8]) -> [u8; DIGEST_LEN] {
        let digest = Sha512::digest(data);
        let hexed = hex::encode(digest);

        let mut out = [0; DIGEST_LEN];
        out.copy_from_slice(hexed.as_bytes());
        out
    }

    fn generate_dh_params(&mut self) -> DhParams {
        let modulus = self.random_prime();
        let base = self.rng.random_range(2..modulus - 1);
        DhParams { base, modulus }
    }

    fn generate_dh_exponent(&mut self) -> u64 {
        2 + self.rng.random_range(0..DH_EXPONENT_SPAN)
    }

    fn mod_pow(&self, base: u64, exponent: u64, modulus: u64) -> u64 {
        if modulus <= 1 {
            return 0;
        }
        let result = BigUint::from(base).modpow(&BigUint::from(exponent), &BigUint::from(modulus));
        result.to_u64_digits().first().copied().unwrap_or(0)
    }

    fn data_encrypt(&self, session_key: u64, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let (key, nonce) = derive_frame_key(session_key);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| Error::CryptoError("bad frame key length".into()))?;
        cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::CryptoError("frame encryption failed".into()))
    }

    fn data_decrypt(&self, session_key: u64, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let (key, nonce) = derive_frame_key(session_key);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| Error::CryptoError("bad frame key length".into()))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| Error::CryptoError("frame decryption failed".into()))
    }
}

/// Key and nonce for the frame cipher, stretched from the session key.
fn derive_frame_key(session_key: u64) -> ([u8; 32], [u8; 12]) {
    let bytes = session_key.to_be_bytes();

    let mut key = [0; 32];
    for (i, b) in key.iter_mut().enumerate() {
        *b = bytes[i % bytes.len()];
    }

    let mut nonce = [0; 12];
    for (i, b) in nonce.iter_mut().enumerate() {
        *b = bytes[i % bytes.len()].wrapping_add(1);
    }

    (key, nonce)
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Modular inverse of `a` mod `m` via the extended Euclidean algorithm.
fn mod_inverse(a: u64, m: u64) -> Option<u64> {
    let (mut old_r, mut r) = (a as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);

    while r != 0 {
        let quotient = old_r / r;
        (old_r, r) = (r, old_r - quotient * r);
        (old_s, s) = (s, old_s - quotient * s);
    }

    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(m as i128) as u64)
}
