use nom::number::complete::{be_f64, be_u64, be_u8};
use nom::IResult;

use super::{
    parse_encrypted_hash, parse_nonce, serialize_encrypted_hash, serialize_preamble, RecordKind,
};
use crate::challenge::Challenge;
use crate::crypto::RsaKey;
use crate::nonce::Nonce;

/// Authentication payload: a public key, a challenge, an answer to the
/// peer's challenge and both freshness tokens.
///
/// The serialized form of this package is also the digest input for the
/// signed hash in [`RsaExchange`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsaPackage {
    pub public_key: RsaKey,
    pub challenge: Challenge,
    pub answer: u64,
    pub nonce_a: Nonce,
    pub nonce_b: Nonce,
}

impl RsaPackage {
    pub fn parse(input: &[u8]) -> IResult<&[u8], RsaPackage> {
        let (input, exponent) = be_u64(input)?;
        let (input, modulus) = be_u64(input)?;
        let (input, operator) = be_u8(input)?;
        let (input, operand) = be_u64(input)?;
        let (input, answer) = be_u64(input)?;
        let (input, nonce_a) = parse_nonce(input)?;
        let (input, nonce_b) = parse_nonce(input)?;

        Ok((
            input,
            RsaPackage {
                public_key: RsaKey { exponent, modulus },
                challenge: Challenge { operator, operand },
                answer,
                nonce_a,
                nonce_b,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.public_key.exponent.to_be_bytes());
        output.extend_from_slice(&self.public_key.modulus.to_be_bytes());
        output.push(self.challenge.operator);
        output.extend_from_slice(&self.challenge.operand.to_be_bytes());
        output.extend_from_slice(&self.answer.to_be_bytes());
        output.extend_from_slice(self.nonce_a.as_bytes());
        output.extend_from_slice(self.nonce_b.as_bytes());
    }
}

/// One round of the authentication phase: the package plus its hash,
/// encrypted under the sender's private key, and the sender's processing
/// time so the receiver can rectify its network measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct RsaExchange {
    pub package: RsaPackage,
    pub encrypted_hash: Vec<u64>,
    pub processing_hint: f64,
}

impl RsaExchange {
    pub fn parse(input: &[u8]) -> IResult<&[u8], RsaExchange> {
        let (input, package) = RsaPackage::parse(input)?;
        let (input, encrypted_hash) = parse_encrypted_hash(input)?;
        let (input, processing_hint) = be_f64(input)?;

        Ok((
            input,
            RsaExchange {
                package,
                encrypted_hash,
                processing_hint,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        serialize_preamble(RecordKind::RsaExchange, output);
        self.package.serialize(output);
        serialize_encrypted_hash(&self.encrypted_hash, output);
        output.extend_from_slice(&self.processing_hint.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::OPERATOR_ADD;
    use crate::crypto::DIGEST_LEN;
    use crate::message::Record;
    use crate::nonce::NONCE_LEN;

    fn sample() -> RsaExchange {
        RsaExchange {
            package: RsaPackage {
                public_key: RsaKey {
                    exponent: 17,
                    modulus: 3233,
                },
                challenge: Challenge {
                    operator: OPERATOR_ADD,
                    operand: 99,
                },
                answer: 116,
                nonce_a: Nonce([3; NONCE_LEN]),
                nonce_b: Nonce([4; NONCE_LEN]),
            },
            encrypted_hash: (0..DIGEST_LEN as u64).collect(),
            processing_hint: 0.125,
        }
    }

    #[test]
    fn roundtrip() {
        let exchange = sample();

        let mut packet = Vec::new();
        exchange.serialize(&mut packet);

        let parsed = Record::parse(&packet).unwrap();
        assert_eq!(parsed, Record::RsaExchange(exchange));
    }

    #[test]
    fn short_hash_is_rejected() {
        let mut packet = Vec::new();
        sample().serialize(&mut packet);
        packet.truncate(packet.len() - 16);

        assert!(Record::parse(&packet).is_err());
    }
}
