use nom::multi::count;
use nom::number::complete::{be_f64, be_u16, be_u64};
use nom::IResult;

use super::{
    parse_encrypted_hash, parse_nonce, serialize_encrypted_hash, serialize_preamble, RecordKind,
};
use crate::nonce::Nonce;

/// Upper bound on the encrypted envelope length, to bound allocation from
/// hostile input.
const MAX_CIPHER_LEN: usize = 4096;

/// Key-agreement payload: the chosen group, this side's public result, the
/// answer to the peer's challenge and both freshness tokens.
///
/// The serialized form is the digest input for the signed hash in
/// [`DhExchange`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhPackage {
    pub base: u64,
    pub modulus: u64,
    pub result: u64,
    pub answer: u64,
    pub nonce_a: Nonce,
    pub nonce_b: Nonce,
}

impl DhPackage {
    pub fn parse(input: &[u8]) -> IResult<&[u8], DhPackage> {
        let (input, base) = be_u64(input)?;
        let (input, modulus) = be_u64(input)?;
        let (input, result) = be_u64(input)?;
        let (input, answer) = be_u64(input)?;
        let (input, nonce_a) = parse_nonce(input)?;
        let (input, nonce_b) = parse_nonce(input)?;

        Ok((
            input,
            DhPackage {
                base,
                modulus,
                result,
                answer,
                nonce_a,
                nonce_b,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.base.to_be_bytes());
        output.extend_from_slice(&self.modulus.to_be_bytes());
        output.extend_from_slice(&self.result.to_be_bytes());
        output.extend_from_slice(&self.answer.to_be_bytes());
        output.extend_from_slice(self.nonce_a.as_bytes());
        output.extend_from_slice(self.nonce_b.as_bytes());
    }
}

/// The signed key-agreement payload. This never travels in the clear: it is
/// serialized and RSA-encrypted into a [`DhEnvelope`].
#[derive(Debug, Clone, PartialEq)]
pub struct DhExchange {
    pub encrypted_hash: Vec<u64>,
    pub package: DhPackage,
}

impl DhExchange {
    pub fn parse(input: &[u8]) -> IResult<&[u8], DhExchange> {
        let (input, encrypted_hash) = parse_encrypted_hash(input)?;
        let (input, package) = DhPackage::parse(input)?;

        Ok((
            input,
            DhExchange {
                encrypted_hash,
                package,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        serialize_encrypted_hash(&self.encrypted_hash, output);
        self.package.serialize(output);
    }
}

/// The outer datagram of the key-agreement round: a [`DhExchange`]
/// RSA-encrypted under the receiver's public key, plus the sender's
/// processing time.
#[derive(Debug, Clone, PartialEq)]
pub struct DhEnvelope {
    pub cipher: Vec<u64>,
    pub processing_hint: f64,
}

impl DhEnvelope {
    pub fn parse(input: &[u8]) -> IResult<&[u8], DhEnvelope> {
        let (input, cipher_len) = be_u16(input)?;
        if cipher_len as usize > MAX_CIPHER_LEN {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::TooLarge,
            )));
        }

        let (input, cipher) = count(be_u64, cipher_len as usize)(input)?;
        let (input, processing_hint) = be_f64(input)?;

        Ok((
            input,
            DhEnvelope {
                cipher,
                processing_hint,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        serialize_preamble(RecordKind::DhEnvelope, output);
        output.extend_from_slice(&(self.cipher.len() as u16).to_be_bytes());
        for v in &self.cipher {
            output.extend_from_slice(&v.to_be_bytes());
        }
        output.extend_from_slice(&self.processing_hint.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DIGEST_LEN;
    use crate::message::Record;
    use crate::nonce::NONCE_LEN;

    fn sample_exchange() -> DhExchange {
        DhExchange {
            encrypted_hash: (0..DIGEST_LEN as u64).rev().collect(),
            package: DhPackage {
                base: 5,
                modulus: 1009,
                result: 625,
                answer: 77,
                nonce_a: Nonce([8; NONCE_LEN]),
                nonce_b: Nonce([9; NONCE_LEN]),
            },
        }
    }

    #[test]
    fn exchange_roundtrip() {
        let exchange = sample_exchange();

        let mut bytes = Vec::new();
        exchange.serialize(&mut bytes);

        let (rest, parsed) = DhExchange::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, exchange);
    }

    #[test]
    fn envelope_roundtrip() {
        let envelope = DhEnvelope {
            cipher: vec![1, 2, 3, 0xFFFF_FFFF_FFFF],
            processing_hint: 0.25,
        };

        let mut packet = Vec::new();
        envelope.serialize(&mut packet);

        let parsed = Record::parse(&packet).unwrap();
        assert_eq!(parsed, Record::DhEnvelope(envelope));
    }

    #[test]
    fn oversized_envelope_is_rejected() {
        let mut packet = Vec::new();
        serialize_preamble(RecordKind::DhEnvelope, &mut packet);
        packet.extend_from_slice(&u16::MAX.to_be_bytes());
        packet.extend_from_slice(&[0; 64]);

        assert!(Record::parse(&packet).is_err());
    }
}
