use nom::number::complete::be_u8;
use nom::IResult;

use super::{
    parse_encrypted_hash, parse_nonce, serialize_encrypted_hash, serialize_preamble,
    RecordKind, DH_ACK_MARKER,
};
use crate::nonce::Nonce;

/// Key-agreement acknowledgement: a marker and the initiator's freshness
/// token, signed by the sender.
///
/// The digest input for the signed hash is the marker byte followed by the
/// nonce.
#[derive(Debug, Clone, PartialEq)]
pub struct DhAck {
    pub tag: u8,
    pub nonce: Nonce,
    pub encrypted_hash: Vec<u64>,
}

impl DhAck {
    pub fn new(nonce: Nonce, encrypted_hash: Vec<u64>) -> Self {
        DhAck {
            tag: DH_ACK_MARKER,
            nonce,
            encrypted_hash,
        }
    }

    /// The bytes covered by the signed hash.
    pub fn digest_input(tag: u8, nonce: &Nonce) -> Vec<u8> {
        let mut input = vec![tag];
        input.extend_from_slice(nonce.as_bytes());
        input
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], DhAck> {
        let (input, tag) = be_u8(input)?;
        let (input, nonce) = parse_nonce(input)?;
        let (input, encrypted_hash) = parse_encrypted_hash(input)?;

        Ok((
            input,
            DhAck {
                tag,
                nonce,
                encrypted_hash,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        serialize_preamble(RecordKind::DhAck, output);
        output.push(self.tag);
        output.extend_from_slice(self.nonce.as_bytes());
        serialize_encrypted_hash(&self.encrypted_hash, output);
    }
}
