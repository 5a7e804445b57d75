use nom::IResult;

use super::{parse_nonce, serialize_preamble, RecordKind};
use crate::nonce::Nonce;

/// Session-open acknowledgement: echoes the peer's freshness token and
/// introduces our own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ack {
    pub nonce_a: Nonce,
    pub nonce_b: Nonce,
}

impl Ack {
    pub fn new(nonce_a: Nonce, nonce_b: Nonce) -> Self {
        Ack { nonce_a, nonce_b }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Ack> {
        let (input, nonce_a) = parse_nonce(input)?;
        let (input, nonce_b) = parse_nonce(input)?;
        Ok((input, Ack { nonce_a, nonce_b }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        serialize_preamble(RecordKind::Ack, output);
        output.extend_from_slice(self.nonce_a.as_bytes());
        output.extend_from_slice(self.nonce_b.as_bytes());
    }
}
