use nom::number::complete::be_u8;
use nom::IResult;

use super::{parse_nonce, serialize_preamble, RecordKind, SYN_MARKER};
use crate::nonce::Nonce;

/// Session-open request: the initiator's first datagram, carrying its
/// freshness token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Syn {
    pub tag: u8,
    pub nonce: Nonce,
}

impl Syn {
    pub fn new(nonce: Nonce) -> Self {
        Syn {
            tag: SYN_MARKER,
            nonce,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Syn> {
        let (input, tag) = be_u8(input)?;
        let (input, nonce) = parse_nonce(input)?;
        Ok((input, Syn { tag, nonce }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        serialize_preamble(RecordKind::Syn, output);
        output.push(self.tag);
        output.extend_from_slice(self.nonce.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Record;
    use crate::nonce::NONCE_LEN;

    #[test]
    fn roundtrip() {
        let syn = Syn::new(Nonce([0xAB; NONCE_LEN]));

        let mut packet = Vec::new();
        syn.serialize(&mut packet);
        assert_eq!(packet.len(), 2 + 1 + NONCE_LEN);

        let parsed = Record::parse(&packet).unwrap();
        assert_eq!(parsed, Record::Syn(syn));
    }

    #[test]
    fn truncated_is_rejected() {
        let mut packet = Vec::new();
        Syn::new(Nonce([0xAB; NONCE_LEN])).serialize(&mut packet);
        packet.truncate(packet.len() - 1);

        assert!(Record::parse(&packet).is_err());
    }
}
