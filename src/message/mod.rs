//! Wire records.
//!
//! Every datagram is a versioned record: a two-byte preamble (protocol
//! version, record kind) followed by a fixed-layout body. Parsing is done
//! with `nom` over the raw packet; serialization writes the full datagram
//! into an owned buffer. Lengths are checked everywhere, there is no
//! pointer-casting of packet memory into structs.

mod ack;
mod dh_ack;
mod dh_exchange;
mod frame;
mod rsa_exchange;
mod syn;

pub use ack::Ack;
pub use dh_ack::DhAck;
pub use dh_exchange::{DhEnvelope, DhExchange, DhPackage};
pub use frame::DataFrame;
pub use rsa_exchange::{RsaExchange, RsaPackage};
pub use syn::Syn;

use nom::bytes::complete::take;
use nom::multi::count;
use nom::number::complete::be_u64;
use nom::IResult;

use crate::crypto::DIGEST_LEN;
use crate::nonce::{Nonce, NONCE_LEN};
use crate::Error;

/// Wire format version carried in every datagram preamble.
pub const PROTOCOL_VERSION: u8 = 1;

/// Marker value identifying a session-open request.
pub const SYN_MARKER: u8 = 0x5A;

/// Marker value identifying the key-agreement acknowledgement.
pub const DH_ACK_MARKER: u8 = 0xA5;

/// Termination request, sent as a data-frame payload.
pub const DONE_MESSAGE: &[u8] = b"DONE";

/// Termination acknowledgement, sent as a data-frame payload.
pub const DONE_ACK_MESSAGE: &[u8] = b"DONE_ACK";

/// Kind byte of each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Syn,
    Ack,
    RsaExchange,
    DhEnvelope,
    DhAck,
    Data,
}

impl RecordKind {
    pub fn from_u8(value: u8) -> Option<RecordKind> {
        match value {
            0x01 => Some(RecordKind::Syn),
            0x02 => Some(RecordKind::Ack),
            0x03 => Some(RecordKind::RsaExchange),
            0x04 => Some(RecordKind::DhEnvelope),
            0x05 => Some(RecordKind::DhAck),
            0x06 => Some(RecordKind::Data),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            RecordKind::Syn => 0x01,
            RecordKind::Ack => 0x02,
            RecordKind::RsaExchange => 0x03,
            RecordKind::DhEnvelope => 0x04,
            RecordKind::DhAck => 0x05,
            RecordKind::Data => 0x06,
        }
    }
}

/// One parsed datagram.
#[derive(Debug, PartialEq)]
pub enum Record<'a> {
    Syn(Syn),
    Ack(Ack),
    RsaExchange(RsaExchange),
    DhEnvelope(DhEnvelope),
    DhAck(DhAck),
    Data(DataFrame<'a>),
}

impl<'a> Record<'a> {
    /// Parse a full datagram, including the version/kind preamble.
    ///
    /// Trailing bytes after the record body are rejected.
    pub fn parse(packet: &'a [u8]) -> Result<Record<'a>, Error> {
        let [version, kind, body @ ..] = packet else {
            return Err(Error::MalformedMessage("datagram shorter than preamble"));
        };

        if *version != PROTOCOL_VERSION {
            return Err(Error::MalformedMessage("unknown protocol version"));
        }

        let Some(kind) = RecordKind::from_u8(*kind) else {
            return Err(Error::MalformedMessage("unknown record kind"));
        };

        let (rest, record) = match kind {
            RecordKind::Syn => Syn::parse(body)
                .map(|(rest, m)| (rest, Record::Syn(m)))
                .map_err(|_| Error::MalformedMessage("bad session-open record"))?,
            RecordKind::Ack => Ack::parse(body)
                .map(|(rest, m)| (rest, Record::Ack(m)))
                .map_err(|_| Error::MalformedMessage("bad acknowledgement record"))?,
            RecordKind::RsaExchange => RsaExchange::parse(body)
                .map(|(rest, m)| (rest, Record::RsaExchange(m)))
                .map_err(|_| Error::MalformedMessage("bad key-authentication record"))?,
            RecordKind::DhEnvelope => DhEnvelope::parse(body)
                .map(|(rest, m)| (rest, Record::DhEnvelope(m)))
                .map_err(|_| Error::MalformedMessage("bad key-agreement envelope"))?,
            RecordKind::DhAck => DhAck::parse(body)
                .map(|(rest, m)| (rest, Record::DhAck(m)))
                .map_err(|_| Error::MalformedMessage("bad key-agreement acknowledgement"))?,
            RecordKind::Data => DataFrame::parse(body)
                .map(|(rest, m)| (rest, Record::Data(m)))
                .map_err(|_| Error::MalformedMessage("bad data frame"))?,
        };

        if !rest.is_empty() {
            return Err(Error::MalformedMessage("trailing bytes after record"));
        }

        Ok(record)
    }
}

pub(crate) fn serialize_preamble(kind: RecordKind, output: &mut Vec<u8>) {
    output.push(PROTOCOL_VERSION);
    output.push(kind.as_u8());
}

pub(crate) fn parse_nonce(input: &[u8]) -> IResult<&[u8], Nonce> {
    let (input, bytes) = take(NONCE_LEN)(input)?;
    // take() guarantees the length.
    Ok((input, Nonce(bytes.try_into().unwrap())))
}

pub(crate) fn parse_encrypted_hash(input: &[u8]) -> IResult<&[u8], Vec<u64>> {
    count(be_u64, DIGEST_LEN)(input)
}

pub(crate) fn serialize_encrypted_hash(hash: &[u64], output: &mut Vec<u8>) {
    for v in hash {
        output.extend_from_slice(&v.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_version() {
        let mut packet = Vec::new();
        Syn::new(Nonce([7; NONCE_LEN])).serialize(&mut packet);
        packet[0] = 99;

        let err = Record::parse(&packet).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
    }

    #[test]
    fn rejects_unknown_kind() {
        let packet = [PROTOCOL_VERSION, 0x7F, 0, 0];
        assert!(Record::parse(&packet).is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut packet = Vec::new();
        Syn::new(Nonce([7; NONCE_LEN])).serialize(&mut packet);
        packet.push(0);

        assert!(Record::parse(&packet).is_err());
    }
}
