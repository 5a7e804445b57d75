use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use super::{serialize_preamble, RecordKind, DONE_ACK_MESSAGE, DONE_MESSAGE};

/// Application frame: a hex-encoded ciphertext, or one of the ASCII
/// termination markers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataFrame<'a> {
    pub payload: &'a [u8],
}

impl<'a> DataFrame<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        DataFrame { payload }
    }

    /// Whether this frame is a termination request.
    pub fn is_termination_request(&self) -> bool {
        self.payload == DONE_MESSAGE
    }

    /// Whether this frame acknowledges a termination request.
    pub fn is_termination_ack(&self) -> bool {
        self.payload == DONE_ACK_MESSAGE
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], DataFrame<'a>> {
        let (input, len) = be_u16(input)?;
        let (input, payload) = take(len as usize)(input)?;
        Ok((input, DataFrame { payload }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        serialize_preamble(RecordKind::Data, output);
        output.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        output.extend_from_slice(self.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Record;

    #[test]
    fn roundtrip() {
        let frame = DataFrame::new(b"6465616462656566");

        let mut packet = Vec::new();
        frame.serialize(&mut packet);

        let parsed = Record::parse(&packet).unwrap();
        assert_eq!(parsed, Record::Data(frame));
    }

    #[test]
    fn markers_are_distinguished() {
        assert!(DataFrame::new(DONE_MESSAGE).is_termination_request());
        assert!(!DataFrame::new(DONE_MESSAGE).is_termination_ack());
        assert!(DataFrame::new(DONE_ACK_MESSAGE).is_termination_ack());
        // The ack shares a prefix with the request; it must not alias.
        assert!(!DataFrame::new(DONE_ACK_MESSAGE).is_termination_request());
    }

    #[test]
    fn length_beyond_input_is_rejected() {
        let mut packet = Vec::new();
        serialize_preamble(RecordKind::Data, &mut packet);
        packet.extend_from_slice(&100u16.to_be_bytes());
        packet.extend_from_slice(b"short");

        assert!(Record::parse(&packet).is_err());
    }
}
