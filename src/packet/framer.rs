use bytes::BytesMut;

use crate::{
    parse_bgp_packet, peek_bgp_length, validate_bgp_header, BgpPacket, BgpType, ParseError,
    BGP_PACKET_HEADER_LEN, BGP_PACKET_MAX_LEN,
};
use crate::{bgp_debug, bgp_warn};

/// One framing result. Everything except `Packet` poisons the framer: the
/// byte stream can no longer be trusted and the connection is torn down.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutput {
    Packet(BgpPacket),
    /// Header validation failed; carries the offending 19 header bytes.
    HeaderErr(Vec<u8>),
    /// OPEN body failed to decode.
    OpenErr,
    /// UPDATE body failed to decode.
    UpdateErr,
}

impl FrameOutput {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FrameOutput::Packet(_))
    }
}

/// Accumulates transport bytes and cuts them into BGP messages on the
/// length prefix.
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
    poisoned: bool,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(BGP_PACKET_MAX_LEN * 2),
            poisoned: false,
        }
    }

    /// Append arriving bytes and drain every complete message. Validation
    /// failure stops parsing for good; the remaining buffer is dropped with
    /// the connection.
    pub fn push(&mut self, data: &[u8]) -> Vec<FrameOutput> {
        let mut out = Vec::new();
        if self.poisoned {
            return out;
        }
        self.buf.extend_from_slice(data);
        while self.buf.len() >= BGP_PACKET_HEADER_LEN as usize {
            if let Err(err) = validate_bgp_header(&self.buf) {
                bgp_warn!(error = %err, "header validation failed");
                self.poisoned = true;
                out.push(FrameOutput::HeaderErr(self.buf[..19].to_vec()));
                break;
            }
            let length = peek_bgp_length(&self.buf);
            if self.buf.len() < length {
                break;
            }
            let msg = self.buf.split_to(length);
            match parse_bgp_packet(&msg) {
                Ok(packet) => out.push(FrameOutput::Packet(packet)),
                Err(err) => {
                    bgp_warn!(error = %err, "message decode failed");
                    self.poisoned = true;
                    out.push(match err {
                        ParseError::BadBody(BgpType::Open) => FrameOutput::OpenErr,
                        ParseError::BadBody(BgpType::Update) => FrameOutput::UpdateErr,
                        _ => FrameOutput::HeaderErr(msg[..19].to_vec()),
                    });
                    break;
                }
            }
        }
        if !out.is_empty() {
            bgp_debug!(frames = out.len(), buffered = self.buf.len(), "framer drained");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BgpHeader, OpenPacket};
    use std::net::Ipv4Addr;

    fn keepalive_bytes() -> BytesMut {
        BgpHeader::new(BgpType::Keepalive, BGP_PACKET_HEADER_LEN).into()
    }

    fn open_bytes() -> BytesMut {
        OpenPacket::new(65001, 90, &Ipv4Addr::new(1, 1, 1, 1)).into()
    }

    #[test]
    fn frame_single_message() {
        let mut framer = Framer::new();
        let out = framer.push(&keepalive_bytes());
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], FrameOutput::Packet(BgpPacket::Keepalive(_))));
    }

    #[test]
    fn frame_byte_at_a_time() {
        let mut framer = Framer::new();
        let bytes = open_bytes();
        for b in &bytes[..bytes.len() - 1] {
            assert!(framer.push(&[*b]).is_empty());
        }
        let out = framer.push(&bytes[bytes.len() - 1..]);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], FrameOutput::Packet(BgpPacket::Open(_))));
    }

    #[test]
    fn frame_coalesced_messages() {
        let mut framer = Framer::new();
        let mut stream = Vec::new();
        stream.extend_from_slice(&open_bytes());
        stream.extend_from_slice(&keepalive_bytes());
        stream.extend_from_slice(&keepalive_bytes());
        let out = framer.push(&stream);
        assert_eq!(out.len(), 3);

        // Re-encoding the framed messages reproduces the input stream.
        let mut encoded = Vec::new();
        for frame in out {
            match frame {
                FrameOutput::Packet(packet) => {
                    let buf: BytesMut = packet.into();
                    encoded.extend_from_slice(&buf);
                }
                other => panic!("unexpected frame {:?}", other),
            }
        }
        assert_eq!(encoded, stream);
    }

    #[test]
    fn bad_marker_poisons() {
        let mut framer = Framer::new();
        let out = framer.push(&keepalive_bytes());
        assert_eq!(out.len(), 1);

        let mut bad = keepalive_bytes().to_vec();
        bad[0] = 0x00;
        let out = framer.push(&bad);
        assert_eq!(out.len(), 1);
        match &out[0] {
            FrameOutput::HeaderErr(header) => assert_eq!(header, &bad[..19]),
            other => panic!("unexpected frame {:?}", other),
        }

        // Nothing comes out once the stream is poisoned.
        assert!(framer.push(&keepalive_bytes()).is_empty());
    }

    #[test]
    fn short_open_body_is_open_err() {
        let mut framer = Framer::new();
        // OPEN whose length claims a truncated body.
        let mut bad: Vec<u8> = vec![0xff; 16];
        bad.extend_from_slice(&[0x00, 0x14, 0x01, 0x04]);
        let out = framer.push(&bad);
        assert_eq!(out, vec![FrameOutput::OpenErr]);
    }
}
