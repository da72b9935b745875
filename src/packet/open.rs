use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};
use nom::bytes::complete::take;
use nom::error::{make_error, ErrorKind};
use nom::IResult;
use nom_derive::*;

use crate::{BgpHeader, BgpType, BGP_PACKET_HEADER_LEN};

pub const BGP_VERSION: u8 = 4;

/// OPEN message. Optional parameters are carried as an opaque byte blob so a
/// capability-bearing OPEN round-trips byte for byte; capability negotiation
/// itself is not performed.
#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct OpenPacket {
    pub header: BgpHeader,
    pub version: u8,
    pub asn: u16,
    pub hold_time: u16,
    pub bgp_id: [u8; 4],
    pub opt_param_len: u8,
    #[nom(Ignore)]
    pub opt_params: Vec<u8>,
}

impl OpenPacket {
    pub fn new(asn: u16, hold_time: u16, router_id: &Ipv4Addr) -> OpenPacket {
        OpenPacket {
            header: BgpHeader::new(BgpType::Open, BGP_PACKET_HEADER_LEN + 10),
            version: BGP_VERSION,
            asn,
            hold_time,
            bgp_id: router_id.octets(),
            opt_param_len: 0,
            opt_params: Vec::new(),
        }
    }

    pub fn parse_packet(input: &[u8]) -> IResult<&[u8], OpenPacket> {
        let (input, mut packet) = OpenPacket::parse(input)?;
        if input.len() != packet.opt_param_len as usize {
            return Err(nom::Err::Error(make_error(input, ErrorKind::LengthValue)));
        }
        let (input, opts) = take(packet.opt_param_len as usize)(input)?;
        packet.opt_params = opts.to_vec();
        Ok((input, packet))
    }
}

impl From<OpenPacket> for BytesMut {
    fn from(open: OpenPacket) -> Self {
        let mut buf = BytesMut::new();
        let header: BytesMut = open.header.into();
        buf.put(&header[..]);
        buf.put_u8(open.version);
        buf.put_u16(open.asn);
        buf.put_u16(open.hold_time);
        buf.put(&open.bgp_id[..]);
        buf.put_u8(open.opt_params.len() as u8);
        buf.put(&open.opt_params[..]);

        const LENGTH_POS: std::ops::Range<usize> = 16..18;
        let length: u16 = buf.len() as u16;
        buf[LENGTH_POS].copy_from_slice(&length.to_be_bytes());

        buf
    }
}
