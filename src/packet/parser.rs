use nom::combinator::peek;
use nom_derive::*;

use crate::{
    BgpHeader, BgpPacket, BgpType, NotificationPacket, OpenPacket, ParseError, RouteRefreshPacket,
    UpdatePacket, BGP_PACKET_HEADER_LEN, BGP_PACKET_MAX_LEN,
};

pub fn peek_bgp_length(input: &[u8]) -> usize {
    if let Some(len) = input.get(16..18) {
        u16::from_be_bytes(len.try_into().unwrap()) as usize
    } else {
        0
    }
}

/// Validate the fixed 19 byte header: all-ones marker, length within
/// [19, 4096], known type code. The caller must supply at least 19 bytes.
pub fn validate_bgp_header(input: &[u8]) -> Result<(), ParseError> {
    if input[..16].iter().any(|b| *b != 0xff) {
        return Err(ParseError::BadMarker);
    }
    let length = u16::from_be_bytes(input[16..18].try_into().unwrap());
    if length < BGP_PACKET_HEADER_LEN || length as usize > BGP_PACKET_MAX_LEN {
        return Err(ParseError::BadLength(length));
    }
    let typ = input[18];
    if typ == 0 || typ > BgpType::RouteRefresh as u8 {
        return Err(ParseError::BadType(typ));
    }
    Ok(())
}

/// Decode one complete message. `input` must be exactly one message as
/// delimited by the header length field; the header itself is expected to
/// have passed [`validate_bgp_header`].
pub fn parse_bgp_packet(input: &[u8]) -> Result<BgpPacket, ParseError> {
    let (_, header) =
        peek(BgpHeader::parse)(input).map_err(|_| ParseError::BadLength(input.len() as u16))?;
    match header.typ {
        BgpType::Open => OpenPacket::parse_packet(input)
            .map(|(_, p)| BgpPacket::Open(p))
            .map_err(|_| ParseError::BadBody(BgpType::Open)),
        BgpType::Update => UpdatePacket::parse_packet(input)
            .map(|(_, p)| BgpPacket::Update(p))
            .map_err(|_| ParseError::BadBody(BgpType::Update)),
        BgpType::Notification => NotificationPacket::parse_packet(input)
            .map(|(_, p)| BgpPacket::Notification(p))
            .map_err(|_| ParseError::BadBody(BgpType::Notification)),
        BgpType::Keepalive => {
            if header.length != BGP_PACKET_HEADER_LEN {
                return Err(ParseError::BadLength(header.length));
            }
            Ok(BgpPacket::Keepalive(header))
        }
        BgpType::RouteRefresh => {
            if header.length != BGP_PACKET_HEADER_LEN + 4 {
                return Err(ParseError::BadLength(header.length));
            }
            RouteRefreshPacket::parse(input)
                .map(|(_, p)| BgpPacket::RouteRefresh(p))
                .map_err(|_| ParseError::BadBody(BgpType::RouteRefresh))
        }
    }
}
