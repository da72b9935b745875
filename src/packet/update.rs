use bytes::{BufMut, BytesMut};
use ipnet::Ipv4Net;
use nom::bytes::complete::take;
use nom::combinator::complete;
use nom::error::{make_error, ErrorKind};
use nom::multi::many0;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;
use nom_derive::*;
use std::net::Ipv4Addr;

use crate::{BgpHeader, BgpType, ParseError, BGP_PACKET_HEADER_LEN};

/// UPDATE message. The withdrawn-routes and path-attribute sections are kept
/// as byte-accurate blobs; only the section lengths are interpreted. Route
/// processing happens elsewhere, so the blobs exist to round-trip and to be
/// fuzzed.
#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct UpdatePacket {
    pub header: BgpHeader,
    #[nom(Ignore)]
    pub withdrawn_routes: Vec<u8>,
    #[nom(Ignore)]
    pub path_attrs: Vec<u8>,
    #[nom(Ignore)]
    pub nlri: Vec<u8>,
}

impl UpdatePacket {
    pub fn new() -> Self {
        Self {
            header: BgpHeader::new(BgpType::Update, BGP_PACKET_HEADER_LEN + 4),
            withdrawn_routes: Vec::new(),
            path_attrs: Vec::new(),
            nlri: Vec::new(),
        }
    }

    pub fn parse_packet(input: &[u8]) -> IResult<&[u8], UpdatePacket> {
        let (input, mut packet) = UpdatePacket::parse(input)?;
        let (input, withdrawn_len) = be_u16(input)?;
        let (input, withdrawn) = take(withdrawn_len as usize)(input)?;
        let (input, attr_len) = be_u16(input)?;
        let (input, attrs) = take(attr_len as usize)(input)?;
        let nlri_len = (packet.header.length as usize)
            .checked_sub(
                BGP_PACKET_HEADER_LEN as usize + 4 + withdrawn_len as usize + attr_len as usize,
            )
            .ok_or_else(|| nom::Err::Error(make_error(input, ErrorKind::LengthValue)))?;
        let (input, nlri) = take(nlri_len)(input)?;
        packet.withdrawn_routes = withdrawn.to_vec();
        packet.path_attrs = attrs.to_vec();
        packet.nlri = nlri.to_vec();
        Ok((input, packet))
    }

    /// Decode the NLRI section into prefixes.
    pub fn nlri_prefixes(&self) -> Result<Vec<Ipv4Net>, ParseError> {
        parse_nlri(&self.nlri)
    }

    /// Decode the withdrawn-routes section into prefixes.
    pub fn withdrawn_prefixes(&self) -> Result<Vec<Ipv4Net>, ParseError> {
        parse_nlri(&self.withdrawn_routes)
    }
}

impl Default for UpdatePacket {
    fn default() -> Self {
        Self::new()
    }
}

impl From<UpdatePacket> for BytesMut {
    fn from(update: UpdatePacket) -> Self {
        let mut buf = BytesMut::new();
        let header: BytesMut = update.header.into();
        buf.put(&header[..]);
        buf.put_u16(update.withdrawn_routes.len() as u16);
        buf.put(&update.withdrawn_routes[..]);
        buf.put_u16(update.path_attrs.len() as u16);
        buf.put(&update.path_attrs[..]);
        buf.put(&update.nlri[..]);

        const LENGTH_POS: std::ops::Range<usize> = 16..18;
        let length: u16 = buf.len() as u16;
        buf[LENGTH_POS].copy_from_slice(&length.to_be_bytes());

        buf
    }
}

pub fn nlri_psize(plen: u8) -> usize {
    ((plen + 7) / 8) as usize
}

fn parse_nlri_prefix(input: &[u8]) -> IResult<&[u8], Ipv4Net> {
    if input.is_empty() {
        return Err(nom::Err::Error(make_error(input, ErrorKind::Eof)));
    }
    let (input, plen) = be_u8(input)?;
    if plen > 32 {
        return Err(nom::Err::Error(make_error(input, ErrorKind::Verify)));
    }
    let psize = nlri_psize(plen);
    if input.len() < psize {
        return Err(nom::Err::Error(make_error(input, ErrorKind::Eof)));
    }
    let mut paddr = [0u8; 4];
    paddr[..psize].copy_from_slice(&input[..psize]);
    let (input, _) = take(psize)(input)?;
    let prefix = Ipv4Net::new(Ipv4Addr::from(paddr), plen)
        .map_err(|_| nom::Err::Error(make_error(input, ErrorKind::Verify)))?;
    Ok((input, prefix))
}

fn parse_nlri(blob: &[u8]) -> Result<Vec<Ipv4Net>, ParseError> {
    let (rest, prefixes) = many0(complete(parse_nlri_prefix))(blob)
        .map_err(|_| ParseError::BadBody(BgpType::Update))?;
    if !rest.is_empty() {
        return Err(ParseError::BadBody(BgpType::Update));
    }
    Ok(prefixes)
}
