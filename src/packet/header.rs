use std::fmt;

use bytes::{BufMut, BytesMut};
use nom_derive::*;

use crate::{NotificationPacket, OpenPacket, UpdatePacket};

pub const BGP_PACKET_MAX_LEN: usize = 4096;
pub const BGP_PACKET_HEADER_LEN: u16 = 19;

#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, NomBE)]
pub enum BgpType {
    Open = 1,
    Update = 2,
    Notification = 3,
    Keepalive = 4,
    RouteRefresh = 5,
}

impl fmt::Display for BgpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "Open",
            Self::Update => "Update",
            Self::Notification => "Notification",
            Self::Keepalive => "Keepalive",
            Self::RouteRefresh => "RouteRefresh",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct BgpHeader {
    pub marker: [u8; 16],
    pub length: u16,
    pub typ: BgpType,
}

impl BgpHeader {
    pub fn new(typ: BgpType, length: u16) -> Self {
        Self {
            marker: [0xffu8; 16],
            length,
            typ,
        }
    }
}

impl From<BgpHeader> for BytesMut {
    fn from(header: BgpHeader) -> Self {
        let mut buf = BytesMut::new();
        buf.put(&header.marker[..]);
        buf.put_u16(header.length);
        buf.put_u8(header.typ as u8);
        buf
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BgpPacket {
    Open(OpenPacket),
    Update(UpdatePacket),
    Notification(NotificationPacket),
    Keepalive(BgpHeader),
    RouteRefresh(RouteRefreshPacket),
}

impl BgpPacket {
    pub fn header(&self) -> &BgpHeader {
        match self {
            Self::Open(p) => &p.header,
            Self::Update(p) => &p.header,
            Self::Notification(p) => &p.header,
            Self::Keepalive(header) => header,
            Self::RouteRefresh(p) => &p.header,
        }
    }
}

impl From<BgpPacket> for BytesMut {
    fn from(packet: BgpPacket) -> Self {
        match packet {
            BgpPacket::Open(p) => p.into(),
            BgpPacket::Update(p) => p.into(),
            BgpPacket::Notification(p) => p.into(),
            BgpPacket::Keepalive(header) => header.into(),
            BgpPacket::RouteRefresh(p) => p.into(),
        }
    }
}

/// RFC 2918 ROUTE-REFRESH. Decoded for completeness, never acted upon.
#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct RouteRefreshPacket {
    pub header: BgpHeader,
    pub afi: u16,
    pub res: u8,
    pub safi: u8,
}

impl From<RouteRefreshPacket> for BytesMut {
    fn from(refresh: RouteRefreshPacket) -> Self {
        let mut buf = BytesMut::new();
        let header: BytesMut = refresh.header.into();
        buf.put(&header[..]);
        buf.put_u16(refresh.afi);
        buf.put_u8(refresh.res);
        buf.put_u8(refresh.safi);

        const LENGTH_POS: std::ops::Range<usize> = 16..18;
        let length: u16 = buf.len() as u16;
        buf[LENGTH_POS].copy_from_slice(&length.to_be_bytes());

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_emit() {
        let header = BgpHeader::new(BgpType::Keepalive, BGP_PACKET_HEADER_LEN);
        let buf: BytesMut = header.into();
        assert_eq!(buf.len(), 19);
        assert!(buf[..16].iter().all(|b| *b == 0xff));
        assert_eq!(&buf[16..18], &[0x00, 0x13]);
        assert_eq!(buf[18], 4);
    }

    #[test]
    fn type_display() {
        assert_eq!(BgpType::Open.to_string(), "Open");
        assert_eq!(BgpType::RouteRefresh.to_string(), "RouteRefresh");
    }
}
