use std::fmt::Display;

use bytes::{BufMut, BytesMut};
use nom::bytes::complete::take;
use nom::IResult;
use nom_derive::*;
use rusticata_macros::newtype_enum;

use crate::{BgpHeader, BgpType, BGP_PACKET_HEADER_LEN};

#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct NotificationPacket {
    pub header: BgpHeader,
    pub code: NotifyCode,
    pub sub_code: u8,
    #[nom(Ignore)]
    pub data: Vec<u8>,
}

impl NotificationPacket {
    pub fn new(code: NotifyCode, sub_code: u8, data: Vec<u8>) -> Self {
        Self {
            header: BgpHeader::new(BgpType::Notification, BGP_PACKET_HEADER_LEN),
            code,
            sub_code,
            data,
        }
    }

    pub fn parse_packet(input: &[u8]) -> IResult<&[u8], NotificationPacket> {
        let (input, mut packet) = NotificationPacket::parse(input)?;
        let len = packet
            .header
            .length
            .saturating_sub(BGP_PACKET_HEADER_LEN + 2);
        let (input, data) = take(len as usize)(input)?;
        packet.data = data.to_vec();
        Ok((input, packet))
    }
}

impl Display for NotificationPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Notification")?;
        writeln!(f, " Code: {}", self.code)?;
        writeln!(
            f,
            " Sub Code: {}",
            notify_sub_code_str(self.code, self.sub_code)
        )?;
        Ok(())
    }
}

impl From<NotificationPacket> for BytesMut {
    fn from(notification: NotificationPacket) -> Self {
        let mut buf = BytesMut::new();
        let header: BytesMut = notification.header.into();
        buf.put(&header[..]);
        buf.put_u8(notification.code.0);
        buf.put_u8(notification.sub_code);
        buf.put(&notification.data[..]);

        const LENGTH_POS: std::ops::Range<usize> = 16..18;
        let length: u16 = buf.len() as u16;
        buf[LENGTH_POS].copy_from_slice(&length.to_be_bytes());

        buf
    }
}

/// NOTIFICATION error code. A newtype so that codes outside the RFC range,
/// fuzzer-produced or otherwise, survive a decode/encode round trip.
#[derive(Debug, Clone, Copy, Eq, PartialEq, NomBE)]
pub struct NotifyCode(pub u8);

newtype_enum! {
impl display NotifyCode {
    MsgHeaderError = 1,
    OpenMsgError = 2,
    UpdateMsgError = 3,
    HoldTimerExpired = 4,
    FsmError = 5,
    Cease = 6,
}
}

fn notify_sub_code_str(code: NotifyCode, sub_code: u8) -> String {
    if code == NotifyCode::OpenMsgError {
        sub_open_error_str(sub_code.into())
    } else if code == NotifyCode::HoldTimerExpired {
        "Hold Timer Expired".into()
    } else {
        format!("{}", sub_code)
    }
}

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OpenError {
    UnsupportedVersionNumber = 1,
    BadPeerAS = 2,
    BadBgpIdentifier = 3,
    UnsupportedOptionalParameter = 4,
    // [Deprecated] = 5
    UnacceptableHoldTime = 6,
    Unknown(u8),
}

impl From<u8> for OpenError {
    fn from(sub_code: u8) -> Self {
        use OpenError::*;
        match sub_code {
            1 => UnsupportedVersionNumber,
            2 => BadPeerAS,
            3 => BadBgpIdentifier,
            4 => UnsupportedOptionalParameter,
            6 => UnacceptableHoldTime,
            v => Unknown(v),
        }
    }
}

impl From<OpenError> for u8 {
    fn from(error: OpenError) -> Self {
        use OpenError::*;
        match error {
            UnsupportedVersionNumber => 1,
            BadPeerAS => 2,
            BadBgpIdentifier => 3,
            UnsupportedOptionalParameter => 4,
            UnacceptableHoldTime => 6,
            Unknown(v) => v,
        }
    }
}

fn sub_open_error_str(sub_code: OpenError) -> String {
    use OpenError::*;
    match sub_code {
        UnsupportedVersionNumber => "Unsupported Version Number".into(),
        BadPeerAS => "Bad Peer AS".into(),
        BadBgpIdentifier => "Bad BGP Identifier".into(),
        UnsupportedOptionalParameter => "Unsupported Optional Parameter".into(),
        UnacceptableHoldTime => "Unacceptable Hold Time".into(),
        Unknown(v) => format!("Unknown({})", v),
    }
}
