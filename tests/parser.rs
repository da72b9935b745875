use bytes::BytesMut;
use hex_literal::hex;
use protofuzz::*;

const OPEN: &[u8] = &hex!(
    "
ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff
00 1d 01 04 fd e9 00 5a 01 01 01 01 00
"
);

const OPEN_WITH_PARAMS: &[u8] = &hex!(
    "
ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff
00 25 01 04 fd e9 00 5a 01 01 01 01 08 02 06 01
04 00 01 00 01
"
);

const KEEPALIVE: &[u8] = &hex!(
    "
ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff
00 13 04
"
);

const NOTIFICATION: &[u8] = &hex!(
    "
ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff
00 17 03 06 00 de ad
"
);

const UPDATE: &[u8] = &hex!(
    "
ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff
00 1b 02 00 00 00 00 18 0a 00 01
"
);

const ROUTE_REFRESH: &[u8] = &hex!(
    "
ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff
00 17 05 00 01 00 01
"
);

#[test]
fn parse_open() {
    let packet = parse_bgp_packet(OPEN).unwrap();
    let open = match packet {
        BgpPacket::Open(open) => open,
        other => panic!("expected Open, got {:?}", other),
    };
    assert_eq!(open.version, 4);
    assert_eq!(open.asn, 65001);
    assert_eq!(open.hold_time, 90);
    assert_eq!(open.bgp_id, [1, 1, 1, 1]);
    assert_eq!(open.opt_param_len, 0);
    assert!(open.opt_params.is_empty());
}

#[test]
fn open_round_trip() {
    for vector in [OPEN, OPEN_WITH_PARAMS] {
        let packet = parse_bgp_packet(vector).unwrap();
        let buf: BytesMut = packet.into();
        assert_eq!(&buf[..], vector);
    }
}

#[test]
fn open_opt_params_preserved() {
    let packet = parse_bgp_packet(OPEN_WITH_PARAMS).unwrap();
    let open = match packet {
        BgpPacket::Open(open) => open,
        other => panic!("expected Open, got {:?}", other),
    };
    assert_eq!(open.opt_param_len, 8);
    assert_eq!(open.opt_params, hex!("02 06 01 04 00 01 00 01"));
}

#[test]
fn open_opt_param_len_mismatch_rejected() {
    // Claims 9 bytes of parameters but carries 8.
    let mut vector = OPEN_WITH_PARAMS.to_vec();
    vector[28] = 9;
    assert_eq!(
        parse_bgp_packet(&vector),
        Err(ParseError::BadBody(BgpType::Open))
    );
}

#[test]
fn parse_keepalive() {
    let packet = parse_bgp_packet(KEEPALIVE).unwrap();
    assert!(matches!(packet, BgpPacket::Keepalive(_)));
    let buf: BytesMut = packet.into();
    assert_eq!(&buf[..], KEEPALIVE);
}

#[test]
fn parse_notification() {
    let packet = parse_bgp_packet(NOTIFICATION).unwrap();
    let notification = match packet.clone() {
        BgpPacket::Notification(notification) => notification,
        other => panic!("expected Notification, got {:?}", other),
    };
    assert_eq!(notification.code, NotifyCode::Cease);
    assert_eq!(notification.sub_code, 0);
    assert_eq!(notification.data, vec![0xde, 0xad]);

    let buf: BytesMut = packet.into();
    assert_eq!(&buf[..], NOTIFICATION);
}

#[test]
fn parse_update() {
    let packet = parse_bgp_packet(UPDATE).unwrap();
    let update = match packet.clone() {
        BgpPacket::Update(update) => update,
        other => panic!("expected Update, got {:?}", other),
    };
    assert!(update.withdrawn_routes.is_empty());
    assert!(update.path_attrs.is_empty());
    assert_eq!(update.nlri, hex!("18 0a 00 01"));
    assert_eq!(
        update.nlri_prefixes().unwrap(),
        vec!["10.0.1.0/24".parse().unwrap()]
    );

    let buf: BytesMut = packet.into();
    assert_eq!(&buf[..], UPDATE);
}

#[test]
fn parse_route_refresh() {
    let packet = parse_bgp_packet(ROUTE_REFRESH).unwrap();
    let refresh = match packet {
        BgpPacket::RouteRefresh(refresh) => refresh,
        other => panic!("expected RouteRefresh, got {:?}", other),
    };
    assert_eq!(refresh.afi, 1);
    assert_eq!(refresh.safi, 1);
}

#[test]
fn header_length_boundaries() {
    // 18 is below the header size.
    let mut short = KEEPALIVE.to_vec();
    short[16..18].copy_from_slice(&18u16.to_be_bytes());
    assert_eq!(validate_bgp_header(&short), Err(ParseError::BadLength(18)));

    // 19 with type KEEPALIVE is the smallest valid message.
    assert_eq!(validate_bgp_header(KEEPALIVE), Ok(()));

    // 4096 is the largest valid message.
    let mut max = vec![0xffu8; 16];
    max.extend_from_slice(&4096u16.to_be_bytes());
    max.push(2);
    max.extend_from_slice(&[0, 0, 0, 0]);
    max.resize(4096, 0);
    assert_eq!(validate_bgp_header(&max), Ok(()));
    let packet = parse_bgp_packet(&max).unwrap();
    let buf: BytesMut = packet.into();
    assert_eq!(&buf[..], &max[..]);

    // 4097 is over the limit.
    let mut over = max.clone();
    over[16..18].copy_from_slice(&4097u16.to_be_bytes());
    assert_eq!(validate_bgp_header(&over), Err(ParseError::BadLength(4097)));
}

#[test]
fn header_marker_must_be_all_ones() {
    for bit in [0, 7, 63, 127] {
        let mut bad = KEEPALIVE.to_vec();
        bad[bit / 8] ^= 1 << (bit % 8);
        assert_eq!(validate_bgp_header(&bad), Err(ParseError::BadMarker));
    }
}

#[test]
fn header_type_codes() {
    let mut msg = KEEPALIVE.to_vec();
    msg[18] = 0;
    assert_eq!(validate_bgp_header(&msg), Err(ParseError::BadType(0)));
    msg[18] = 6;
    assert_eq!(validate_bgp_header(&msg), Err(ParseError::BadType(6)));
    for typ in 1..=5u8 {
        msg[18] = typ;
        assert_eq!(validate_bgp_header(&msg), Ok(()));
    }
}

#[test]
fn keepalive_with_body_rejected() {
    let mut bad = KEEPALIVE.to_vec();
    bad[16..18].copy_from_slice(&20u16.to_be_bytes());
    bad.push(0);
    assert_eq!(parse_bgp_packet(&bad), Err(ParseError::BadLength(20)));
}

#[test]
fn update_with_overflowing_sections_rejected() {
    // Section lengths larger than the message itself.
    let mut bad = UPDATE.to_vec();
    bad[19..21].copy_from_slice(&100u16.to_be_bytes());
    assert_eq!(
        parse_bgp_packet(&bad),
        Err(ParseError::BadBody(BgpType::Update))
    );
}
