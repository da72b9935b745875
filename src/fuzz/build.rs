use bytes::BytesMut;

use crate::bgp_debug;
use crate::{
    BgpPacket, FuzzSpec, FuzzValue, MessageFuzz, StrategyRegistry, KIND_KEEPALIVE,
    KIND_NOTIFICATION, KIND_OPEN, KIND_UPDATE,
};

/// One named field of a serialized message. The concatenation of all
/// segments in order is the wire image.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBytes {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

/// Produce the outbound bytes for `msg`. With no spec attached this is a
/// pure function of the message; with a spec, enabled fields are rewritten
/// (base value first, then each strategy in order) before concatenation.
/// This is the only place outbound bytes originate, so any message is
/// intercepted at most once.
pub fn build_message(
    msg: &BgpPacket,
    spec: Option<&FuzzSpec>,
    registry: &StrategyRegistry,
) -> BytesMut {
    let (kind, mut fields) = segments(msg);
    if let Some(message_spec) = spec.and_then(|s| s.message(kind)) {
        apply(kind, message_spec, &mut fields, registry);
    }
    assemble(&fields)
}

/// Cut the canonical encoding into named field segments, in wire order.
pub fn segments(msg: &BgpPacket) -> (&'static str, Vec<FieldBytes>) {
    match msg {
        BgpPacket::Open(p) => {
            let buf: BytesMut = p.clone().into();
            (
                KIND_OPEN,
                cut(
                    &buf,
                    &[
                        "header",
                        "version",
                        "my_as",
                        "hold_time",
                        "bgp_id",
                        "opt_param_len",
                        "opt_params",
                    ],
                    &[19, 20, 22, 24, 28, 29],
                ),
            )
        }
        BgpPacket::Update(p) => {
            let buf: BytesMut = p.clone().into();
            let withdrawn = p.withdrawn_routes.len();
            let attrs = p.path_attrs.len();
            (
                KIND_UPDATE,
                cut(
                    &buf,
                    &[
                        "header",
                        "withdrawn_routes_len",
                        "withdrawn_routes",
                        "path_attr_len",
                        "path_attr",
                        "nlri",
                    ],
                    &[19, 21, 21 + withdrawn, 23 + withdrawn, 23 + withdrawn + attrs],
                ),
            )
        }
        BgpPacket::Notification(p) => {
            let buf: BytesMut = p.clone().into();
            (
                KIND_NOTIFICATION,
                cut(
                    &buf,
                    &["header", "error_code", "error_subcode", "data"],
                    &[19, 20, 21],
                ),
            )
        }
        BgpPacket::Keepalive(header) => {
            let buf: BytesMut = header.clone().into();
            (KIND_KEEPALIVE, cut(&buf, &["header"], &[]))
        }
        BgpPacket::RouteRefresh(p) => {
            let buf: BytesMut = p.clone().into();
            (
                "BGPRouteRefresh",
                cut(&buf, &["header", "afi", "res", "safi"], &[19, 21, 22]),
            )
        }
    }
}

fn cut(buf: &[u8], names: &[&'static str], cuts: &[usize]) -> Vec<FieldBytes> {
    let mut fields = Vec::with_capacity(names.len());
    let mut start = 0;
    for (idx, &name) in names.iter().enumerate() {
        let end = if idx < cuts.len() { cuts[idx] } else { buf.len() };
        fields.push(FieldBytes {
            name,
            bytes: buf[start..end].to_vec(),
        });
        start = end;
    }
    fields
}

// Length fields recomputed after a base-value override, widest scope last.
// An explicitly overridden length field is left alone.
fn derived_lengths(kind: &str) -> &'static [(&'static str, &'static str)] {
    match kind {
        KIND_OPEN => &[("opt_param_len", "opt_params")],
        KIND_UPDATE => &[
            ("withdrawn_routes_len", "withdrawn_routes"),
            ("path_attr_len", "path_attr"),
        ],
        _ => &[],
    }
}

fn apply(kind: &str, spec: &MessageFuzz, fields: &mut [FieldBytes], registry: &StrategyRegistry) {
    // Base value pass.
    let mut overridden: Vec<&'static str> = Vec::new();
    for field in fields.iter_mut() {
        let Some(fuzz) = spec.get(field.name) else {
            continue;
        };
        if !fuzz.enabled {
            continue;
        }
        if let FuzzValue::Bytes(bytes) = &fuzz.value {
            bgp_debug!(field = field.name, len = bytes.len(), "fuzz value override");
            field.bytes = bytes.clone();
            overridden.push(field.name);
        }
    }

    // Re-derive section lengths and the header length so that an override
    // still serializes to a structurally coherent message. Strategies run
    // after this and may corrupt the lengths on purpose.
    for (len_name, src_name) in derived_lengths(kind) {
        if overridden.contains(len_name) {
            continue;
        }
        let Some(len) = fields
            .iter()
            .find(|f| f.name == *src_name)
            .map(|f| f.bytes.len())
        else {
            continue;
        };
        if let Some(field) = fields.iter_mut().find(|f| f.name == *len_name) {
            match field.bytes.len() {
                1 => field.bytes = vec![u8::try_from(len).unwrap_or(u8::MAX)],
                2 => {
                    field.bytes = u16::try_from(len).unwrap_or(u16::MAX).to_be_bytes().to_vec();
                }
                _ => {}
            }
        }
    }
    if !overridden.contains(&"header") && fields[0].name == "header" && fields[0].bytes.len() >= 19
    {
        let total: usize = fields.iter().map(|f| f.bytes.len()).sum();
        let total = u16::try_from(total).unwrap_or(u16::MAX);
        fields[0].bytes[16..18].copy_from_slice(&total.to_be_bytes());
    }

    // Strategy pass, in field definition order.
    for field in fields.iter_mut() {
        let Some(fuzz) = spec.get(field.name) else {
            continue;
        };
        if !fuzz.enabled {
            continue;
        }
        for name in &fuzz.strategies {
            bgp_debug!(field = field.name, strategy = name.as_str(), "fuzz strategy");
            registry.apply(name, &mut field.bytes);
        }
    }
}

fn assemble(fields: &[FieldBytes]) -> BytesMut {
    let mut buf = BytesMut::new();
    for field in fields {
        buf.extend_from_slice(&field.bytes);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BgpHeader, BgpType, FieldFuzz, NotificationPacket, NotifyCode, OpenPacket, UpdatePacket,
        BGP_PACKET_HEADER_LEN,
    };
    use std::net::Ipv4Addr;

    fn open_msg() -> BgpPacket {
        BgpPacket::Open(OpenPacket::new(65001, 90, &Ipv4Addr::new(1, 1, 1, 1)))
    }

    #[test]
    fn build_without_spec_is_canonical() {
        let registry = StrategyRegistry::new();
        for msg in [
            open_msg(),
            BgpPacket::Keepalive(BgpHeader::new(BgpType::Keepalive, BGP_PACKET_HEADER_LEN)),
            BgpPacket::Notification(NotificationPacket::new(NotifyCode::Cease, 0, vec![1, 2])),
            BgpPacket::Update(UpdatePacket::new()),
        ] {
            let built = build_message(&msg, None, &registry);
            let canonical: BytesMut = msg.into();
            assert_eq!(built, canonical);
        }
    }

    #[test]
    fn disabled_fields_are_untouched() {
        let registry = StrategyRegistry::new();
        let spec = FuzzSpec::template();
        let built = build_message(&open_msg(), Some(&spec), &registry);
        let canonical: BytesMut = open_msg().into();
        assert_eq!(built, canonical);
    }

    #[test]
    fn bitflip_on_my_as_touches_one_bit() {
        let registry = StrategyRegistry::new();
        let mut spec = FuzzSpec::new();
        spec.set(KIND_OPEN, "my_as", FieldFuzz::strategy("bitflip"));

        let canonical: BytesMut = open_msg().into();
        let built = build_message(&open_msg(), Some(&spec), &registry);
        assert_eq!(built.len(), canonical.len());

        let diff_bits: u32 = canonical
            .iter()
            .zip(built.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        assert_eq!(diff_bits, 1);

        // Everything outside the two my_as octets is identical.
        assert_eq!(&built[..20], &canonical[..20]);
        assert_eq!(&built[22..], &canonical[22..]);
    }

    #[test]
    fn increment_on_error_code() {
        let registry = StrategyRegistry::new();
        let mut spec = FuzzSpec::new();
        spec.set(KIND_NOTIFICATION, "error_code", FieldFuzz::strategy("increment"));

        let msg = BgpPacket::Notification(NotificationPacket::new(NotifyCode::Cease, 0, Vec::new()));
        let built = build_message(&msg, Some(&spec), &registry);
        assert_eq!(built[19], 7);
        assert_eq!(built[20], 0);
    }

    #[test]
    fn value_override_recomputes_lengths() {
        let registry = StrategyRegistry::new();
        let mut spec = FuzzSpec::new();
        spec.set(
            KIND_OPEN,
            "opt_params",
            FieldFuzz::value(vec![0xde, 0xad, 0xbe, 0xef]),
        );

        let built = build_message(&open_msg(), Some(&spec), &registry);
        assert_eq!(built.len(), 33);
        // Header length and opt_param_len follow the override.
        assert_eq!(&built[16..18], &[0x00, 0x21]);
        assert_eq!(built[28], 4);
        assert_eq!(&built[29..], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn strategies_apply_in_order() {
        let mut registry = StrategyRegistry::new();
        registry.register("zero", Box::new(|bytes| bytes.fill(0)));
        let mut spec = FuzzSpec::new();
        spec.set(
            KIND_NOTIFICATION,
            "error_code",
            FieldFuzz {
                enabled: true,
                value: FuzzValue::Default,
                strategies: vec!["zero".to_string(), "increment".to_string()],
            },
        );

        let msg = BgpPacket::Notification(NotificationPacket::new(NotifyCode::Cease, 0, Vec::new()));
        let built = build_message(&msg, Some(&spec), &registry);
        assert_eq!(built[19], 1);
    }

    #[test]
    fn update_segment_names() {
        let mut update = UpdatePacket::new();
        update.withdrawn_routes = vec![24, 10, 0, 1];
        update.path_attrs = vec![0x40, 0x01, 0x01, 0x00];
        update.nlri = vec![16, 172, 16];
        let (kind, fields) = segments(&BgpPacket::Update(update));
        assert_eq!(kind, KIND_UPDATE);
        let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "header",
                "withdrawn_routes_len",
                "withdrawn_routes",
                "path_attr_len",
                "path_attr",
                "nlri"
            ]
        );
        assert_eq!(fields[1].bytes, vec![0x00, 0x04]);
        assert_eq!(fields[2].bytes, vec![24, 10, 0, 1]);
        assert_eq!(fields[5].bytes, vec![16, 172, 16]);
    }
}
