use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const KIND_OPEN: &str = "BGPOpen";
pub const KIND_UPDATE: &str = "BGPUpdate";
pub const KIND_NOTIFICATION: &str = "BGPNotification";
pub const KIND_KEEPALIVE: &str = "BGPKeepalive";

/// Fuzz configuration: message kind -> field name -> what to do with the
/// field. The session never mutates an attached spec; replacing it is an
/// atomic pointer swap observed at the next message build.
pub type SharedFuzzSpec = Arc<RwLock<Option<Arc<FuzzSpec>>>>;

pub type MessageFuzz = BTreeMap<String, FieldFuzz>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuzzSpec(pub BTreeMap<String, MessageFuzz>);

impl FuzzSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known message kind and field, disabled, with the built-in
    /// strategies pre-listed. The starting point for interactive editing.
    pub fn template() -> Self {
        let mut spec = FuzzSpec::new();
        for (kind, fields) in [
            (KIND_OPEN, OPEN_FIELDS),
            (KIND_KEEPALIVE, KEEPALIVE_FIELDS),
            (KIND_UPDATE, UPDATE_FIELDS),
            (KIND_NOTIFICATION, NOTIFICATION_FIELDS),
        ] {
            let entry = fields
                .iter()
                .map(|field| (field.to_string(), FieldFuzz::default()))
                .collect();
            spec.0.insert(kind.to_string(), entry);
        }
        spec
    }

    pub fn message(&self, kind: &str) -> Option<&MessageFuzz> {
        self.0.get(kind)
    }

    pub fn set(&mut self, kind: &str, field: &str, fuzz: FieldFuzz) {
        self.0
            .entry(kind.to_string())
            .or_default()
            .insert(field.to_string(), fuzz);
    }

    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFuzz {
    pub enabled: bool,
    #[serde(default)]
    pub value: FuzzValue,
    #[serde(default)]
    pub strategies: Vec<String>,
}

impl FieldFuzz {
    /// Enabled entry applying a single named strategy to the default value.
    pub fn strategy(name: &str) -> Self {
        Self {
            enabled: true,
            value: FuzzValue::Default,
            strategies: vec![name.to_string()],
        }
    }

    /// Enabled entry overriding the field with literal bytes.
    pub fn value(bytes: Vec<u8>) -> Self {
        Self {
            enabled: true,
            value: FuzzValue::Bytes(bytes),
            strategies: Vec::new(),
        }
    }
}

impl Default for FieldFuzz {
    fn default() -> Self {
        Self {
            enabled: false,
            value: FuzzValue::Default,
            strategies: vec!["bitflip".to_string(), "increment".to_string()],
        }
    }
}

/// Either the keyword `"default"` (use the value the session would send) or
/// explicit replacement bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FuzzValue {
    #[default]
    Default,
    Bytes(Vec<u8>),
}

impl Serialize for FuzzValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FuzzValue::Default => serializer.serialize_str("default"),
            FuzzValue::Bytes(bytes) => bytes.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FuzzValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Keyword(String),
            Bytes(Vec<u8>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Keyword(word) if word == "default" => Ok(FuzzValue::Default),
            Raw::Keyword(word) => Err(D::Error::custom(format!(
                "expected \"default\" or a byte array, got \"{}\"",
                word
            ))),
            Raw::Bytes(bytes) => Ok(FuzzValue::Bytes(bytes)),
        }
    }
}

pub const OPEN_FIELDS: &[&str] = &[
    "header",
    "version",
    "my_as",
    "hold_time",
    "bgp_id",
    "opt_param_len",
    "opt_params",
];
pub const KEEPALIVE_FIELDS: &[&str] = &["header"];
pub const UPDATE_FIELDS: &[&str] = &[
    "withdrawn_routes_len",
    "withdrawn_routes",
    "path_attr_len",
    "path_attr",
    "nlri",
];
pub const NOTIFICATION_FIELDS: &[&str] = &["error_code", "error_subcode", "data"];
