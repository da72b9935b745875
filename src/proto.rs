use crate::{ConfigError, Session, SessionConfig, StrategyRegistry};

/// One fuzzable protocol implementation. Factories are handed to the
/// interactive shell explicitly; there is no global registry.
pub struct Protocol {
    pub name: &'static str,
    pub description: &'static str,
    pub create: fn(SessionConfig) -> Result<Session, ConfigError>,
}

pub fn protocols() -> Vec<Protocol> {
    vec![Protocol {
        name: "bgp",
        description: "BGP-4 speaker with a fuzzable message builder",
        create: Session::new,
    }]
}

pub fn list_protocols() -> Vec<&'static str> {
    protocols().iter().map(|proto| proto.name).collect()
}

/// Names of the built-in fuzz strategies. Sessions created with a custom
/// registry may know more; ask the registry in that case.
pub fn list_fuzzers() -> Vec<String> {
    StrategyRegistry::new().names()
}

/// Driver-facing helper: build and start a session for the named protocol.
pub fn start_session(name: &str, config: SessionConfig) -> anyhow::Result<Session> {
    let proto = protocols()
        .into_iter()
        .find(|proto| proto.name == name)
        .ok_or_else(|| anyhow::anyhow!("unknown protocol: {}", name))?;
    let session = (proto.create)(config)?;
    session.start();
    Ok(session)
}
