use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::watch;

use crate::fsm::peer::{fsm, Event, Peer, State, BGP_PORT};
use crate::fsm::timer;
use crate::fuzz::{FuzzSpec, SharedFuzzSpec, StrategyRegistry};
use crate::task::Task;

/// Raised synchronously at session construction; nothing else escapes the
/// state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("local AS number must not be zero")]
    ZeroAs,
    #[error("BGP identifier must not be 0.0.0.0")]
    ZeroBgpId,
    #[error("hold time must be zero or at least 3 seconds, got {0}")]
    HoldTime(u16),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub peer: Ipv4Addr,
    pub port: u16,
    pub local_as: u16,
    pub bgp_id: Ipv4Addr,
    pub timers: timer::Config,
    pub fuzz: Option<FuzzSpec>,
}

impl SessionConfig {
    pub fn new(peer: Ipv4Addr, local_as: u16, bgp_id: Ipv4Addr) -> Self {
        Self {
            peer,
            port: BGP_PORT,
            local_as,
            bgp_id,
            timers: timer::Config::default(),
            fuzz: None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.local_as == 0 {
            return Err(ConfigError::ZeroAs);
        }
        if self.bgp_id.is_unspecified() {
            return Err(ConfigError::ZeroBgpId);
        }
        if let Some(hold_time) = self.timers.hold_time {
            if hold_time > 0 && hold_time < 3 {
                return Err(ConfigError::HoldTime(hold_time));
            }
        }
        Ok(())
    }
}

/// FSM state and retry counter as last observed from the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: State,
    pub retry_counter: u32,
}

/// Handle for one BGP session. The state machine runs on its own event
/// loop task; the handle only posts events and swaps the fuzz spec.
/// Dropping the handle aborts the loop and everything the session owns.
#[derive(Debug)]
pub struct Session {
    tx: mpsc::UnboundedSender<Event>,
    fuzz: SharedFuzzSpec,
    status: watch::Receiver<SessionStatus>,
    _task: Task<()>,
}

impl Session {
    /// Create the session and spawn its event loop. Must be called from
    /// within a Tokio runtime. The session stays in Idle until `start`.
    pub fn new(config: SessionConfig) -> Result<Session, ConfigError> {
        Self::with_strategies(config, StrategyRegistry::new())
    }

    /// Like [`Session::new`] but with caller-registered fuzz strategies.
    pub fn with_strategies(
        mut config: SessionConfig,
        registry: StrategyRegistry,
    ) -> Result<Session, ConfigError> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let fuzz: SharedFuzzSpec = Arc::new(RwLock::new(config.fuzz.take().map(Arc::new)));
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: State::Idle,
            retry_counter: 0,
        });
        let peer = Peer::new(
            config.peer,
            config.port,
            config.local_as,
            config.bgp_id,
            config.timers,
            tx.clone(),
            fuzz.clone(),
            Arc::new(registry),
        );
        let task = Task::spawn(session_loop(peer, rx, status_tx));
        Ok(Session {
            tx,
            fuzz,
            status: status_rx,
            _task: task,
        })
    }

    /// Post ManualStart; the session begins connecting on the next loop turn.
    pub fn start(&self) {
        let _ = self.tx.send(Event::ManualStart);
    }

    /// Post ManualStop. Idempotent and never errors; teardown happens on
    /// the next loop turn.
    pub fn stop(&self) {
        let _ = self.tx.send(Event::ManualStop);
    }

    /// Attach a fuzz spec. Valid in any state; takes effect for messages
    /// built afterwards.
    pub fn attach_fuzz_spec(&self, spec: FuzzSpec) {
        *self.fuzz.write().unwrap() = Some(Arc::new(spec));
    }

    pub fn detach_fuzz_spec(&self) {
        *self.fuzz.write().unwrap() = None;
    }

    pub fn state(&self) -> State {
        self.status.borrow().state
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch channel for state observation; used by drivers and tests to
    /// wait for transitions without polling.
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

async fn session_loop(
    mut peer: Peer,
    mut rx: UnboundedReceiver<Event>,
    status: watch::Sender<SessionStatus>,
) {
    while let Some(event) = rx.recv().await {
        fsm(&mut peer, event);
        let _ = status.send_if_modified(|current| {
            let next = SessionStatus {
                state: peer.state,
                retry_counter: peer.retry_counter,
            };
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_rejects_zero_as() {
        let config = SessionConfig::new(Ipv4Addr::LOCALHOST, 0, Ipv4Addr::new(1, 1, 1, 1));
        assert_eq!(config.validate(), Err(ConfigError::ZeroAs));
    }

    #[test]
    fn construction_rejects_zero_bgp_id() {
        let config = SessionConfig::new(Ipv4Addr::LOCALHOST, 65001, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.validate(), Err(ConfigError::ZeroBgpId));
    }

    #[test]
    fn construction_rejects_short_hold_time() {
        let mut config = SessionConfig::new(Ipv4Addr::LOCALHOST, 65001, Ipv4Addr::new(1, 1, 1, 1));
        config.timers.hold_time = Some(2);
        assert_eq!(config.validate(), Err(ConfigError::HoldTime(2)));

        config.timers.hold_time = Some(0);
        assert_eq!(config.validate(), Ok(()));
        config.timers.hold_time = Some(3);
        assert_eq!(config.validate(), Ok(()));
    }
}
