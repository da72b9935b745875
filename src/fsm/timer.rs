use std::cmp::min;

use crate::bgp_debug;
use crate::packet::OpenPacket;
use crate::task::Timer;

use super::peer::{Event, Peer};

/// Session timer durations in seconds. Unset values fall back to the
/// defaults below. A zero value disables the timer in question.
#[derive(Debug, Default, Clone)]
pub struct Config {
    pub connect_retry_time: Option<u16>,
    pub hold_time: Option<u16>,
    pub keepalive_time: Option<u16>,
}

impl Config {
    const DEFAULT_CONNECT_RETRY_TIME: u64 = 5;
    const DEFAULT_HOLD_TIME: u64 = 90;
    const DEFAULT_KEEPALIVE_TIME: u64 = 30;

    pub fn connect_retry_time(&self) -> u64 {
        if let Some(connect_retry_time) = self.connect_retry_time {
            connect_retry_time as u64
        } else {
            Self::DEFAULT_CONNECT_RETRY_TIME
        }
    }

    pub fn hold_time(&self) -> u64 {
        if let Some(hold_time) = self.hold_time {
            hold_time as u64
        } else {
            Self::DEFAULT_HOLD_TIME
        }
    }

    pub fn keepalive_time(&self) -> u64 {
        if let Some(keepalive_time) = self.keepalive_time {
            keepalive_time as u64
        } else {
            Self::DEFAULT_KEEPALIVE_TIME
        }
    }
}

// Hold time used between OPEN transmission and negotiation. RFC 4271
// suggests a large value; 4 minutes is the one it names.
const OPEN_HOLD_TIME: u64 = 240;

macro_rules! start_timer {
    ($peer:expr, $time:expr, $ev:expr) => {{
        let tx = $peer.tx.clone();

        Timer::once($time, move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send($ev);
            }
        })
    }};
}

macro_rules! start_repeater {
    ($peer:expr, $time:expr, $ev:expr) => {{
        let tx = $peer.tx.clone();

        Timer::repeat($time, move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send($ev);
            }
        })
    }};
}

pub fn start_connect_retry_timer(peer: &Peer) -> Option<Timer> {
    let secs = peer.config.connect_retry_time();
    if secs == 0 {
        return None;
    }
    bgp_debug!(peer = %peer.address, secs, "arm connect retry timer");
    Some(start_timer!(peer, secs, Event::ConnRetryTimerExpires))
}

/// Large pre-negotiation hold timer, armed when the OPEN goes out.
pub fn start_open_hold_timer(peer: &Peer) -> Option<Timer> {
    bgp_debug!(peer = %peer.address, secs = OPEN_HOLD_TIME, "arm initial hold timer");
    Some(start_timer!(peer, OPEN_HOLD_TIME, Event::HoldTimerExpires))
}

pub fn start_hold_timer(peer: &Peer) -> Option<Timer> {
    let secs = peer.param.hold_time as u64;
    if secs == 0 {
        return None;
    }
    bgp_debug!(peer = %peer.address, secs, "arm hold timer");
    Some(start_timer!(peer, secs, Event::HoldTimerExpires))
}

pub fn start_keepalive_timer(peer: &Peer) -> Option<Timer> {
    let secs = peer.param.keepalive as u64;
    if secs == 0 {
        return None;
    }
    bgp_debug!(peer = %peer.address, secs, "arm keepalive timer");
    Some(start_repeater!(peer, secs, Event::KeepaliveTimerExpires))
}

pub fn refresh_hold_timer(peer: &Peer) {
    if let Some(hold_timer) = peer.timer.hold_timer.as_ref() {
        hold_timer.refresh();
    }
}

/// Apply the hold time offered in the peer's OPEN and (re)arm the hold and
/// keepalive timers. A zero hold time suppresses both permanently.
pub fn negotiate(peer: &mut Peer, packet: &OpenPacket) {
    if packet.hold_time == 0 {
        peer.param.hold_time = 0;
        peer.param.keepalive = 0;
    } else {
        let hold_time = min(packet.hold_time as u64, peer.config.hold_time());
        peer.param.hold_time = hold_time as u16;
        peer.param.keepalive = min(peer.config.keepalive_time(), hold_time / 3) as u16;
    }
    peer.timer.hold_timer = start_hold_timer(peer);
    peer.timer.keepalive = start_keepalive_timer(peer);
}
