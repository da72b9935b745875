use crate::*;
use bytes::BytesMut;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::timer;
use crate::{bgp_debug, bgp_info, bgp_warn};

pub const BGP_PORT: u16 = 179;

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum State {
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

impl State {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connect => "Connect",
            Self::Active => "Active",
            Self::OpenSent => "OpenSent",
            Self::OpenConfirm => "OpenConfirm",
            Self::Established => "Established",
        }
    }

    pub fn is_established(&self) -> bool {
        *self == State::Established
    }
}

/// Mandatory event set from RFC 4271 section 8.1.
#[derive(Debug)]
pub enum Event {
    ManualStart,                       // 1
    ManualStop,                        // 2
    ConnRetryTimerExpires,             // 9
    HoldTimerExpires,                  // 10
    KeepaliveTimerExpires,             // 11
    TcpCrAcked(TcpStream),             // 16
    TcpConnectionConfirmed(TcpStream), // 17
    TcpConnectionFails,                // 18
    BgpOpen(OpenPacket),               // 19
    BgpHeaderErr(Vec<u8>),             // 21
    BgpOpenMsgErr,                     // 22
    NotifMsgVerErr,                    // 24
    NotifMsg(NotificationPacket),      // 25
    KeepAliveMsg,                      // 26
    UpdateMsg(UpdatePacket),           // 27
    UpdateMsgErr,                      // 28
}

#[derive(Debug, Default)]
pub struct PeerTask {
    pub connect: Option<Task<()>>,
    pub reader: Option<Task<()>>,
    pub writer: Option<Task<()>>,
}

#[derive(Debug, Default)]
pub struct PeerTimer {
    pub connect_retry: Option<Timer>,
    pub hold_timer: Option<Timer>,
    pub keepalive: Option<Timer>,
}

/// Negotiated session values, valid from OPEN exchange until teardown.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeerParam {
    pub hold_time: u16,
    pub keepalive: u16,
}

/// Per-peer session state. Owns the transport tasks and timers; everything
/// here is only ever touched from the session's event loop.
#[derive(Debug)]
pub struct Peer {
    pub address: Ipv4Addr,
    pub port: u16,
    pub local_as: u16,
    pub router_id: Ipv4Addr,
    pub state: State,
    pub retry_counter: u32,
    pub config: timer::Config,
    pub param: PeerParam,
    pub task: PeerTask,
    pub timer: PeerTimer,
    pub packet_tx: Option<UnboundedSender<BytesMut>>,
    pub tx: UnboundedSender<Event>,
    pub fuzz: SharedFuzzSpec,
    pub registry: Arc<StrategyRegistry>,
}

impl Peer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Ipv4Addr,
        port: u16,
        local_as: u16,
        router_id: Ipv4Addr,
        config: timer::Config,
        tx: UnboundedSender<Event>,
        fuzz: SharedFuzzSpec,
        registry: Arc<StrategyRegistry>,
    ) -> Self {
        Self {
            address,
            port,
            local_as,
            router_id,
            state: State::Idle,
            retry_counter: 0,
            config,
            param: PeerParam::default(),
            task: PeerTask::default(),
            timer: PeerTimer::default(),
            packet_tx: None,
            tx,
            fuzz,
            registry,
        }
    }

    pub fn event(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

/// Drive the state machine for one event. Events with no transition defined
/// for the current state are ignored; that is the Mandatory-subset behavior.
pub fn fsm(peer: &mut Peer, event: Event) {
    let prev_state = peer.state;
    peer.state = match event {
        Event::ManualStart => fsm_manual_start(peer),
        Event::ManualStop => fsm_manual_stop(peer),
        Event::ConnRetryTimerExpires => fsm_conn_retry_expires(peer),
        Event::HoldTimerExpires => fsm_holdtimer_expires(peer),
        Event::KeepaliveTimerExpires => fsm_keepalive_expires(peer),
        Event::TcpCrAcked(stream) | Event::TcpConnectionConfirmed(stream) => {
            fsm_connected(peer, stream)
        }
        Event::TcpConnectionFails => fsm_conn_fail(peer),
        Event::BgpOpen(packet) => fsm_bgp_open(peer, packet),
        Event::BgpHeaderErr(header) => fsm_header_err(peer, header),
        Event::BgpOpenMsgErr => fsm_open_msg_err(peer),
        Event::NotifMsgVerErr => fsm_notif_ver_err(peer),
        Event::NotifMsg(packet) => fsm_bgp_notification(peer, packet),
        Event::KeepAliveMsg => fsm_bgp_keepalive(peer),
        Event::UpdateMsg(packet) => fsm_bgp_update(peer, packet),
        Event::UpdateMsgErr => fsm_update_msg_err(peer),
    };
    if prev_state != peer.state {
        bgp_info!(
            peer = %peer.address,
            from = prev_state.to_str(),
            to = peer.state.to_str(),
            "state transition"
        );
    }
    if prev_state != State::Idle && peer.state == State::Idle {
        fsm_release(peer);
    }
}

/// Drop the connection resources on return to Idle. The writer is detached
/// instead of aborted so that a queued NOTIFICATION still reaches the wire
/// before the socket closes.
fn fsm_release(peer: &mut Peer) {
    peer.packet_tx = None;
    if let Some(mut writer) = peer.task.writer.take() {
        writer.detach();
    }
    peer.task.reader = None;
    peer.task.connect = None;
    peer.timer.hold_timer = None;
    peer.timer.keepalive = None;
    peer.param = PeerParam::default();
}

pub fn fsm_manual_start(peer: &mut Peer) -> State {
    match peer.state {
        State::Idle => {
            peer.retry_counter = 0;
            peer.task.connect = Some(peer_start_connection(peer));
            peer.timer.connect_retry = timer::start_connect_retry_timer(peer);
            State::Connect
        }
        _ => peer.state,
    }
}

pub fn fsm_manual_stop(peer: &mut Peer) -> State {
    match peer.state {
        State::Idle => State::Idle,
        State::Connect | State::Active => {
            peer.retry_counter = 0;
            peer.timer.connect_retry = None;
            State::Idle
        }
        State::OpenSent | State::OpenConfirm | State::Established => {
            peer_send_notification(peer, NotifyCode::Cease, 0, Vec::new());
            peer.retry_counter = 0;
            peer.timer.connect_retry = None;
            State::Idle
        }
    }
}

pub fn fsm_conn_retry_expires(peer: &mut Peer) -> State {
    match peer.state {
        State::Idle | State::Connect | State::Active => {
            peer.task.connect = Some(peer_start_connection(peer));
            peer.timer.connect_retry = timer::start_connect_retry_timer(peer);
            State::Connect
        }
        _ => peer.state,
    }
}

pub fn fsm_holdtimer_expires(peer: &mut Peer) -> State {
    match peer.state {
        State::OpenSent | State::OpenConfirm | State::Established => {
            peer_send_notification(peer, NotifyCode::HoldTimerExpired, 0, Vec::new());
            peer.retry_counter += 1;
            State::Idle
        }
        _ => peer.state,
    }
}

pub fn fsm_keepalive_expires(peer: &mut Peer) -> State {
    match peer.state {
        State::OpenConfirm | State::Established => {
            peer_send_keepalive(peer);
            peer.state
        }
        _ => peer.state,
    }
}

pub fn fsm_connected(peer: &mut Peer, stream: TcpStream) -> State {
    if peer.state != State::Connect {
        // Stale connect task; the stream drops here and the peer sees a
        // reset.
        return peer.state;
    }
    peer.task.connect = None;
    peer.timer.connect_retry = None;
    let (packet_tx, packet_rx) = tokio::sync::mpsc::unbounded_channel::<BytesMut>();
    peer.packet_tx = Some(packet_tx);
    let (read_half, write_half) = stream.into_split();
    peer.task.reader = Some(peer_start_reader(peer, read_half));
    peer.task.writer = Some(peer_start_writer(write_half, packet_rx));
    peer_send_open(peer);
    peer.timer.hold_timer = timer::start_open_hold_timer(peer);
    State::OpenSent
}

pub fn fsm_conn_fail(peer: &mut Peer) -> State {
    match peer.state {
        State::Idle => State::Idle,
        _ => {
            peer.retry_counter += 1;
            peer.timer.connect_retry = timer::start_connect_retry_timer(peer);
            State::Idle
        }
    }
}

pub fn fsm_bgp_open(peer: &mut Peer, packet: OpenPacket) -> State {
    if peer.state != State::OpenSent {
        bgp_debug!(peer = %peer.address, state = peer.state.to_str(), "OPEN ignored");
        return peer.state;
    }
    if packet.version != BGP_VERSION {
        return open_error_teardown(peer, OpenError::UnsupportedVersionNumber);
    }
    if packet.asn == peer.local_as {
        return open_error_teardown(peer, OpenError::BadPeerAS);
    }
    if packet.bgp_id == [0u8; 4] || packet.bgp_id == peer.router_id.octets() {
        return open_error_teardown(peer, OpenError::BadBgpIdentifier);
    }
    if packet.hold_time == 1 || packet.hold_time == 2 {
        return open_error_teardown(peer, OpenError::UnacceptableHoldTime);
    }
    timer::negotiate(peer, &packet);
    peer_send_keepalive(peer);
    State::OpenConfirm
}

pub fn fsm_header_err(peer: &mut Peer, header: Vec<u8>) -> State {
    match peer.state {
        State::OpenSent | State::OpenConfirm | State::Established => {
            // Not signalled back; a sender that framed this header would not
            // frame our NOTIFICATION either.
            bgp_warn!(
                peer = %peer.address,
                header_len = header.len(),
                "dropping connection on header error"
            );
            peer.retry_counter += 1;
            State::Idle
        }
        _ => peer.state,
    }
}

pub fn fsm_open_msg_err(peer: &mut Peer) -> State {
    match peer.state {
        State::OpenSent | State::OpenConfirm => {
            peer_send_notification(peer, NotifyCode::OpenMsgError, 0, Vec::new());
            peer.retry_counter += 1;
            State::Idle
        }
        _ => peer.state,
    }
}

pub fn fsm_notif_ver_err(peer: &mut Peer) -> State {
    match peer.state {
        State::OpenSent | State::OpenConfirm => State::Idle,
        _ => peer.state,
    }
}

pub fn fsm_bgp_notification(peer: &mut Peer, packet: NotificationPacket) -> State {
    match peer.state {
        State::OpenSent => fsm_error_teardown(peer),
        State::OpenConfirm | State::Established => {
            bgp_info!(peer = %peer.address, code = %packet.code, "notification from peer");
            peer.retry_counter += 1;
            State::Idle
        }
        _ => peer.state,
    }
}

pub fn fsm_bgp_keepalive(peer: &mut Peer) -> State {
    match peer.state {
        State::OpenConfirm | State::Established => {
            timer::refresh_hold_timer(peer);
            State::Established
        }
        State::OpenSent => fsm_error_teardown(peer),
        _ => peer.state,
    }
}

pub fn fsm_bgp_update(peer: &mut Peer, packet: UpdatePacket) -> State {
    match peer.state {
        State::Established => {
            // Route installation is out of scope; the UPDATE only feeds the
            // hold timer.
            if let Ok(prefixes) = packet.nlri_prefixes() {
                bgp_debug!(peer = %peer.address, nlri = prefixes.len(), "update ignored");
            }
            timer::refresh_hold_timer(peer);
            State::Established
        }
        State::OpenSent => fsm_error_teardown(peer),
        _ => {
            bgp_debug!(peer = %peer.address, state = peer.state.to_str(), "UPDATE ignored");
            peer.state
        }
    }
}

pub fn fsm_update_msg_err(peer: &mut Peer) -> State {
    match peer.state {
        State::OpenSent | State::OpenConfirm | State::Established => {
            peer_send_notification(peer, NotifyCode::UpdateMsgError, 0, Vec::new());
            peer.retry_counter += 1;
            State::Idle
        }
        _ => peer.state,
    }
}

fn fsm_error_teardown(peer: &mut Peer) -> State {
    peer_send_notification(peer, NotifyCode::FsmError, 0, Vec::new());
    peer.retry_counter += 1;
    State::Idle
}

fn open_error_teardown(peer: &mut Peer, sub_code: OpenError) -> State {
    bgp_warn!(peer = %peer.address, sub_code = ?sub_code, "OPEN validation failed");
    peer_send_notification(peer, NotifyCode::OpenMsgError, sub_code.into(), Vec::new());
    peer.retry_counter += 1;
    State::Idle
}

pub async fn peer_read(tx: UnboundedSender<Event>, mut read_half: OwnedReadHalf) {
    let mut framer = Framer::new();
    let mut rx_buf = [0u8; BGP_PACKET_MAX_LEN];
    loop {
        match read_half.read(&mut rx_buf).await {
            Ok(0) => {
                let _ = tx.send(Event::TcpConnectionFails);
                return;
            }
            Ok(rx_len) => {
                for output in framer.push(&rx_buf[..rx_len]) {
                    let fatal = output.is_fatal();
                    if let FrameOutput::Packet(packet) = &output {
                        bgp_info!(
                            typ = %packet.header().typ,
                            length = packet.header().length,
                            "recv message"
                        );
                    }
                    if let Some(event) = frame_event(output) {
                        let _ = tx.send(event);
                    }
                    if fatal {
                        return;
                    }
                }
            }
            Err(err) => {
                bgp_warn!(error = %err, "read failed");
                let _ = tx.send(Event::TcpConnectionFails);
                return;
            }
        }
    }
}

/// Map a framed message onto the FSM event set. ROUTE-REFRESH maps to
/// nothing; a NOTIFICATION carrying "unsupported version" becomes its own
/// event.
fn frame_event(output: FrameOutput) -> Option<Event> {
    match output {
        FrameOutput::Packet(BgpPacket::Open(p)) => Some(Event::BgpOpen(p)),
        FrameOutput::Packet(BgpPacket::Update(p)) => Some(Event::UpdateMsg(p)),
        FrameOutput::Packet(BgpPacket::Notification(p)) => {
            if p.code == NotifyCode::OpenMsgError
                && p.sub_code == u8::from(OpenError::UnsupportedVersionNumber)
            {
                Some(Event::NotifMsgVerErr)
            } else {
                Some(Event::NotifMsg(p))
            }
        }
        FrameOutput::Packet(BgpPacket::Keepalive(_)) => Some(Event::KeepAliveMsg),
        FrameOutput::Packet(BgpPacket::RouteRefresh(_)) => {
            bgp_debug!("route refresh ignored");
            None
        }
        FrameOutput::HeaderErr(header) => Some(Event::BgpHeaderErr(header)),
        FrameOutput::OpenErr => Some(Event::BgpOpenMsgErr),
        FrameOutput::UpdateErr => Some(Event::UpdateMsgErr),
    }
}

pub fn peer_start_reader(peer: &Peer, read_half: OwnedReadHalf) -> Task<()> {
    let tx = peer.tx.clone();
    Task::spawn(async move {
        peer_read(tx, read_half).await;
    })
}

pub fn peer_start_writer(
    mut write_half: OwnedWriteHalf,
    mut rx: UnboundedReceiver<BytesMut>,
) -> Task<()> {
    Task::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write_half.write_all(&msg).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    })
}

pub fn peer_start_connection(peer: &mut Peer) -> Task<()> {
    let tx = peer.tx.clone();
    let address = peer.address;
    let port = peer.port;
    Task::spawn(async move {
        match TcpStream::connect((address, port)).await {
            Ok(stream) => {
                let _ = tx.send(Event::TcpCrAcked(stream));
            }
            Err(err) => {
                bgp_warn!(peer = %address, error = %err, "connect failed");
                let _ = tx.send(Event::TcpConnectionFails);
            }
        }
    })
}

pub fn peer_send_open(peer: &mut Peer) {
    let open = OpenPacket::new(
        peer.local_as,
        peer.config.hold_time() as u16,
        &peer.router_id,
    );
    peer_send(peer, BgpPacket::Open(open));
}

pub fn peer_send_keepalive(peer: &mut Peer) {
    let header = BgpHeader::new(BgpType::Keepalive, BGP_PACKET_HEADER_LEN);
    peer_send(peer, BgpPacket::Keepalive(header));
}

pub fn peer_send_notification(peer: &mut Peer, code: NotifyCode, sub_code: u8, data: Vec<u8>) {
    let notification = NotificationPacket::new(code, sub_code, data);
    peer_send(peer, BgpPacket::Notification(notification));
}

/// The single exit point for outbound bytes. Every message passes through
/// the fuzz-aware builder exactly once before it is queued on the writer.
fn peer_send(peer: &Peer, msg: BgpPacket) {
    let Some(packet_tx) = peer.packet_tx.as_ref() else {
        return;
    };
    let spec = peer.fuzz.read().unwrap().clone();
    let bytes = build_message(&msg, spec.as_deref(), &peer.registry);
    bgp_info!(
        peer = %peer.address,
        typ = %msg.header().typ,
        length = bytes.len(),
        "send message"
    );
    let _ = packet_tx.send(bytes);
}
