//! UDP 指令链路
//!
//! 一个数据报即一个指令缓冲区。来自新地址的数据报视为新连接：
//! 旧会话先收到 `Disconnected`，新会话 `Connected` 后再投递指令。
//! 对端超过 `peer_timeout` 没有发送任何数据报也视为断开。
//! 状态通知原路发回当前对端。

use arm_driver::{Notifier, Session, TransportEvent};
use crossbeam_channel::Sender;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 接收轮询间隔（同时决定退出标志的响应延迟）
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 接收缓冲区长度（链路 MTU 为 500 字节）
const MAX_DATAGRAM: usize = 512;

/// 把字节发回某个 UDP 对端
struct UdpNotifier {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl Notifier for UdpNotifier {
    fn notify(&self, bytes: &[u8]) {
        if let Err(e) = self.socket.send_to(bytes, self.peer) {
            warn!("Failed to notify {}: {}", self.peer, e);
        }
    }
}

struct Peer {
    addr: SocketAddr,
    session: Session,
    last_seen: Instant,
}

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    events: Sender<TransportEvent>,
    peer_timeout: Duration,
    running: Arc<AtomicBool>,
    peer: Option<Peer>,
    next_session_id: u64,
}

impl UdpTransport {
    pub fn bind(
        addr: impl ToSocketAddrs,
        events: Sender<TransportEvent>,
        peer_timeout: Duration,
        running: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        Ok(Self {
            socket: Arc::new(socket),
            events,
            peer_timeout,
            running,
            peer: None,
            next_session_id: 1,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// 阻塞接收，直到退出标志清除或事件队列关闭
    pub fn run(mut self) {
        let mut buf = [0u8; MAX_DATAGRAM];
        info!("UDP command link listening on {:?}", self.local_addr().ok());

        while self.running.load(Ordering::Relaxed) {
            let delivered = match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    trace!("UDP {} bytes from {}", len, addr);
                    self.on_datagram(&buf[..len], addr)
                },
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    self.expire_idle_peer()
                },
                Err(e) => {
                    warn!("UDP receive error: {}", e);
                    true
                },
            };
            if !delivered {
                debug!("Event queue closed, stopping UDP link");
                break;
            }
        }

        self.disconnect();
        info!("UDP command link stopped");
    }

    /// 返回 false 表示事件队列已关闭
    fn on_datagram(&mut self, bytes: &[u8], addr: SocketAddr) -> bool {
        if let Some(peer) = self.peer.as_mut().filter(|p| p.addr == addr) {
            peer.last_seen = Instant::now();
            let session = peer.session.clone();
            return self.deliver(session, bytes);
        }

        if !self.disconnect() {
            return false;
        }
        match self.connect(addr) {
            Some(session) => self.deliver(session, bytes),
            None => false,
        }
    }

    fn deliver(&self, session: Session, bytes: &[u8]) -> bool {
        self.events
            .send(TransportEvent::Command {
                session,
                bytes: bytes.to_vec(),
            })
            .is_ok()
    }

    fn connect(&mut self, addr: SocketAddr) -> Option<Session> {
        let id = self.next_session_id;
        self.next_session_id += 1;
        let notifier = Arc::new(UdpNotifier {
            socket: self.socket.clone(),
            peer: addr,
        });
        let session = Session::new(id, notifier);
        info!("UDP peer {} connected as session {}", addr, id);

        self.events
            .send(TransportEvent::Connected(session.clone()))
            .ok()?;
        self.peer = Some(Peer {
            addr,
            session: session.clone(),
            last_seen: Instant::now(),
        });
        Some(session)
    }

    fn expire_idle_peer(&mut self) -> bool {
        let idle = self
            .peer
            .as_ref()
            .is_some_and(|peer| peer.last_seen.elapsed() >= self.peer_timeout);
        if idle {
            info!("UDP peer timed out");
            return self.disconnect();
        }
        true
    }

    /// 结束当前会话（如果有）
    fn disconnect(&mut self) -> bool {
        match self.peer.take() {
            Some(peer) => {
                info!(
                    "UDP peer {} (session {}) disconnected",
                    peer.addr,
                    peer.session.id()
                );
                self.events
                    .send(TransportEvent::Disconnected {
                        session: peer.session,
                    })
                    .is_ok()
            },
            None => true,
        }
    }
}
