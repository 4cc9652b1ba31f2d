//! 连接会话与事件队列
//!
//! 传输层（无线链路、UDP 等）不直接调用调度器，而是把事件投递到一个
//! `crossbeam-channel` 队列，由 [`EventLoop`] 单线程消费：
//!
//! - `Connected`：建立新会话并推送一次状态
//! - `Command`：把缓冲区交给调度器
//! - `Disconnected`：销毁会话
//!
//! 会话在连接时创建、断开时销毁，不存在进程级的可变全局连接句柄。

use crate::dispatcher::CommandDispatcher;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 事件队列默认容量
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// 向已连接对端推送字节
///
/// 对端已断开时应静默丢弃。
pub trait Notifier: Send + Sync {
    fn notify(&self, bytes: &[u8]);
}

/// 不推送任何内容
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _bytes: &[u8]) {}
}

/// 一次连接
#[derive(Clone)]
pub struct Session {
    id: u64,
    notifier: Arc<dyn Notifier>,
}

impl Session {
    pub fn new(id: u64, notifier: Arc<dyn Notifier>) -> Self {
        Self { id, notifier }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn notify(&self, bytes: &[u8]) {
        self.notifier.notify(bytes);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

/// 传输层事件
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected(Session),
    Command { session: Session, bytes: Vec<u8> },
    Disconnected { session: Session },
}

/// 创建有界事件队列
pub fn event_channel() -> (Sender<TransportEvent>, Receiver<TransportEvent>) {
    bounded(EVENT_QUEUE_CAPACITY)
}

/// 单一消费者事件循环
pub struct EventLoop {
    dispatcher: Arc<CommandDispatcher>,
    active: Option<Session>,
}

impl EventLoop {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            dispatcher,
            active: None,
        }
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    /// 处理事件直到所有发送端被丢弃
    pub fn run(mut self, events: Receiver<TransportEvent>) {
        info!("Event loop started");
        for event in events.iter() {
            self.handle(event);
        }
        info!("Event loop stopped (all transports closed)");
    }

    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected(session) => {
                if let Some(previous) = self.active.replace(session.clone()) {
                    info!(
                        "Session {} replaced by session {}",
                        previous.id(),
                        session.id()
                    );
                } else {
                    info!("Session {} connected", session.id());
                }
                self.dispatcher.send_status(&session);
            },
            TransportEvent::Command { session, bytes } => {
                if self.active.as_ref().map(Session::id) != Some(session.id()) {
                    warn!(
                        "Ignoring {} bytes from stale session {}",
                        bytes.len(),
                        session.id()
                    );
                    return;
                }
                let outcome = self.dispatcher.dispatch(&bytes, Some(&session));
                debug!("Session {}: {:?}", session.id(), outcome);
            },
            TransportEvent::Disconnected { session } => {
                if self.active.as_ref().map(Session::id) == Some(session.id()) {
                    self.active = None;
                    info!("Session {} disconnected", session.id());
                }
            },
        }
    }
}
