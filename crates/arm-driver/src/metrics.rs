//! 总线指标
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 舵机总线实时指标
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// 成功交给传输层的数据包数
    pub packets_sent: AtomicU64,

    /// 发送失败次数（传输层错误或字节数不符）
    pub send_failures: AtomicU64,

    /// 成功完成的读事务数
    pub reads_ok: AtomicU64,

    /// 读超时次数（未收到任何应答字节）
    pub read_timeouts: AtomicU64,

    /// 应答不完整或校验失败次数
    pub malformed_responses: AtomicU64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            reads_ok: self.reads_ok.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            malformed_responses: self.malformed_responses.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.packets_sent.store(0, Ordering::Relaxed);
        self.send_failures.store(0, Ordering::Relaxed);
        self.reads_ok.store(0, Ordering::Relaxed);
        self.read_timeouts.store(0, Ordering::Relaxed);
        self.malformed_responses.store(0, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub packets_sent: u64,
    pub send_failures: u64,
    pub reads_ok: u64,
    pub read_timeouts: u64,
    pub malformed_responses: u64,
}

impl MetricsSnapshot {
    /// 读事务失败率（百分比），没有读事务时为 0
    pub fn read_failure_rate(&self) -> f64 {
        let failed = self.read_timeouts + self.malformed_responses;
        let total = self.reads_ok + failed;
        if total == 0 {
            return 0.0;
        }
        (failed as f64 / total as f64) * 100.0
    }
}
