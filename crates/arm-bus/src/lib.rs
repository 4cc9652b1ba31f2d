//! # ARM100 Bus Transport Layer
//!
//! 半双工舵机总线的传输抽象，提供统一的收发接口。
//!
//! - `serial`：基于 `serialport` 的 USB/UART 适配器（feature `serial`）
//! - `mock`：模拟总线，按舵机的行为应答 PING / READ（feature `mock`）
//!
//! 传输层只搬运字节，不理解数据包；帧的构建和解析在 `arm-protocol`，
//! 同一时刻只允许一个数据包在线上的约束由上层驱动的总线锁保证。

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockTransport, SimulatedServo};

/// 总线传输层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("Device Error: {0}")]
    Device(String),
    #[error("Read timeout")]
    Timeout,
    #[error("Short write: expected {expected} bytes, wrote {written}")]
    ShortWrite { expected: usize, written: usize },
    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },
}

/// 半双工总线传输
///
/// 实现者只需保证单次调用的原子性；跨调用的互斥（一次请求 + 应答）
/// 由调用方持有的锁负责。
pub trait BusTransport: Send {
    /// 阻塞发送，返回传输层接受的字节数
    fn send(&mut self, bytes: &[u8]) -> Result<usize, BusError>;

    /// 在 `timeout` 内最多接收 `max_len` 字节
    ///
    /// 超时时返回已收到的部分（可能为空），由调用方判定是否足够。
    fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, BusError>;

    /// 丢弃接收缓冲区中的残留字节
    fn clear_input(&mut self) -> Result<(), BusError> {
        while !self.receive(64, Duration::ZERO)?.is_empty() {}
        Ok(())
    }
}

impl<T: BusTransport + ?Sized> BusTransport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<usize, BusError> {
        (**self).send(bytes)
    }

    fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, BusError> {
        (**self).receive(max_len, timeout)
    }

    fn clear_input(&mut self) -> Result<(), BusError> {
        (**self).clear_input()
    }
}
