//! 驱动层错误类型定义

use arm_bus::BusError;
use arm_protocol::ProtocolError;
use thiserror::Error;

/// 位置存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 槽位为空
    #[error("Slot {slot} is empty")]
    NotFound { slot: u8 },

    /// 槽位号越界（有效范围 0..16）
    #[error("Invalid slot: {0}")]
    InvalidSlot(u8),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage encoding error: {0}")]
    Encode(#[from] bincode::Error),

    /// 文件头不匹配或版本不支持
    #[error("Corrupt slot file: {0}")]
    Corrupt(String),
}

/// 序列播放器错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// 范围必须满足 `start ≤ end < 16`
    #[error("Invalid playback range {start}..={end}")]
    InvalidRange { start: u8, end: u8 },

    /// 后台线程已退出
    #[error("Player worker has shut down")]
    ShutDown,

    /// 后台线程创建失败
    #[error("Failed to spawn player thread: {0}")]
    Spawn(String),
}

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 总线传输错误
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 位置存储错误
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// 序列播放器错误
    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    /// 关节号越界（有效范围 0..6）
    #[error("Invalid joint: {0}")]
    InvalidJoint(u8),

    /// 应答来自其他舵机
    #[error("Response from servo {actual}, expected {expected}")]
    ResponseMismatch { expected: u8, actual: u8 },
}
