//! # 运行配置
//!
//! TOML 配置文件，所有字段都有默认值，缺省的段落和字段按默认值填充。
//!
//! ```toml
//! [bus]
//! port = "/dev/ttyUSB0"
//! baud_rate = 1000000
//! read_timeout_ms = 100
//!
//! [player]
//! autostart = false
//!
//! [dispatcher]
//! home_duration_ms = 2000
//! home_speed = 1000
//!
//! [storage]
//! dir = "positions"
//! ```

use crate::error::ConfigError;
use arm_protocol::POSITION_CENTER;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    pub bus: BusConfig,
    pub player: PlayerConfig,
    pub dispatcher: DispatcherConfig,
    pub storage: StorageConfig,
}

impl ArmConfig {
    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// 舵机总线
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// 串口设备路径
    pub port: String,
    pub baud_rate: u32,
    /// 读应答超时（毫秒）
    pub read_timeout_ms: u64,
}

impl BusConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 1_000_000,
            read_timeout_ms: 100,
        }
    }
}

/// 序列播放器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 启动后立即回放
    pub autostart: bool,
    pub start_slot: u8,
    pub end_slot: u8,
    pub looping: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            start_slot: 0,
            end_slot: 15,
            looping: true,
        }
    }
}

/// 指令调度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// HOME 的目标位置
    pub home_position: u16,
    pub home_duration_ms: u16,
    pub home_speed: u16,
    /// SAVE 时写入每个关节的运动时间
    pub save_duration_ms: u16,
    /// SAVE 时写入每个关节的速度
    pub save_speed: u16,
    /// 读不到当前位置的关节按此值保存 / 上报
    pub fallback_position: u16,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            home_position: POSITION_CENTER,
            home_duration_ms: 2000,
            home_speed: 1000,
            save_duration_ms: 1000,
            save_speed: 1000,
            fallback_position: POSITION_CENTER,
        }
    }
}

/// 位置存储
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 槽位文件目录；为空时使用内存存储
    pub dir: Option<PathBuf>,
}
