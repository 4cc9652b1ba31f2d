//! 驱动层模块
//!
//! 本模块提供 ARM100 机械臂的设备驱动功能，包括：
//! - 舵机总线驱动（总线锁保证同一时刻只有一个数据包在线上）
//! - 位置存储（16 个槽位，内存 / 文件两种实现）
//! - 序列播放器（后台线程按槽位顺序回放位姿，支持暂停 / 恢复 / 循环 / 停止）
//! - 指令调度（解码无线指令缓冲区并路由到上述组件）
//! - 会话与事件队列（传输层事件经 channel 送入单一消费循环）
//!
//! # 并发模型
//!
//! 指令处理上下文与播放器后台线程并发运行。二者共享：
//! - 播放器状态 `{state, range, loop}`：一把互斥锁，临界区很短，
//!   从不跨越总线 I/O 或定时等待
//! - 舵机总线：[`ServoBus`] 内部的总线锁，一次请求 + 应答期间持有

pub mod bus;
pub mod config;
pub mod dispatcher;
mod error;
pub mod metrics;
pub mod player;
pub mod session;
pub mod store;

pub use bus::{DEFAULT_READ_TIMEOUT, ServoBus};
pub use config::{ArmConfig, BusConfig, DispatcherConfig, PlayerConfig, StorageConfig};
pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use error::{ConfigError, DriverError, PlayerError, StoreError};
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use player::{PlaybackRange, PlayerState, SequencePlayer};
pub use session::{EventLoop, NoopNotifier, Notifier, Session, TransportEvent};
pub use store::{FilePositionStore, MemoryPositionStore, PositionStore};
