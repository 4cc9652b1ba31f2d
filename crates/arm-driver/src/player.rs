//! 序列播放器
//!
//! 一个常驻后台线程，按槽位升序回放存储的位姿。
//!
//! # 状态机
//!
//! ```text
//! Idle ──start──▶ Running ──pause──▶ Paused
//!  ▲                │  ▲               │
//!  └──stop / 完成───┘  └────resume─────┘
//!  ▲                                   │
//!  └──────────────stop─────────────────┘
//! ```
//!
//! - 运行中再次 `start` 会就地覆盖范围和循环标志，从下一整轮开始生效
//! - `pause` / `resume` 在其他状态下不做任何事
//! - 非循环的一轮播完后回到 Idle
//!
//! # 等待语义
//!
//! 每个槽位：同步写位姿，等待 `max(各关节运动时间)`，再等待 `settle_delay_ms`。
//! 这两段等待不会被停止 / 暂停打断，状态只在槽位边界检查：
//! 边界处已不是 Running 则中止当前这一轮，之后恢复从 `start_slot` 重新开始；
//! 等待期间暂停又恢复则这一轮照常继续。只有关闭播放器会提前结束等待。
//!
//! 状态锁只保护 `{state, range}` 等少量字段，从不跨越总线 I/O 或等待。

use crate::bus::ServoBus;
use crate::error::{DriverError, PlayerError, StoreError};
use crate::store::PositionStore;
use arm_protocol::SLOT_COUNT;
use parking_lot::{Condvar, Mutex};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 播放器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Idle,
    Running,
    Paused,
}

/// 回放范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackRange {
    pub start_slot: u8,
    pub end_slot: u8,
    pub looping: bool,
}

impl PlaybackRange {
    /// 要求 `start_slot ≤ end_slot < 16`
    pub fn new(start_slot: u8, end_slot: u8, looping: bool) -> Result<Self, PlayerError> {
        if start_slot > end_slot || end_slot as usize >= SLOT_COUNT {
            return Err(PlayerError::InvalidRange {
                start: start_slot,
                end: end_slot,
            });
        }
        Ok(Self {
            start_slot,
            end_slot,
            looping,
        })
    }

    pub fn slots(&self) -> RangeInclusive<u8> {
        self.start_slot..=self.end_slot
    }
}

impl Default for PlaybackRange {
    fn default() -> Self {
        Self {
            start_slot: 0,
            end_slot: 0,
            looping: false,
        }
    }
}

#[derive(Debug, Default)]
struct PlayerInner {
    state: PlayerState,
    range: PlaybackRange,
    /// 每次 start 递增，一轮结束时据此判断是否有新的范围
    generation: u64,
    current_slot: Option<u8>,
    shutdown: bool,
}

struct Shared {
    inner: Mutex<PlayerInner>,
    changed: Condvar,
}

impl Shared {
    /// 睡眠 `duration`，播放器关闭时提前返回 `false`
    fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        let mut inner = self.inner.lock();
        self.changed
            .wait_while_for(&mut inner, |inner| !inner.shutdown, duration);
        !inner.shutdown
    }
}

/// 一轮回放的结果
enum PassOutcome {
    Completed,
    Interrupted,
}

pub struct SequencePlayer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl SequencePlayer {
    /// 启动后台线程，初始状态为 Idle
    pub fn spawn(
        bus: Arc<ServoBus>,
        store: Arc<dyn PositionStore>,
    ) -> Result<Self, DriverError> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(PlayerInner::default()),
            changed: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("arm-seq-player".to_string())
            .spawn(move || player_loop(&worker_shared, &bus, store.as_ref()))
            .map_err(|e| PlayerError::Spawn(e.to_string()))?;

        info!("Sequence player initialized");
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// 开始回放（运行中调用则覆盖范围，下一整轮生效）
    pub fn start(&self, start_slot: u8, end_slot: u8, looping: bool) -> Result<(), PlayerError> {
        let range = PlaybackRange::new(start_slot, end_slot, looping).inspect_err(|e| {
            warn!("Rejected sequence start: {}", e);
        })?;

        {
            let mut inner = self.shared.inner.lock();
            if inner.shutdown {
                return Err(PlayerError::ShutDown);
            }
            inner.range = range;
            inner.generation += 1;
            inner.state = PlayerState::Running;
        }
        self.shared.changed.notify_all();

        info!(
            "Started sequence playback: slots {}-{}, loop={}",
            start_slot, end_slot, looping
        );
        Ok(())
    }

    /// 停止回放（进行中的等待会先完成）
    pub fn stop(&self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.state = PlayerState::Idle;
        }
        self.shared.changed.notify_all();
        info!("Sequence playback stopped");
    }

    pub fn pause(&self) {
        let paused = {
            let mut inner = self.shared.inner.lock();
            let running = inner.state == PlayerState::Running;
            if running {
                inner.state = PlayerState::Paused;
            }
            running
        };
        if paused {
            self.shared.changed.notify_all();
            info!("Sequence playback paused");
        }
    }

    pub fn resume(&self) {
        let resumed = {
            let mut inner = self.shared.inner.lock();
            let paused = inner.state == PlayerState::Paused;
            if paused {
                inner.state = PlayerState::Running;
            }
            paused
        };
        if resumed {
            self.shared.changed.notify_all();
            info!("Sequence playback resumed");
        }
    }

    pub fn state(&self) -> PlayerState {
        self.shared.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == PlayerState::Running
    }

    /// 当前生效的范围（最近一次 start 的参数）
    pub fn range(&self) -> PlaybackRange {
        self.shared.inner.lock().range
    }

    /// 正在执行的槽位（播放器不在槽位内时为 `None`）
    pub fn current_slot(&self) -> Option<u8> {
        self.shared.inner.lock().current_slot
    }

    /// 阻塞直到状态变为 Idle；超时返回 `false`
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let mut inner = self.shared.inner.lock();
        self.shared.changed.wait_while_for(
            &mut inner,
            |inner| inner.state != PlayerState::Idle,
            timeout,
        );
        inner.state == PlayerState::Idle
    }
}

impl Drop for SequencePlayer {
    fn drop(&mut self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.shutdown = true;
            inner.state = PlayerState::Idle;
        }
        self.shared.changed.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Sequence player thread panicked");
            }
        }
    }
}

fn player_loop(shared: &Shared, bus: &ServoBus, store: &dyn PositionStore) {
    debug!("Sequence player task started");

    loop {
        let (range, generation) = {
            let mut inner = shared.inner.lock();
            loop {
                if inner.shutdown {
                    debug!("Sequence player task exiting");
                    return;
                }
                if inner.state == PlayerState::Running {
                    break;
                }
                shared.changed.wait(&mut inner);
            }
            (inner.range, inner.generation)
        };

        let outcome = play_pass(shared, bus, store, range);

        let mut inner = shared.inner.lock();
        inner.current_slot = None;
        let finished = matches!(outcome, PassOutcome::Completed)
            && inner.state == PlayerState::Running
            && inner.generation == generation
            && !inner.range.looping;
        if finished {
            inner.state = PlayerState::Idle;
            drop(inner);
            shared.changed.notify_all();
            info!("Sequence playback complete");
        }
    }
}

/// 播放一整轮；每个槽位之前检查状态，不再是 Running 则立即中止
fn play_pass(
    shared: &Shared,
    bus: &ServoBus,
    store: &dyn PositionStore,
    range: PlaybackRange,
) -> PassOutcome {
    for slot in range.slots() {
        {
            let mut inner = shared.inner.lock();
            if inner.shutdown || inner.state != PlayerState::Running {
                return PassOutcome::Interrupted;
            }
            inner.current_slot = Some(slot);
        }

        let pose = match store.load(slot) {
            Ok(pose) => pose,
            Err(StoreError::NotFound { .. }) => {
                warn!("Slot {} doesn't exist, skipping", slot);
                continue;
            },
            Err(e) => {
                error!("Failed to load slot {}: {}", slot, e);
                continue;
            },
        };

        info!("Playing slot {}", slot);
        if let Err(e) = bus.sync_write_pose(&pose) {
            error!("Failed to send slot {} to servos: {}", slot, e);
        }

        if !shared.sleep_unless_shutdown(Duration::from_millis(pose.max_duration_ms() as u64)) {
            return PassOutcome::Interrupted;
        }
        if pose.settle_delay_ms > 0 {
            debug!("Delay {} ms", pose.settle_delay_ms);
            if !shared.sleep_unless_shutdown(Duration::from_millis(pose.settle_delay_ms as u64)) {
                return PassOutcome::Interrupted;
            }
        }
    }
    PassOutcome::Completed
}
