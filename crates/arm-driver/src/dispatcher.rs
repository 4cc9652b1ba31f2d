//! 指令调度
//!
//! 把无线链路送来的缓冲区解码为 [`ArmCommand`]，校验后交给总线、
//! 位置存储或序列播放器执行。
//!
//! 错误分三类处理，都不会传播到传输会话：
//! - 格式错误（过短、未知操作码）：丢弃并告警
//! - 参数越界（关节号 ≥ 6、槽位号 ≥ 16、非法回放范围）：丢弃并告警，不执行
//! - 执行失败（总线、存储、槽位为空）：记录错误，调用方继续

use crate::bus::ServoBus;
use crate::config::DispatcherConfig;
use crate::error::{DriverError, PlayerError, StoreError};
use crate::player::SequencePlayer;
use crate::session::Session;
use crate::store::PositionStore;
use arm_protocol::*;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 单条指令的处理结果
#[derive(Debug)]
pub enum DispatchOutcome {
    Executed(OpCode),
    /// 格式错误或参数越界，未执行
    Dropped(DriverError),
    /// 已尝试执行但失败
    Failed(OpCode, DriverError),
}

impl DispatchOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, DispatchOutcome::Executed(_))
    }
}

fn is_validation_error(err: &DriverError) -> bool {
    matches!(
        err,
        DriverError::Protocol(_)
            | DriverError::InvalidJoint(_)
            | DriverError::Store(StoreError::InvalidSlot(_))
            | DriverError::Player(PlayerError::InvalidRange { .. })
    )
}

fn check_slot(slot: u8) -> Result<u8, DriverError> {
    if (slot as usize) < SLOT_COUNT {
        Ok(slot)
    } else {
        Err(StoreError::InvalidSlot(slot).into())
    }
}

pub struct CommandDispatcher {
    bus: Arc<ServoBus>,
    store: Arc<dyn PositionStore>,
    player: Arc<SequencePlayer>,
    config: DispatcherConfig,
}

impl CommandDispatcher {
    pub fn new(
        bus: Arc<ServoBus>,
        store: Arc<dyn PositionStore>,
        player: Arc<SequencePlayer>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            bus,
            store,
            player,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 处理一个原始缓冲区
    ///
    /// `session` 为 GET_STATUS 的应答对象，缺省时状态只计算不推送。
    pub fn dispatch(&self, bytes: &[u8], session: Option<&Session>) -> DispatchOutcome {
        let cmd = match ArmCommand::parse(bytes) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Dropping command buffer ({} bytes): {}", bytes.len(), e);
                return DispatchOutcome::Dropped(e.into());
            },
        };

        let op = cmd.op_code();
        match self.execute(cmd, session) {
            Ok(()) => DispatchOutcome::Executed(op),
            Err(e) if is_validation_error(&e) => {
                warn!("Dropping {:?}: {}", op, e);
                DispatchOutcome::Dropped(e)
            },
            Err(e) => {
                error!("{:?} failed: {}", op, e);
                DispatchOutcome::Failed(op, e)
            },
        }
    }

    /// 执行一条已解码的指令
    pub fn execute(&self, cmd: ArmCommand, session: Option<&Session>) -> Result<(), DriverError> {
        match cmd {
            ArmCommand::SetJoint {
                joint_id,
                position,
                duration_ms,
                speed,
            } => {
                let device_id =
                    device_id(joint_id as usize).ok_or(DriverError::InvalidJoint(joint_id))?;
                self.bus
                    .write_joint(device_id, &JointTarget::new(position, duration_ms, speed))?;
                info!(
                    "Set joint {} (servo {}) to position {}",
                    joint_id, device_id, position
                );
            },
            ArmCommand::SetAllJoints {
                positions,
                duration_ms,
                speed,
            } => {
                let pose = ArmPose::uniform(positions, duration_ms, speed, 0);
                self.bus.sync_write_pose(&pose)?;
                info!("Set all joints to {:?}", pose.positions());
            },
            ArmCommand::SavePosition {
                slot,
                settle_delay_ms,
            } => {
                let slot = check_slot(slot)?;
                let pose = self.capture_pose(settle_delay_ms);
                self.store.save(slot, &pose)?;
                info!("Saved position {:?} to slot {}", pose.positions(), slot);
            },
            ArmCommand::LoadPosition { slot, .. } => {
                let slot = check_slot(slot)?;
                let pose = self.store.load(slot)?;
                self.bus.sync_write_pose(&pose)?;
                info!("Loaded position from slot {}", slot);
            },
            ArmCommand::StartSequence {
                start_slot,
                end_slot,
                looping,
            } => {
                self.player.start(start_slot, end_slot, looping)?;
            },
            ArmCommand::StopSequence => self.player.stop(),
            ArmCommand::GetStatus => match session {
                Some(session) => self.send_status(session),
                None => {
                    let status = self.status();
                    info!("Status: {:?}", status);
                },
            },
            ArmCommand::HomePosition => {
                let pose = ArmPose::uniform(
                    [self.config.home_position; JOINT_COUNT],
                    self.config.home_duration_ms,
                    self.config.home_speed,
                    0,
                );
                self.bus.sync_write_pose(&pose)?;
                info!("Move to home position");
            },
        }
        Ok(())
    }

    /// 读回当前各关节位置组成位姿，读不到的关节使用回退位置
    fn capture_pose(&self, settle_delay_ms: u32) -> ArmPose {
        let positions = self
            .bus
            .read_all_positions()
            .map(|p| p.unwrap_or(self.config.fallback_position));
        ArmPose::uniform(
            positions,
            self.config.save_duration_ms,
            self.config.save_speed,
            settle_delay_ms,
        )
    }

    /// 当前状态快照
    pub fn status(&self) -> ArmStatus {
        ArmStatus {
            is_moving: self.player.is_running(),
            current_slot: self.player.current_slot().unwrap_or(0),
            positions: self
                .bus
                .read_all_positions()
                .map(|p| p.unwrap_or(self.config.fallback_position)),
        }
    }

    /// 计算状态并推送给会话
    pub fn send_status(&self, session: &Session) {
        let status = self.status();
        session.notify(&status.encode());
    }
}
