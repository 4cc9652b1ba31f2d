//! 机械臂位姿模型
//!
//! - [`JointTarget`]：单关节目标（位置 / 运动时间 / 速度），构造时钳位，从不拒绝
//! - [`ArmPose`]：6 个关节目标 + 到位后的停留时间
//!
//! 关节索引到舵机 ID 的映射固定为 `BASE_ID + joint_index`，运行时不可配置。

use crate::constants::*;

/// 关节索引对应的舵机 ID
///
/// 索引越界（≥ 6）返回 `None`。
pub fn device_id(joint_index: usize) -> Option<u8> {
    if joint_index < JOINT_COUNT {
        Some(BASE_ID + joint_index as u8)
    } else {
        None
    }
}

/// 单关节目标
///
/// `position` ∈ [0, 4095]，`speed` ∈ [0, 4095]，`duration_ms` 为完整 u16 范围。
/// 超出范围的值在构造时钳位到边界。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "RawJointTarget", into = "RawJointTarget")
)]
pub struct JointTarget {
    position: u16,
    duration_ms: u16,
    speed: u16,
}

impl JointTarget {
    pub fn new(position: u16, duration_ms: u16, speed: u16) -> Self {
        Self {
            position: position.min(POSITION_MAX),
            duration_ms,
            speed: speed.min(SPEED_MAX),
        }
    }

    pub fn position(&self) -> u16 {
        self.position
    }

    pub fn duration_ms(&self) -> u16 {
        self.duration_ms
    }

    pub fn speed(&self) -> u16 {
        self.speed
    }

    /// 写入目标寄存器的 6 字节负载（小端）
    ///
    /// `[pos_lo, pos_hi, dur_lo, dur_hi, speed_lo, speed_hi]`
    pub fn encode(&self) -> [u8; JOINT_PARAM_LEN as usize] {
        let [p0, p1] = self.position.to_le_bytes();
        let [d0, d1] = self.duration_ms.to_le_bytes();
        let [s0, s1] = self.speed.to_le_bytes();
        [p0, p1, d0, d1, s0, s1]
    }
}

/// 序列化中间表示：反序列化时重新经过钳位
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct RawJointTarget {
    position: u16,
    duration_ms: u16,
    speed: u16,
}

#[cfg(feature = "serde")]
impl From<RawJointTarget> for JointTarget {
    fn from(raw: RawJointTarget) -> Self {
        JointTarget::new(raw.position, raw.duration_ms, raw.speed)
    }
}

#[cfg(feature = "serde")]
impl From<JointTarget> for RawJointTarget {
    fn from(target: JointTarget) -> Self {
        Self {
            position: target.position,
            duration_ms: target.duration_ms,
            speed: target.speed,
        }
    }
}

/// 整臂位姿
///
/// 索引即关节号（0..5）。`settle_delay_ms` 为序列回放时到位后额外等待的时间。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArmPose {
    pub joints: [JointTarget; JOINT_COUNT],
    pub settle_delay_ms: u32,
}

impl ArmPose {
    pub fn new(joints: [JointTarget; JOINT_COUNT], settle_delay_ms: u32) -> Self {
        Self {
            joints,
            settle_delay_ms,
        }
    }

    /// 所有关节共享运动时间和速度
    pub fn uniform(
        positions: [u16; JOINT_COUNT],
        duration_ms: u16,
        speed: u16,
        settle_delay_ms: u32,
    ) -> Self {
        Self {
            joints: positions.map(|p| JointTarget::new(p, duration_ms, speed)),
            settle_delay_ms,
        }
    }

    /// 回零位姿：全部关节中位
    pub fn home(duration_ms: u16, speed: u16) -> Self {
        Self::uniform([POSITION_CENTER; JOINT_COUNT], duration_ms, speed, 0)
    }

    /// 各关节运动时间的最大值（回放时的运动等待时间）
    pub fn max_duration_ms(&self) -> u16 {
        self.joints
            .iter()
            .map(JointTarget::duration_ms)
            .max()
            .unwrap_or(0)
    }

    pub fn positions(&self) -> [u16; JOINT_COUNT] {
        self.joints.map(|j| j.position())
    }

    /// sync-write 条目：`(舵机 ID, 6 字节负载)`，按关节顺序
    pub fn sync_entries(&self) -> [(u8, [u8; JOINT_PARAM_LEN as usize]); JOINT_COUNT] {
        std::array::from_fn(|i| (BASE_ID + i as u8, self.joints[i].encode()))
    }
}
