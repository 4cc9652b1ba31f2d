//! 指令缓冲区解码
//!
//! 无线链路送达的每个缓冲区以 1 字节操作码开头，后跟定长字段（小端）。
//! 超出最小长度的尾部字节被忽略；短于最小长度或操作码未知的缓冲区
//! 返回错误，由调用方丢弃。

use crate::constants::JOINT_COUNT;
use crate::{ProtocolError, bytes_to_u16_le, bytes_to_u32_le};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 指令操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    SetJoint = 0x01,
    SetAllJoints = 0x02,
    SavePosition = 0x03,
    LoadPosition = 0x04,
    StartSequence = 0x05,
    StopSequence = 0x06,
    GetStatus = 0x07,
    HomePosition = 0x08,
}

impl OpCode {
    /// 缓冲区最小长度（含操作码）
    ///
    /// SET_JOINT 的完整布局为 8 字节，但 7 字节即被接受。
    pub const fn min_len(self) -> usize {
        match self {
            OpCode::SetJoint => 7,
            OpCode::SetAllJoints => 17,
            OpCode::SavePosition | OpCode::LoadPosition => 6,
            OpCode::StartSequence => 4,
            OpCode::StopSequence | OpCode::GetStatus | OpCode::HomePosition => 1,
        }
    }
}

/// 已解码的指令
///
/// 字段保持原始值，范围检查（关节号、槽位号）由调度器负责。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmCommand {
    SetJoint {
        joint_id: u8,
        position: u16,
        duration_ms: u16,
        speed: u16,
    },
    SetAllJoints {
        positions: [u16; JOINT_COUNT],
        duration_ms: u16,
        speed: u16,
    },
    SavePosition {
        slot: u8,
        settle_delay_ms: u32,
    },
    /// `settle_delay_ms` 在加载时不使用
    LoadPosition {
        slot: u8,
        settle_delay_ms: u32,
    },
    StartSequence {
        start_slot: u8,
        end_slot: u8,
        looping: bool,
    },
    StopSequence,
    GetStatus,
    HomePosition,
}

#[inline]
fn u16_at(buf: &[u8], offset: usize) -> u16 {
    bytes_to_u16_le([buf[offset], buf[offset + 1]])
}

impl ArmCommand {
    /// 从原始缓冲区解码
    ///
    /// # 错误
    ///
    /// - [`ProtocolError::Empty`]：空缓冲区
    /// - [`ProtocolError::UnknownOpCode`]：操作码不在表内
    /// - [`ProtocolError::TooShort`]：长度不足该操作码的最小长度
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        let (&op_byte, _) = buf.split_first().ok_or(ProtocolError::Empty)?;
        let op = OpCode::try_from(op_byte).map_err(|_| ProtocolError::UnknownOpCode(op_byte))?;

        if buf.len() < op.min_len() {
            return Err(ProtocolError::TooShort {
                op: op_byte,
                expected: op.min_len(),
                actual: buf.len(),
            });
        }

        let cmd = match op {
            OpCode::SetJoint => ArmCommand::SetJoint {
                joint_id: buf[1],
                position: u16_at(buf, 2),
                duration_ms: u16_at(buf, 4),
                // 7 字节缓冲区缺少速度高字节，按 0 处理
                speed: bytes_to_u16_le([buf[6], buf.get(7).copied().unwrap_or(0)]),
            },
            OpCode::SetAllJoints => ArmCommand::SetAllJoints {
                positions: std::array::from_fn(|i| u16_at(buf, 1 + i * 2)),
                duration_ms: u16_at(buf, 13),
                speed: u16_at(buf, 15),
            },
            OpCode::SavePosition => ArmCommand::SavePosition {
                slot: buf[1],
                settle_delay_ms: bytes_to_u32_le([buf[2], buf[3], buf[4], buf[5]]),
            },
            OpCode::LoadPosition => ArmCommand::LoadPosition {
                slot: buf[1],
                settle_delay_ms: bytes_to_u32_le([buf[2], buf[3], buf[4], buf[5]]),
            },
            OpCode::StartSequence => ArmCommand::StartSequence {
                start_slot: buf[1],
                end_slot: buf[2],
                looping: buf[3] != 0,
            },
            OpCode::StopSequence => ArmCommand::StopSequence,
            OpCode::GetStatus => ArmCommand::GetStatus,
            OpCode::HomePosition => ArmCommand::HomePosition,
        };

        Ok(cmd)
    }

    pub fn op_code(&self) -> OpCode {
        match self {
            ArmCommand::SetJoint { .. } => OpCode::SetJoint,
            ArmCommand::SetAllJoints { .. } => OpCode::SetAllJoints,
            ArmCommand::SavePosition { .. } => OpCode::SavePosition,
            ArmCommand::LoadPosition { .. } => OpCode::LoadPosition,
            ArmCommand::StartSequence { .. } => OpCode::StartSequence,
            ArmCommand::StopSequence => OpCode::StopSequence,
            ArmCommand::GetStatus => OpCode::GetStatus,
            ArmCommand::HomePosition => OpCode::HomePosition,
        }
    }

    /// 编码为指令缓冲区（客户端侧使用，总是输出完整布局）
    pub fn encode(&self) -> Vec<u8> {
        let op = self.op_code();
        let mut buf = Vec::with_capacity(op.min_len());
        buf.push(op.into());

        match *self {
            ArmCommand::SetJoint {
                joint_id,
                position,
                duration_ms,
                speed,
            } => {
                buf.push(joint_id);
                buf.extend_from_slice(&position.to_le_bytes());
                buf.extend_from_slice(&duration_ms.to_le_bytes());
                buf.extend_from_slice(&speed.to_le_bytes());
            },
            ArmCommand::SetAllJoints {
                positions,
                duration_ms,
                speed,
            } => {
                for p in positions {
                    buf.extend_from_slice(&p.to_le_bytes());
                }
                buf.extend_from_slice(&duration_ms.to_le_bytes());
                buf.extend_from_slice(&speed.to_le_bytes());
            },
            ArmCommand::SavePosition {
                slot,
                settle_delay_ms,
            }
            | ArmCommand::LoadPosition {
                slot,
                settle_delay_ms,
            } => {
                buf.push(slot);
                buf.extend_from_slice(&settle_delay_ms.to_le_bytes());
            },
            ArmCommand::StartSequence {
                start_slot,
                end_slot,
                looping,
            } => {
                buf.extend_from_slice(&[start_slot, end_slot, looping as u8]);
            },
            ArmCommand::StopSequence | ArmCommand::GetStatus | ArmCommand::HomePosition => {},
        }

        buf
    }
}
