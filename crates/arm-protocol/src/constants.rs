//! 协议常量定义
//!
//! Feetech STS 系列舵机总线常量，以及 ARM100 机械臂的固定参数。

use num_enum::{IntoPrimitive, TryFromPrimitive};

// ============================================================================
// 数据包结构
// ============================================================================

/// 帧头同步字节
pub const HEADER_BYTE: u8 = 0xFF;

/// 帧头（两个同步字节）
pub const HEADER: [u8; 2] = [HEADER_BYTE, HEADER_BYTE];

/// 广播 ID（sync-write 使用）
pub const BROADCAST_ID: u8 = 0xFE;

/// 数据包内各字段偏移
pub mod idx {
    /// 设备 ID
    pub const ID: usize = 2;
    /// 长度字段（从指令字节到校验和，含两端）
    pub const LENGTH: usize = 3;
    /// 指令字节（仅发送包）
    pub const INSTRUCTION: usize = 4;
    /// 错误字节（仅应答包）
    pub const ERROR: usize = 4;
    /// 第一个参数 / 数据字节
    pub const PARAM_0: usize = 5;
}

/// 长度字段之前的固定字节数（帧头 ×2 + ID + 长度）
pub const PACKET_PREFIX_LEN: usize = 4;

/// 最短数据包：帧头 ×2 + ID + 长度 + 指令 + 校验和
pub const MIN_PACKET_LEN: usize = 6;

/// 长度字段可表示的最大值
pub const MAX_LENGTH_FIELD: usize = u8::MAX as usize;

// ============================================================================
// 指令
// ============================================================================

/// 舵机总线指令码
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    RegWrite = 0x04,
    Action = 0x05,
    SyncWrite = 0x83,
}

// ============================================================================
// 寄存器地址（STS3214 内存表）
// ============================================================================

pub const REG_ID: u8 = 0x05;
pub const REG_BAUD_RATE: u8 = 0x06;
/// 目标位置（低字节），其后依次为目标时间、目标速度，各 2 字节
pub const REG_GOAL_POSITION_L: u8 = 0x2A;
pub const REG_GOAL_POSITION_H: u8 = 0x2B;
pub const REG_GOAL_TIME_L: u8 = 0x2C;
pub const REG_GOAL_TIME_H: u8 = 0x2D;
pub const REG_GOAL_SPEED_L: u8 = 0x2E;
pub const REG_GOAL_SPEED_H: u8 = 0x2F;
pub const REG_PRESENT_POSITION_L: u8 = 0x38;
pub const REG_PRESENT_POSITION_H: u8 = 0x39;

/// 单关节目标负载长度：位置 + 时间 + 速度（各 u16）
pub const JOINT_PARAM_LEN: u8 = 6;

// ============================================================================
// 机械臂参数
// ============================================================================

/// 关节数量
pub const JOINT_COUNT: usize = 6;

/// 关节 0 对应的舵机 ID，关节 i 的 ID 为 `BASE_ID + i`
pub const BASE_ID: u8 = 1;

pub const POSITION_MIN: u16 = 0;
pub const POSITION_MAX: u16 = 4095;
/// 中位（回零位置，也是读取失败时的缺省值）
pub const POSITION_CENTER: u16 = 2048;

pub const SPEED_MIN: u16 = 0;
pub const SPEED_MAX: u16 = 4095;

/// 位置存储槽数量
pub const SLOT_COUNT: usize = 16;
