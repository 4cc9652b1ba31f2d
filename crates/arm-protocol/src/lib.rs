//! # ARM100 Protocol
//!
//! 机械臂串行舵机总线协议与指令协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 总线常量、指令码、寄存器地址、机械臂参数
//! - `packet`: 舵机总线数据包构建与解析（ping / read / write / sync-write）
//! - `pose`: 关节目标与整臂位姿
//! - `command`: 无线指令缓冲区解码
//! - `status`: 状态通知负载编码
//!
//! ## 字节序
//!
//! 舵机总线与指令缓冲区中的多字节字段均为小端字节序（低字节在前）。
//! 本模块提供了字节序转换工具函数。

pub mod command;
pub mod constants;
pub mod packet;
pub mod pose;
pub mod status;

// 重新导出常用类型
pub use command::*;
pub use constants::*;
pub use packet::*;
pub use pose::*;
pub use status::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty command buffer")]
    Empty,

    #[error("Unknown op-code: 0x{0:02X}")]
    UnknownOpCode(u8),

    #[error("Command 0x{op:02X} too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        op: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid packet length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid packet header")]
    InvalidHeader,

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// 小端字节序转 u32
pub fn bytes_to_u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_u16_le() {
        assert_eq!(bytes_to_u16_le([0x34, 0x12]), 0x1234);
        assert_eq!(bytes_to_u16_le([0xFF, 0x0F]), 4095);
    }

    #[test]
    fn test_bytes_to_u32_le() {
        assert_eq!(bytes_to_u32_le([0x78, 0x56, 0x34, 0x12]), 0x12345678);
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::TooShort {
            op: 0x01,
            expected: 7,
            actual: 6,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("0x01") && msg.contains('7') && msg.contains('6'));

        let err = ProtocolError::UnknownOpCode(0x42);
        assert_eq!(format!("{}", err), "Unknown op-code: 0x42");
    }
}
