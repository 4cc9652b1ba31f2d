//! 状态通知负载
//!
//! 连接建立时和收到 GET_STATUS 时推送给对端：
//!
//! ```text
//! [is_moving:u8, current_slot:u8, positions[6]:u16 LE]
//! ```

use crate::constants::JOINT_COUNT;
use crate::{ProtocolError, bytes_to_u16_le};

/// 状态负载长度
pub const STATUS_PAYLOAD_LEN: usize = 2 + JOINT_COUNT * 2;

/// 机械臂状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmStatus {
    /// 序列播放器处于 Running
    pub is_moving: bool,
    /// 播放器当前执行的槽位（空闲时为 0）
    pub current_slot: u8,
    pub positions: [u16; JOINT_COUNT],
}

impl ArmStatus {
    pub fn encode(&self) -> [u8; STATUS_PAYLOAD_LEN] {
        let mut out = [0u8; STATUS_PAYLOAD_LEN];
        out[0] = self.is_moving as u8;
        out[1] = self.current_slot;
        for (i, pos) in self.positions.iter().enumerate() {
            out[2 + i * 2..4 + i * 2].copy_from_slice(&pos.to_le_bytes());
        }
        out
    }

    /// 解码状态负载（客户端侧使用）
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < STATUS_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: STATUS_PAYLOAD_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            is_moving: bytes[0] != 0,
            current_slot: bytes[1],
            positions: std::array::from_fn(|i| {
                bytes_to_u16_le([bytes[2 + i * 2], bytes[3 + i * 2]])
            }),
        })
    }
}
