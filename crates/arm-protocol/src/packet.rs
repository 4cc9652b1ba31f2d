//! 舵机总线数据包
//!
//! 发送包格式：
//!
//! ```text
//! [0xFF, 0xFF, id, length, instruction, params..., checksum]
//! ```
//!
//! 应答包格式（舵机返回）：
//!
//! ```text
//! [0xFF, 0xFF, id, length, error, data..., checksum]
//! ```
//!
//! `length` 为从指令（或错误）字节到校验和的字节数（含两端）。
//! 校验和为偏移 2 起到校验和之前所有字节之和的低 8 位按位取反，
//! 所有包形状使用同一算法。

use crate::ProtocolError;
use crate::constants::*;
use smallvec::SmallVec;

/// 数据包缓冲区
///
/// 栈上预留 64 字节，足以容纳 6 关节 sync-write（8 + 6 × 7 = 50 字节），
/// 常规路径不产生堆分配。
pub type PacketBuffer = SmallVec<[u8; 64]>;

/// 计算校验和
///
/// `frame` 为不含校验和的数据包前缀（包括帧头）。
pub fn checksum(frame: &[u8]) -> u8 {
    let body = frame.get(idx::ID..).unwrap_or(&[]);
    !body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// 舵机总线发送包（按调用构建，发送后即丢弃）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusPacket {
    bytes: PacketBuffer,
}

impl BusPacket {
    /// 组装数据包
    ///
    /// 调用方保证 `params` 总长度不超过长度字段的表示范围。
    fn encode(id: u8, instruction: Instruction, params: &[&[u8]]) -> Self {
        let param_len: usize = params.iter().map(|p| p.len()).sum();
        let mut bytes = PacketBuffer::new();
        bytes.extend_from_slice(&HEADER);
        bytes.push(id);
        bytes.push((param_len + 2) as u8);
        bytes.push(instruction.into());
        for p in params {
            bytes.extend_from_slice(p);
        }
        let chk = checksum(&bytes);
        bytes.push(chk);
        Self { bytes }
    }

    fn check_param_len(param_len: usize) -> Result<(), ProtocolError> {
        if param_len + 2 > MAX_LENGTH_FIELD {
            return Err(ProtocolError::PacketTooLarge(
                PACKET_PREFIX_LEN + param_len + 2,
            ));
        }
        Ok(())
    }

    /// 解析一个完整的发送包（校验帧头、长度和校验和）
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let frame = validate_frame(bytes)?;
        Ok(Self {
            bytes: PacketBuffer::from_slice(frame),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> PacketBuffer {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn device_id(&self) -> u8 {
        self.bytes[idx::ID]
    }

    pub fn length_field(&self) -> u8 {
        self.bytes[idx::LENGTH]
    }

    /// 指令字节（未知指令返回 `None`）
    pub fn instruction(&self) -> Option<Instruction> {
        Instruction::try_from(self.bytes[idx::INSTRUCTION]).ok()
    }

    /// 参数区（指令之后、校验和之前）
    pub fn params(&self) -> &[u8] {
        &self.bytes[idx::PARAM_0..self.bytes.len() - 1]
    }

    pub fn checksum_byte(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    /// 重新计算校验和并与尾字节比较
    pub fn verify_checksum(&self) -> bool {
        checksum(&self.bytes[..self.bytes.len() - 1]) == self.checksum_byte()
    }
}

impl AsRef<[u8]> for BusPacket {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// 校验帧头、长度字段与校验和，返回恰好一帧的切片
fn validate_frame(bytes: &[u8]) -> Result<&[u8], ProtocolError> {
    if bytes.len() < MIN_PACKET_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: MIN_PACKET_LEN,
            actual: bytes.len(),
        });
    }
    if bytes[..2] != HEADER {
        return Err(ProtocolError::InvalidHeader);
    }
    let length = bytes[idx::LENGTH] as usize;
    let total = PACKET_PREFIX_LEN + length;
    if length < 2 || bytes.len() < total {
        return Err(ProtocolError::InvalidLength {
            expected: total,
            actual: bytes.len(),
        });
    }
    let frame = &bytes[..total];
    let expected = checksum(&frame[..total - 1]);
    let actual = frame[total - 1];
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(frame)
}

/// 构建 PING 包（6 字节）
pub fn build_ping(device_id: u8) -> BusPacket {
    BusPacket::encode(device_id, Instruction::Ping, &[])
}

/// 构建单寄存器写包
///
/// 长度字段 = `payload.len() + 3`（指令 + 寄存器地址 + 负载 + 校验和）。
pub fn build_write(
    device_id: u8,
    register_addr: u8,
    payload: &[u8],
) -> Result<BusPacket, ProtocolError> {
    BusPacket::check_param_len(payload.len() + 1)?;
    Ok(BusPacket::encode(
        device_id,
        Instruction::Write,
        &[&[register_addr], payload],
    ))
}

/// 构建寄存器读请求（8 字节）
///
/// 舵机应答 `[hdr, hdr, id, len, err, data..., checksum]`，
/// 共 `6 + read_len` 字节。
pub fn build_read(device_id: u8, register_addr: u8, read_len: u8) -> BusPacket {
    BusPacket::encode(device_id, Instruction::Read, &[&[register_addr, read_len]])
}

/// 构建同步写包（广播）
///
/// 一次事务更新多个舵机的同一段寄存器：每个舵机从包中取出自己的数据段，
/// 解析完成后立即开始插值运动。总线上没有统一的触发信号，
/// 因此多关节的起动只是“近似同时”，并非硬件同步。
///
/// 每个条目的负载长度必须等于 `param_len_per_device`。
pub fn build_sync_write(
    register_addr: u8,
    param_len_per_device: u8,
    entries: &[(u8, &[u8])],
) -> Result<BusPacket, ProtocolError> {
    let per_device = param_len_per_device as usize;
    if let Some((_, payload)) = entries.iter().find(|(_, p)| p.len() != per_device) {
        return Err(ProtocolError::InvalidLength {
            expected: per_device,
            actual: payload.len(),
        });
    }
    BusPacket::check_param_len(2 + entries.len() * (1 + per_device))?;

    let mut params: SmallVec<[u8; 64]> = SmallVec::new();
    params.push(register_addr);
    params.push(param_len_per_device);
    for (id, payload) in entries {
        params.push(*id);
        params.extend_from_slice(payload);
    }
    Ok(BusPacket::encode(
        BROADCAST_ID,
        Instruction::SyncWrite,
        &[params.as_slice()],
    ))
}

/// 舵机应答包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub device_id: u8,
    /// 舵机错误位（0 表示正常）
    pub error: u8,
    pub data: SmallVec<[u8; 16]>,
}

impl StatusPacket {
    pub fn new(device_id: u8, error: u8, data: &[u8]) -> Self {
        Self {
            device_id,
            error,
            data: SmallVec::from_slice(data),
        }
    }

    /// 读取 `data_len` 字节时应答包的总长度
    pub const fn expected_len(data_len: usize) -> usize {
        MIN_PACKET_LEN + data_len
    }

    /// 解析应答包
    ///
    /// 多余的尾部字节会被忽略。
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let frame = validate_frame(bytes)?;
        Ok(Self {
            device_id: frame[idx::ID],
            error: frame[idx::ERROR],
            data: SmallVec::from_slice(&frame[idx::PARAM_0..frame.len() - 1]),
        })
    }

    /// 编码为线上字节（模拟舵机使用）
    pub fn to_bytes(&self) -> PacketBuffer {
        let mut bytes = PacketBuffer::new();
        bytes.extend_from_slice(&HEADER);
        bytes.push(self.device_id);
        bytes.push((self.data.len() + 2) as u8);
        bytes.push(self.error);
        bytes.extend_from_slice(&self.data);
        let chk = checksum(&bytes);
        bytes.push(chk);
        bytes
    }

    /// 数据区前两个字节按小端解释为 u16
    pub fn data_u16_le(&self) -> Option<u16> {
        match self.data.as_slice() {
            [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ping() {
        let pkt = build_ping(1);
        // 1 + 2 + 1 = 4, !4 = 0xFB
        assert_eq!(pkt.as_bytes(), &[0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
        assert!(pkt.verify_checksum());
        assert_eq!(pkt.instruction(), Some(Instruction::Ping));
    }

    #[test]
    fn test_build_write_joint_payload() {
        let payload = [0x00, 0x08, 0xE8, 0x03, 0xE8, 0x03];
        let pkt = build_write(3, REG_GOAL_POSITION_L, &payload).unwrap();

        assert_eq!(pkt.len(), 13);
        assert_eq!(pkt.length_field(), 9);
        assert_eq!(pkt.device_id(), 3);
        assert_eq!(pkt.instruction(), Some(Instruction::Write));
        assert_eq!(pkt.params()[0], REG_GOAL_POSITION_L);
        assert_eq!(&pkt.params()[1..], &payload);
        assert!(pkt.verify_checksum());
    }

    #[test]
    fn test_build_write_too_large() {
        let payload = [0u8; 300];
        let result = build_write(1, 0x00, &payload);
        assert!(matches!(result, Err(ProtocolError::PacketTooLarge(_))));
    }

    #[test]
    fn test_build_read() {
        let pkt = build_read(2, REG_PRESENT_POSITION_L, 2);
        assert_eq!(pkt.len(), 8);
        assert_eq!(
            &pkt.as_bytes()[..7],
            &[0xFF, 0xFF, 0x02, 0x04, 0x02, REG_PRESENT_POSITION_L, 0x02]
        );
        assert!(pkt.verify_checksum());
    }

    #[test]
    fn test_build_sync_write_layout() {
        let payloads: Vec<[u8; 6]> = (0..JOINT_COUNT as u8).map(|i| [i; 6]).collect();
        let entries: Vec<(u8, &[u8])> = payloads
            .iter()
            .enumerate()
            .map(|(i, p)| (BASE_ID + i as u8, p.as_slice()))
            .collect();
        let pkt = build_sync_write(REG_GOAL_POSITION_L, JOINT_PARAM_LEN, &entries).unwrap();

        assert_eq!(pkt.len(), 8 + JOINT_COUNT * 7);
        assert_eq!(pkt.device_id(), BROADCAST_ID);
        assert_eq!(pkt.length_field() as usize, 4 + JOINT_COUNT * 7);
        assert_eq!(pkt.instruction(), Some(Instruction::SyncWrite));
        assert_eq!(pkt.params()[0], REG_GOAL_POSITION_L);
        assert_eq!(pkt.params()[1], JOINT_PARAM_LEN);
        for i in 0..JOINT_COUNT {
            let entry = &pkt.as_bytes()[7 + i * 7..7 + (i + 1) * 7];
            assert_eq!(entry[0], BASE_ID + i as u8);
            assert_eq!(&entry[1..], &[i as u8; 6]);
        }
        assert!(pkt.verify_checksum());
    }

    #[test]
    fn test_build_sync_write_rejects_mismatched_entry() {
        let short = [0u8; 4];
        let result = build_sync_write(REG_GOAL_POSITION_L, 6, &[(1, &short)]);
        assert_eq!(
            result,
            Err(ProtocolError::InvalidLength {
                expected: 6,
                actual: 4
            })
        );
    }

    #[test]
    fn test_from_bytes_roundtrip_and_trailing_bytes() {
        let pkt = build_read(5, REG_PRESENT_POSITION_L, 2);
        let mut wire = pkt.as_bytes().to_vec();
        wire.extend_from_slice(&[0xAA, 0xBB]);
        let parsed = BusPacket::from_bytes(&wire).unwrap();
        assert_eq!(parsed, pkt);
    }

    #[test]
    fn test_from_bytes_rejects_corruption() {
        let mut wire = build_ping(1).as_bytes().to_vec();
        wire[2] = 7;
        assert!(matches!(
            BusPacket::from_bytes(&wire),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));

        let mut wire = build_ping(1).as_bytes().to_vec();
        wire[0] = 0x00;
        assert_eq!(
            BusPacket::from_bytes(&wire),
            Err(ProtocolError::InvalidHeader)
        );

        assert!(matches!(
            BusPacket::from_bytes(&[0xFF, 0xFF, 0x01]),
            Err(ProtocolError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_status_packet_parse_position() {
        // 舵机 3 返回当前位置 0x0800（2048）
        let reply = StatusPacket::new(3, 0, &[0x00, 0x08]).to_bytes();
        assert_eq!(reply.len(), StatusPacket::expected_len(2));
        assert_eq!(u16::from_le_bytes([reply[5], reply[6]]), 2048);

        let status = StatusPacket::parse(&reply).unwrap();
        assert_eq!(status.device_id, 3);
        assert_eq!(status.error, 0);
        assert_eq!(status.data_u16_le(), Some(2048));
    }

    #[test]
    fn test_status_packet_truncated() {
        let reply = StatusPacket::new(3, 0, &[0x00, 0x08]).to_bytes();
        let result = StatusPacket::parse(&reply[..6]);
        assert_eq!(
            result,
            Err(ProtocolError::InvalidLength {
                expected: 8,
                actual: 6
            })
        );
    }

    #[test]
    fn test_checksum_short_input() {
        assert_eq!(checksum(&[]), 0xFF);
        assert_eq!(checksum(&[0xFF, 0xFF]), 0xFF);
    }
}
