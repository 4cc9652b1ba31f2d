//! 模拟总线
//!
//! 行为近似一串挂在同一总线上的 STS 舵机：
//!
//! - 记录每一个发出的数据包
//! - 对已配置的舵机 ID 应答 PING / READ（按寄存器内存表返回数据）
//! - WRITE / SYNC_WRITE 写入寄存器；写目标位置时当前位置立即跟随
//! - 可注入写失败、写截断、舵机离线
//! - 应答尚未被读走时又有新包发出，记为一次“总线冲突”
//!
//! `MockTransport` 可克隆，所有克隆共享同一份状态，
//! 测试代码持有一份用于断言，另一份交给驱动。

use crate::{BusError, BusTransport};
use arm_protocol::*;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// 寄存器内存表大小
const MEMORY_SIZE: usize = 0x80;

/// 一个模拟舵机
#[derive(Debug, Clone)]
pub struct SimulatedServo {
    memory: [u8; MEMORY_SIZE],
    online: bool,
}

impl SimulatedServo {
    pub fn new(id: u8, present_position: u16) -> Self {
        let mut memory = [0u8; MEMORY_SIZE];
        memory[REG_ID as usize] = id;
        let mut servo = Self {
            memory,
            online: true,
        };
        servo.write_u16(REG_PRESENT_POSITION_L, present_position);
        servo.write_u16(REG_GOAL_POSITION_L, present_position);
        servo
    }

    fn write_u16(&mut self, addr: u8, value: u16) {
        let a = addr as usize;
        self.memory[a..a + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn read_u16(&self, addr: u8) -> u16 {
        let a = addr as usize;
        u16::from_le_bytes([self.memory[a], self.memory[a + 1]])
    }

    fn write(&mut self, addr: u8, data: &[u8]) {
        let start = addr as usize;
        let end = (start + data.len()).min(MEMORY_SIZE);
        if start >= end {
            return;
        }
        self.memory[start..end].copy_from_slice(&data[..end - start]);

        // 目标位置落在写入范围内时，当前位置立即跟随
        let goal = REG_GOAL_POSITION_L as usize;
        if start <= goal && goal + 1 < end {
            let pos = self.read_u16(REG_GOAL_POSITION_L);
            self.write_u16(REG_PRESENT_POSITION_L, pos);
        }
    }

    fn read(&self, addr: u8, len: u8) -> Vec<u8> {
        let start = (addr as usize).min(MEMORY_SIZE);
        let end = (start + len as usize).min(MEMORY_SIZE);
        let mut data = self.memory[start..end].to_vec();
        data.resize(len as usize, 0);
        data
    }

    pub fn present_position(&self) -> u16 {
        self.read_u16(REG_PRESENT_POSITION_L)
    }

    pub fn goal(&self) -> JointTarget {
        JointTarget::new(
            self.read_u16(REG_GOAL_POSITION_L),
            self.read_u16(REG_GOAL_TIME_L),
            self.read_u16(REG_GOAL_SPEED_L),
        )
    }
}

#[derive(Debug, Default)]
struct MockState {
    servos: BTreeMap<u8, SimulatedServo>,
    sent: Vec<Vec<u8>>,
    rx: VecDeque<u8>,
    fail_writes: bool,
    truncate_writes: bool,
    send_latency: Duration,
    collisions: usize,
}

/// 模拟总线传输
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 挂载 6 个关节舵机（ID 1..=6），当前位置均为 `position`
    pub fn with_arm(position: u16) -> Self {
        let mock = Self::new();
        for i in 0..JOINT_COUNT {
            mock.add_servo(BASE_ID + i as u8, position);
        }
        mock
    }

    pub fn add_servo(&self, id: u8, present_position: u16) {
        self.state
            .lock()
            .servos
            .insert(id, SimulatedServo::new(id, present_position));
    }

    /// 离线的舵机不应答任何请求，但仍在 ID 表中
    pub fn set_online(&self, id: u8, online: bool) {
        if let Some(servo) = self.state.lock().servos.get_mut(&id) {
            servo.online = online;
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// 每次发送少报一个字节
    pub fn set_truncate_writes(&self, truncate: bool) {
        self.state.lock().truncate_writes = truncate;
    }

    /// 每次发送前阻塞的时间（加大并发测试中的交错窗口）
    pub fn set_send_latency(&self, latency: Duration) {
        self.state.lock().send_latency = latency;
    }

    /// 直接塞入接收缓冲区的字节（模拟线上残留数据）
    pub fn inject_rx(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes);
    }

    pub fn servo(&self, id: u8) -> Option<SimulatedServo> {
        self.state.lock().servos.get(&id).cloned()
    }

    pub fn present_position(&self, id: u8) -> Option<u16> {
        self.servo(id).map(|s| s.present_position())
    }

    pub fn sent_packets(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    pub fn take_sent_packets(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().sent)
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    /// 指定指令的已发送包数量
    pub fn count_instruction(&self, instruction: Instruction) -> usize {
        let op: u8 = instruction.into();
        self.state
            .lock()
            .sent
            .iter()
            .filter(|p| p.get(idx::INSTRUCTION) == Some(&op))
            .count()
    }

    /// 应答未读完时又发出新包的次数
    pub fn collisions(&self) -> usize {
        self.state.lock().collisions
    }
}

impl MockState {
    fn respond(&mut self, bytes: &[u8]) {
        let Ok(packet) = BusPacket::from_bytes(bytes) else {
            trace!("mock: ignoring malformed packet {:02X?}", bytes);
            return;
        };
        let id = packet.device_id();
        let params = packet.params();

        match packet.instruction() {
            Some(Instruction::Ping) => self.reply(id, &[]),
            Some(Instruction::Read) if params.len() >= 2 => {
                let data = match self.servos.get(&id) {
                    Some(servo) if servo.online => servo.read(params[0], params[1]),
                    _ => return,
                };
                self.reply(id, &data);
            },
            Some(Instruction::Write) if !params.is_empty() => {
                if let Some(servo) = self.servos.get_mut(&id).filter(|s| s.online) {
                    servo.write(params[0], &params[1..]);
                }
            },
            Some(Instruction::SyncWrite) if params.len() >= 2 => {
                let addr = params[0];
                let per_device = params[1] as usize;
                for entry in params[2..].chunks_exact(per_device + 1) {
                    if let Some(servo) = self.servos.get_mut(&entry[0]).filter(|s| s.online) {
                        servo.write(addr, &entry[1..]);
                    }
                }
            },
            _ => {},
        }
    }

    fn reply(&mut self, id: u8, data: &[u8]) {
        if !self.servos.get(&id).is_some_and(|s| s.online) {
            return;
        }
        let status = StatusPacket::new(id, 0, data);
        self.rx.extend(status.to_bytes());
    }
}

impl BusTransport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<usize, BusError> {
        let latency = {
            let mut state = self.state.lock();
            if !state.rx.is_empty() {
                state.collisions += 1;
            }
            state.send_latency
        };
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(BusError::Device("simulated write failure".to_string()));
        }
        state.sent.push(bytes.to_vec());
        if state.truncate_writes {
            return Ok(bytes.len().saturating_sub(1));
        }
        state.respond(bytes);
        Ok(bytes.len())
    }

    fn receive(&mut self, max_len: usize, _timeout: Duration) -> Result<Vec<u8>, BusError> {
        let mut state = self.state.lock();
        let n = max_len.min(state.rx.len());
        Ok(state.rx.drain(..n).collect())
    }

    fn clear_input(&mut self) -> Result<(), BusError> {
        self.state.lock().rx.clear();
        Ok(())
    }
}
