//! 舵机总线驱动
//!
//! [`ServoBus`] 在传输层之上实现 ping / 读 / 写 / 同步写。
//!
//! # 总线锁
//!
//! 总线是半双工的单一物理资源，指令处理上下文和序列播放器都会在上面发包。
//! 所有访问都经过内部的一把互斥锁：读事务在“清空接收缓冲区 → 发请求 →
//! 等应答”的整个过程中持有该锁，因此线上同一时刻最多只有一个数据包。
//!
//! # 写语义
//!
//! 写操作不等待应答，“成功”仅表示传输层接受了全部字节，
//! 并不代表舵机已经执行。读操作在固定超时内等待应答，
//! 应答缺失、不完整或校验失败都视为该次操作失败，本层不重试。

use crate::error::DriverError;
use crate::metrics::BusMetrics;
use arm_bus::{BusError, BusTransport};
use arm_protocol::*;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 读应答超时
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct ServoBus {
    transport: Mutex<Box<dyn BusTransport>>,
    read_timeout: Duration,
    metrics: BusMetrics,
}

impl ServoBus {
    pub fn new(transport: impl BusTransport + 'static) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    pub fn from_boxed(transport: Box<dyn BusTransport>) -> Self {
        Self {
            transport: Mutex::new(transport),
            read_timeout: DEFAULT_READ_TIMEOUT,
            metrics: BusMetrics::new(),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }

    /// 在已持有总线锁的前提下发送一个包
    fn send_locked(
        &self,
        transport: &mut dyn BusTransport,
        packet: &BusPacket,
    ) -> Result<(), DriverError> {
        let expected = packet.len();
        let written = match transport.send(packet.as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                BusMetrics::incr(&self.metrics.send_failures);
                return Err(e.into());
            },
        };
        if written != expected {
            BusMetrics::incr(&self.metrics.send_failures);
            return Err(BusError::ShortWrite { expected, written }.into());
        }
        BusMetrics::incr(&self.metrics.packets_sent);
        trace!("bus TX {:02X?}", packet.as_bytes());
        Ok(())
    }

    /// 单向发送（写 / 同步写）
    fn send(&self, packet: &BusPacket) -> Result<(), DriverError> {
        let mut transport = self.transport.lock();
        self.send_locked(transport.as_mut(), packet)
    }

    /// 请求 + 应答事务，期望应答数据区为 `data_len` 字节
    fn transact(&self, packet: &BusPacket, data_len: usize) -> Result<StatusPacket, DriverError> {
        let expected_id = packet.device_id();
        let expected_len = StatusPacket::expected_len(data_len);

        let raw = {
            let mut transport = self.transport.lock();
            transport.clear_input()?;
            self.send_locked(transport.as_mut(), packet)?;
            transport.receive(expected_len, self.read_timeout)?
        };

        if raw.is_empty() {
            BusMetrics::incr(&self.metrics.read_timeouts);
            return Err(BusError::Timeout.into());
        }
        if raw.len() < expected_len {
            BusMetrics::incr(&self.metrics.malformed_responses);
            return Err(BusError::ShortRead {
                expected: expected_len,
                received: raw.len(),
            }
            .into());
        }

        let status = StatusPacket::parse(&raw).inspect_err(|_| {
            BusMetrics::incr(&self.metrics.malformed_responses);
        })?;

        if status.device_id != expected_id {
            BusMetrics::incr(&self.metrics.malformed_responses);
            return Err(DriverError::ResponseMismatch {
                expected: expected_id,
                actual: status.device_id,
            });
        }
        if status.data.len() != data_len {
            BusMetrics::incr(&self.metrics.malformed_responses);
            return Err(BusError::ShortRead {
                expected: data_len,
                received: status.data.len(),
            }
            .into());
        }
        if status.error != 0 {
            warn!(
                "Servo {} reported error flags 0x{:02X}",
                status.device_id, status.error
            );
        }

        BusMetrics::incr(&self.metrics.reads_ok);
        Ok(status)
    }

    /// PING 一个舵机，收到应答即成功
    pub fn ping(&self, device_id: u8) -> Result<(), DriverError> {
        self.transact(&build_ping(device_id), 0)?;
        debug!("Servo {} responded to ping", device_id);
        Ok(())
    }

    /// 写任意寄存器段
    pub fn write_register(
        &self,
        device_id: u8,
        register_addr: u8,
        payload: &[u8],
    ) -> Result<(), DriverError> {
        let packet = build_write(device_id, register_addr, payload)?;
        self.send(&packet)
    }

    /// 写单关节目标（位置 + 时间 + 速度）
    pub fn write_joint(&self, device_id: u8, target: &JointTarget) -> Result<(), DriverError> {
        self.write_register(device_id, REG_GOAL_POSITION_L, &target.encode())?;
        debug!(
            "Servo {}: pos={}, time={}ms, speed={}",
            device_id,
            target.position(),
            target.duration_ms(),
            target.speed()
        );
        Ok(())
    }

    /// 读寄存器段
    pub fn read_register(
        &self,
        device_id: u8,
        register_addr: u8,
        read_len: u8,
    ) -> Result<SmallVec<[u8; 16]>, DriverError> {
        let status = self.transact(
            &build_read(device_id, register_addr, read_len),
            read_len as usize,
        )?;
        Ok(status.data)
    }

    /// 读当前位置
    pub fn read_position(&self, device_id: u8) -> Result<u16, DriverError> {
        let status = self.transact(&build_read(device_id, REG_PRESENT_POSITION_L, 2), 2)?;
        status.data_u16_le().ok_or_else(|| {
            DriverError::Bus(BusError::ShortRead {
                expected: 2,
                received: status.data.len(),
            })
        })
    }

    /// 一次事务同步写整臂位姿
    pub fn sync_write_pose(&self, pose: &ArmPose) -> Result<(), DriverError> {
        let entries = pose.sync_entries();
        let refs: SmallVec<[(u8, &[u8]); JOINT_COUNT]> =
            entries.iter().map(|(id, p)| (*id, p.as_slice())).collect();
        let packet = build_sync_write(REG_GOAL_POSITION_L, JOINT_PARAM_LEN, &refs)?;
        self.send(&packet)?;
        trace!("Sync write complete for all joints");
        Ok(())
    }

    /// 逐个读取 6 个关节的当前位置，读失败的关节为 `None`
    pub fn read_all_positions(&self) -> [Option<u16>; JOINT_COUNT] {
        std::array::from_fn(|i| {
            let id = BASE_ID + i as u8;
            match self.read_position(id) {
                Ok(pos) => Some(pos),
                Err(e) => {
                    debug!("Failed to read position of servo {}: {}", id, e);
                    None
                },
            }
        })
    }
}
