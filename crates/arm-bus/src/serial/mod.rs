//! 串口适配器
//!
//! 通过 USB 转 TTL 半双工适配器连接 STS 舵机总线，默认 1 Mbps、8N1、无流控。

use crate::{BusError, BusTransport};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 默认波特率（STS3214 出厂设置）
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialTransport {
    /// 打开串口
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, BusError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()?;

        debug!("Serial port {} opened at {} baud", path, baud_rate);
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl BusTransport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<usize, BusError> {
        let written = self.port.write(bytes)?;
        self.port.flush()?;
        trace!("TX {:02X?}", &bytes[..written]);
        Ok(written)
    }

    fn receive(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, BusError> {
        let mut buf = vec![0u8; max_len];
        let mut filled = 0;
        let deadline = Instant::now() + timeout;

        while filled < max_len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() && filled > 0 {
                break;
            }
            // serialport 不接受零超时，最短 1ms
            self.port.set_timeout(remaining.max(Duration::from_millis(1)))?;

            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            if remaining.is_zero() {
                break;
            }
        }

        buf.truncate(filled);
        trace!("RX {:02X?}", buf);
        Ok(buf)
    }

    fn clear_input(&mut self) -> Result<(), BusError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
