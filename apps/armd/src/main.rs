//! ARM100 主机守护进程
//!
//! 启动顺序：
//! 1. 日志、命令行参数、配置文件
//! 2. 舵机总线（串口或 `--simulate` 模拟总线）
//! 3. 位置存储（配置了目录则用文件存储，否则内存存储）
//! 4. 序列播放器后台线程（可选自动回放）
//! 5. UDP 指令链路线程
//! 6. 逐个 ping 关节
//! 7. 事件循环（阻塞直到 Ctrl+C）

mod udp;

use anyhow::{Context, Result};
use arm_bus::{MockTransport, SerialTransport};
use arm_driver::session::event_channel;
use arm_driver::{
    ArmConfig, CommandDispatcher, EventLoop, FilePositionStore, MemoryPositionStore,
    PositionStore, SequencePlayer, ServoBus,
};
use arm_protocol::{JOINT_COUNT, POSITION_CENTER, device_id};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use udp::UdpTransport;

/// ARM100 守护进程
///
/// 通过串口驱动 6 个舵机，从 UDP 接收指令缓冲区并执行。
#[derive(Parser, Debug)]
#[command(name = "armd")]
#[command(about = "ARM100 daemon - servo bus control over a UDP command link", long_about = None)]
#[command(version)]
struct Args {
    /// 配置文件（TOML），缺省使用内置默认值
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 串口设备路径（覆盖配置文件）
    #[arg(long)]
    port: Option<String>,

    /// 串口波特率（覆盖配置文件）
    #[arg(long)]
    baud: Option<u32>,

    /// 槽位文件目录（覆盖配置文件）
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// UDP 监听地址
    ///
    /// 格式: IP:PORT (例如: 0.0.0.0:18900)
    #[arg(long, default_value = "0.0.0.0:18900")]
    udp: String,

    /// 对端无数据报多久后视为断开（秒）
    #[arg(long, default_value = "30")]
    peer_timeout: u64,

    /// 使用模拟总线（无硬件调试）
    #[arg(long)]
    simulate: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "armd=info,arm_driver=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    run(args, config)
}

/// 读取配置文件并应用命令行覆盖
fn load_config(args: &Args) -> Result<ArmConfig> {
    let mut config = match &args.config {
        Some(path) => ArmConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ArmConfig::default(),
    };

    if let Some(port) = &args.port {
        config.bus.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.bus.baud_rate = baud;
    }
    if let Some(dir) = &args.store_dir {
        config.storage.dir = Some(dir.clone());
    }
    Ok(config)
}

fn open_bus(args: &Args, config: &ArmConfig) -> Result<ServoBus> {
    let bus = if args.simulate {
        info!("Using simulated servo bus");
        ServoBus::new(MockTransport::with_arm(POSITION_CENTER))
    } else {
        let transport = SerialTransport::open(&config.bus.port, config.bus.baud_rate)
            .with_context(|| format!("Failed to open servo bus {}", config.bus.port))?;
        info!(
            "Servo bus opened on {} at {} baud",
            config.bus.port, config.bus.baud_rate
        );
        ServoBus::new(transport)
    };
    Ok(bus.with_read_timeout(config.bus.read_timeout()))
}

fn open_store(config: &ArmConfig) -> Result<Arc<dyn PositionStore>> {
    match &config.storage.dir {
        Some(dir) => {
            let store = FilePositionStore::open(dir)
                .with_context(|| format!("Failed to open position store {}", dir.display()))?;
            info!("Position slots stored in {}", dir.display());
            Ok(Arc::new(store))
        },
        None => {
            warn!("No storage directory configured, positions are kept in memory only");
            Ok(Arc::new(MemoryPositionStore::new()))
        },
    }
}

fn ping_joints(bus: &ServoBus) {
    for joint in 0..JOINT_COUNT {
        let Some(id) = device_id(joint) else { continue };
        match bus.ping(id) {
            Ok(()) => info!("Joint {} (servo {}) online", joint, id),
            Err(e) => warn!("Joint {} (servo {}) not responding: {}", joint, id, e),
        }
    }
}

fn run(args: Args, config: ArmConfig) -> Result<()> {
    let bus = Arc::new(open_bus(&args, &config)?);
    let store = open_store(&config)?;
    let player = Arc::new(SequencePlayer::spawn(bus.clone(), store.clone())?);

    if config.player.autostart {
        let p = &config.player;
        if let Err(e) = player.start(p.start_slot, p.end_slot, p.looping) {
            error!("Autostart skipped: {}", e);
        }
    }

    let dispatcher = Arc::new(CommandDispatcher::new(
        bus.clone(),
        store,
        player.clone(),
        config.dispatcher.clone(),
    ));

    let running = Arc::new(AtomicBool::new(true));
    let (events_tx, events_rx) = event_channel();
    let link = UdpTransport::bind(
        &args.udp,
        events_tx,
        Duration::from_secs(args.peer_timeout),
        running.clone(),
    )
    .with_context(|| format!("Failed to bind UDP socket {}", args.udp))?;
    let link_handle = thread::Builder::new()
        .name("arm-udp-link".into())
        .spawn(move || link.run())
        .context("Failed to spawn UDP link thread")?;

    ping_joints(&bus);

    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("Received interrupt signal, shutting down");
            running.store(false, Ordering::Relaxed);
        })
        .context("Failed to set signal handler")?;
    }

    info!("armd started, press Ctrl+C to stop");
    // UDP 线程退出时丢弃发送端，事件循环随之结束
    EventLoop::new(dispatcher).run(events_rx);

    if link_handle.join().is_err() {
        error!("UDP link thread panicked");
    }
    player.stop();

    let m = bus.metrics().snapshot();
    info!(
        "Bus statistics: sent={}, send_failures={}, reads_ok={}, read_timeouts={}, malformed={}",
        m.packets_sent, m.send_failures, m.reads_ok, m.read_timeouts, m.malformed_responses
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config = ArmConfig::from_toml_str(include_str!("../armd.example.toml")).unwrap();
        assert_eq!(config.bus.baud_rate, 1_000_000);
        assert_eq!(config.player.end_slot, 15);
        assert_eq!(
            config.storage.dir,
            Some(PathBuf::from("/var/lib/armd/slots"))
        );
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "armd",
            "--port",
            "/dev/ttyACM3",
            "--baud",
            "115200",
            "--store-dir",
            "/tmp/slots",
            "--simulate",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.bus.port, "/dev/ttyACM3");
        assert_eq!(config.bus.baud_rate, 115200);
        assert_eq!(config.storage.dir, Some(PathBuf::from("/tmp/slots")));
        assert_eq!(config.dispatcher, ArmConfig::default().dispatcher);
        assert!(args.simulate);
        assert_eq!(args.udp, "0.0.0.0:18900");
    }
}
