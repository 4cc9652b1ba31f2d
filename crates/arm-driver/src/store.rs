//! 位置存储
//!
//! 16 个槽位，每个槽位至多保存一个 [`ArmPose`]。保存时位姿按值交给存储，
//! 加载时按值返还；播放器每次回放都重新加载，因此两轮之间位姿可以被改写。

use crate::error::StoreError;
use arm_protocol::{ArmPose, SLOT_COUNT};
use parking_lot::RwLock;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 按槽位索引的位姿持久化接口
pub trait PositionStore: Send + Sync {
    fn save(&self, slot: u8, pose: &ArmPose) -> Result<(), StoreError>;

    /// 空槽位返回 [`StoreError::NotFound`]
    fn load(&self, slot: u8) -> Result<ArmPose, StoreError>;

    /// 槽位越界时返回 `false`
    fn exists(&self, slot: u8) -> bool;

    fn clear(&self, slot: u8) -> Result<(), StoreError>;

    fn clear_all(&self) -> Result<(), StoreError> {
        for slot in 0..SLOT_COUNT as u8 {
            self.clear(slot)?;
        }
        Ok(())
    }
}

fn check_slot(slot: u8) -> Result<usize, StoreError> {
    if (slot as usize) < SLOT_COUNT {
        Ok(slot as usize)
    } else {
        Err(StoreError::InvalidSlot(slot))
    }
}

/// 内存存储（进程退出即丢失）
#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    slots: RwLock<[Option<ArmPose>; SLOT_COUNT]>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionStore for MemoryPositionStore {
    fn save(&self, slot: u8, pose: &ArmPose) -> Result<(), StoreError> {
        let i = check_slot(slot)?;
        self.slots.write()[i] = Some(*pose);
        Ok(())
    }

    fn load(&self, slot: u8) -> Result<ArmPose, StoreError> {
        let i = check_slot(slot)?;
        self.slots.read()[i].ok_or(StoreError::NotFound { slot })
    }

    fn exists(&self, slot: u8) -> bool {
        check_slot(slot).is_ok_and(|i| self.slots.read()[i].is_some())
    }

    fn clear(&self, slot: u8) -> Result<(), StoreError> {
        let i = check_slot(slot)?;
        self.slots.write()[i] = None;
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        *self.slots.write() = [None; SLOT_COUNT];
        Ok(())
    }
}

/// 槽位文件魔数
pub const SLOT_MAGIC: &[u8; 8] = b"ARMPOSE\0";

/// 槽位文件格式版本
pub const SLOT_FORMAT_VERSION: u8 = 1;

/// 文件存储
///
/// 目录下每个槽位一个文件 `pos_<n>.bin`：
///
/// ```text
/// [MAGIC: 8 bytes]
/// [Version: 1 byte]
/// [Data: bincode serialized ArmPose]
/// ```
///
/// 先写临时文件再重命名，写到一半掉电不会留下半个槽位。
#[derive(Debug)]
pub struct FilePositionStore {
    dir: PathBuf,
    // 串行化同一进程内的写操作
    write_lock: parking_lot::Mutex<()>,
}

impl FilePositionStore {
    /// 打开（必要时创建）存储目录
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Position storage initialized at {}", dir.display());
        Ok(Self {
            dir,
            write_lock: parking_lot::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("pos_{}.bin", slot))
    }

    fn write_file(path: &Path, pose: &ArmPose) -> Result<(), StoreError> {
        let tmp = path.with_extension("bin.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(SLOT_MAGIC)?;
            writer.write_all(&[SLOT_FORMAT_VERSION])?;
            bincode::serialize_into(&mut writer, pose)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_file(path: &Path) -> Result<ArmPose, StoreError> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != SLOT_MAGIC {
            return Err(StoreError::Corrupt(format!(
                "{}: magic mismatch",
                path.display()
            )));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != SLOT_FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "{}: unsupported version {}",
                path.display(),
                version[0]
            )));
        }

        Ok(bincode::deserialize_from(&mut reader)?)
    }
}

impl PositionStore for FilePositionStore {
    fn save(&self, slot: u8, pose: &ArmPose) -> Result<(), StoreError> {
        let i = check_slot(slot)?;
        let _guard = self.write_lock.lock();
        Self::write_file(&self.slot_path(i), pose)?;
        info!("Saved position to slot {}", slot);
        Ok(())
    }

    fn load(&self, slot: u8) -> Result<ArmPose, StoreError> {
        let i = check_slot(slot)?;
        match Self::read_file(&self.slot_path(i)) {
            Ok(pose) => {
                debug!("Loaded position from slot {}", slot);
                Ok(pose)
            },
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound { slot })
            },
            Err(e) => {
                warn!("Failed to load slot {}: {}", slot, e);
                Err(e)
            },
        }
    }

    fn exists(&self, slot: u8) -> bool {
        check_slot(slot).is_ok_and(|i| self.slot_path(i).is_file())
    }

    fn clear(&self, slot: u8) -> Result<(), StoreError> {
        let i = check_slot(slot)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.slot_path(i)) {
            Ok(()) => {
                info!("Cleared slot {}", slot);
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
