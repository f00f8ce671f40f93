//! 持久化边界：JSON 键值存储
//!
//! 每个集合以一个 JSON 文档保存在一个键下，每次修改后整体重写，
//! 启动时读回。

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt document under key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// 键值存储后端
///
/// - `load` 在键不存在时返回 `Ok(None)`
/// - `save` 整体替换键下的文档
/// - 所有 I/O 错误向上传播
pub trait Storage: Send + Sync {
    fn load(&self, key: &str) -> StorageResult<Option<Value>>;

    fn save(&self, key: &str, value: &Value) -> StorageResult<()>;
}

/// 内存后端，用于测试和临时运行
#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.documents.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> StorageResult<()> {
        self.documents.write().insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// 文件后端：数据目录下每个键一个 `<key>.json` 文件
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: root.display().to_string(),
            source,
        })?;
        info!("Using JSON file storage at {}", root.display());
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

impl Storage for JsonFileStorage {
    fn load(&self, key: &str) -> StorageResult<Option<Value>> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };

        let value = serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        debug!("Loaded {} ({} bytes)", key, bytes.len());
        Ok(Some(value))
    }

    fn save(&self, key: &str, value: &Value) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Corrupt {
            key: key.to_string(),
            source,
        })?;

        // 先写临时文件再重命名，避免半写入的文档
        run_blocking(|| -> StorageResult<()> {
            let mut file = fs::File::create(&tmp).map_err(io_err)?;
            file.write_all(&bytes).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
            fs::rename(&tmp, &path).map_err(io_err)
        })?;

        debug!("Saved {} ({} bytes)", key, bytes.len());
        Ok(())
    }
}

/// 在多线程运行时的工作线程上执行阻塞 I/O 时，先让出该线程上的其他任务
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
