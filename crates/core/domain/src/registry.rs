//! 进程级内存注册表：启动时构建，之后只读。

use crate::store::RegisterStore;
use std::collections::HashMap;
use std::sync::Arc;

/// 注册表构建错误。
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no memories defined")]
    Empty,
    #[error("default memory not registered: {0}")]
    MissingDefault(String),
}

/// 按 key 持有全部内存。
#[derive(Debug)]
pub struct MemoryRegistry {
    memories: HashMap<String, Arc<RegisterStore>>,
    default_key: String,
}

impl MemoryRegistry {
    pub fn new(
        memories: HashMap<String, Arc<RegisterStore>>,
        default_key: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let default_key = default_key.into();
        if memories.is_empty() {
            return Err(RegistryError::Empty);
        }
        if !memories.contains_key(&default_key) {
            return Err(RegistryError::MissingDefault(default_key));
        }
        Ok(Self {
            memories,
            default_key,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Arc<RegisterStore>> {
        self.memories.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.memories.contains_key(key)
    }

    /// Raw Ingest 使用的数字 ID：按十进制字符串匹配 key（1 → "1"）。
    pub fn get_by_id(&self, id: u16) -> Option<&Arc<RegisterStore>> {
        self.memories.get(&id.to_string())
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    pub fn default_memory(&self) -> &Arc<RegisterStore> {
        &self.memories[&self.default_key]
    }

    /// 按 key 排序后的全部 key。
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.memories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<RegisterStore>)> {
        self.memories.iter().map(|(key, store)| (key.as_str(), store))
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }
}
