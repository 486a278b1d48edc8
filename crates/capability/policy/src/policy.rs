//! 端口访问策略：unit-id / 内存选择器、读写模式、功能码 ACL。

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;

/// 只读端口允许的功能码（读线圈、读离散输入、读保持寄存器、读输入寄存器）。
pub const READ_FUNCTION_CODES: [u8; 4] = [1, 2, 3, 4];

const ALL_KEYWORD: &str = "all";

/// 端口读写模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    #[serde(rename = "read-only")]
    ReadOnly,
    #[serde(rename = "read-write")]
    ReadWrite,
}

/// YAML 中的选择器写法：`all` 或列表。
#[derive(Deserialize)]
#[serde(untagged)]
enum SelectorRepr<T> {
    Keyword(String),
    List(Vec<T>),
}

/// unit-id 选择器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitIdSelector {
    All,
    List(BTreeSet<u8>),
}

impl UnitIdSelector {
    pub fn contains(&self, unit_id: u8) -> bool {
        match self {
            UnitIdSelector::All => true,
            UnitIdSelector::List(ids) => ids.contains(&unit_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, UnitIdSelector::List(ids) if ids.is_empty())
    }
}

impl<'de> Deserialize<'de> for UnitIdSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match SelectorRepr::<u8>::deserialize(deserializer)? {
            SelectorRepr::Keyword(word) if word == ALL_KEYWORD => Ok(UnitIdSelector::All),
            SelectorRepr::Keyword(word) => Err(D::Error::custom(format!(
                "unit_ids must be 'all' or a list of 0..255, got '{word}'"
            ))),
            SelectorRepr::List(ids) => Ok(UnitIdSelector::List(ids.into_iter().collect())),
        }
    }
}

impl Serialize for UnitIdSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            UnitIdSelector::All => serializer.serialize_str(ALL_KEYWORD),
            UnitIdSelector::List(ids) => serializer.collect_seq(ids),
        }
    }
}

/// 内存选择器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemorySelector {
    All,
    List(BTreeSet<String>),
}

impl MemorySelector {
    pub fn contains(&self, memory: &str) -> bool {
        match self {
            MemorySelector::All => true,
            MemorySelector::List(keys) => keys.contains(memory),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MemorySelector::List(keys) if keys.is_empty())
    }

    /// 列表形式下的内存 key（`all` 返回空迭代）。
    pub fn listed(&self) -> impl Iterator<Item = &str> {
        let keys = match self {
            MemorySelector::All => None,
            MemorySelector::List(keys) => Some(keys),
        };
        keys.into_iter().flatten().map(String::as_str)
    }
}

impl<'de> Deserialize<'de> for MemorySelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match SelectorRepr::<String>::deserialize(deserializer)? {
            SelectorRepr::Keyword(word) if word == ALL_KEYWORD => Ok(MemorySelector::All),
            SelectorRepr::Keyword(word) => Err(D::Error::custom(format!(
                "memories must be 'all' or a list, got '{word}'"
            ))),
            SelectorRepr::List(keys) => Ok(MemorySelector::List(keys.into_iter().collect())),
        }
    }
}

impl Serialize for MemorySelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MemorySelector::All => serializer.serialize_str(ALL_KEYWORD),
            MemorySelector::List(keys) => serializer.collect_seq(keys),
        }
    }
}

/// 功能码白名单 / 黑名单。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCodeAcl {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<u8>,
}

impl FunctionCodeAcl {
    /// 黑名单优先；白名单非空时只放行列出的功能码。
    pub fn permits(&self, function_code: u8) -> bool {
        if self.deny.contains(&function_code) {
            return false;
        }
        self.allow.is_empty() || self.allow.contains(&function_code)
    }
}

/// 单个监听端口的访问策略。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPolicy {
    pub unit_ids: UnitIdSelector,
    pub memories: MemorySelector,
    pub access: AccessMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_codes: Option<FunctionCodeAcl>,
}

impl PortPolicy {
    /// 不限制 unit-id 与内存的读写端口。
    pub fn allow_all(access: AccessMode) -> Self {
        Self {
            unit_ids: UnitIdSelector::All,
            memories: MemorySelector::All,
            access,
            function_codes: None,
        }
    }

    pub fn allows_unit_id(&self, unit_id: u8) -> bool {
        self.unit_ids.contains(unit_id)
    }

    pub fn allows_memory(&self, memory: &str) -> bool {
        self.memories.contains(memory)
    }

    /// 只读端口只放行 1..=4，忽略 allow 列表；deny 列表在任何模式下都生效。
    pub fn allows_function_code(&self, function_code: u8) -> bool {
        let denied = self
            .function_codes
            .as_ref()
            .is_some_and(|acl| acl.deny.contains(&function_code));
        if denied {
            return false;
        }
        if self.access == AccessMode::ReadOnly {
            return READ_FUNCTION_CODES.contains(&function_code);
        }
        self.function_codes
            .as_ref()
            .is_none_or(|acl| acl.permits(function_code))
    }
}
