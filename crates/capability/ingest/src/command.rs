use serde::{Deserialize, Serialize};

/// 统一写入命令（REST、MQTT 共用）。
///
/// `bools` 与 `values` 必须恰好一个非空；`bools` 为数值布尔（0 / 1）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCommand {
    pub memory: String,
    pub area: String,
    pub address: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bools: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<u16>,
}

impl IngestCommand {
    /// 命令携带的值个数。
    pub fn len(&self) -> usize {
        self.bools.len() + self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
