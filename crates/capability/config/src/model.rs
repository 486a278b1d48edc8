//! config.yaml 结构定义。

use mma_policy::{PortPolicy, RoutingTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 每个 Modbus 端口的默认最大并发连接数。
pub const DEFAULT_MAX_CONNECTIONS: usize = 32;
/// 未配置任何端口时使用的 Modbus 监听端口。
pub const DEFAULT_MODBUS_PORT: u16 = 5020;

/// 根配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub memory: MemoryConfig,
    pub routing: RoutingConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<u16, PortConfig>,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub raw_ingest: RawIngestConfig,
}

/// 内存定义集合（key → 内存块）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub memories: BTreeMap<String, MemoryBlock>,
}

impl MemoryConfig {
    /// 标记为 default 的内存 key。
    pub fn default_key(&self) -> Option<&str> {
        self.memories
            .iter()
            .find(|(_, block)| block.default)
            .map(|(key, _)| key.as_str())
    }
}

/// 单块内存：四个区域与可选的状态封存。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBlock {
    #[serde(default)]
    pub default: bool,
    pub coils: AreaConfig,
    pub discrete_inputs: AreaConfig,
    pub holding_registers: AreaConfig,
    pub input_registers: AreaConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_sealing: Option<StateSealingConfig>,
}

impl MemoryBlock {
    /// 启用时返回闸门配置。
    pub fn sealing_gate(&self) -> Option<&GateConfig> {
        self.state_sealing
            .as_ref()
            .filter(|sealing| sealing.enable)
            .map(|sealing| &sealing.gate)
    }
}

/// 区域定义；`start` 仅用于诊断展示，寻址始终从 0 开始。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AreaConfig {
    #[serde(default)]
    pub start: u16,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSealingConfig {
    pub enable: bool,
    pub gate: GateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub area: String,
    pub address: u32,
}

/// 路由配置。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub unit_id_map: RoutingTable,
}

/// Modbus 监听端口配置：访问策略加监听器参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(flatten)]
    pub policy: PortPolicy,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default, skip_serializing_if = "IpFilterConfig::is_empty")]
    pub ip_filter: IpFilterConfig,
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

/// 来源 IP 过滤（单个 IP 或 CIDR）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpFilterConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl IpFilterConfig {
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// REST 接口配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub enabled: bool,
    pub address: String,
    pub auth_enabled: bool,
    pub tokens: Vec<String>,
    pub enable_ingest: bool,
    pub enable_read: bool,
    pub enable_diagnostics: bool,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:8080".to_string(),
            auth_enabled: true,
            tokens: Vec::new(),
            enable_ingest: true,
            enable_read: true,
            enable_diagnostics: true,
        }
    }
}

/// MQTT 写入订阅配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    /// `tcp://host:port`、`mqtt://host:port` 或 `host:port`。
    pub broker: String,
    pub client_id: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "tcp://127.0.0.1:1883".to_string(),
            client_id: String::new(),
            topic: "mma/ingest".to_string(),
            username: None,
            password: None,
        }
    }
}

/// Raw Ingest 监听配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawIngestConfig {
    pub enabled: bool,
    pub listen: String,
    pub max_packet_bytes: usize,
    pub read_timeout_ms: u64,
}

impl Default for RawIngestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:5021".to_string(),
            max_packet_bytes: 4096,
            read_timeout_ms: 5000,
        }
    }
}
