//! (port, unit-id, function code) → memory key 解析。

use crate::policy::PortPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 拒绝原因（协议层统一映射为异常码 0x02）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyDenial {
    #[error("unit id {0} is not routed")]
    UnroutedUnit(u8),
    #[error("unit id {unit_id} not allowed on port {port}")]
    UnitNotAllowed { port: u16, unit_id: u8 },
    #[error("memory {memory} not allowed on port {port}")]
    MemoryNotAllowed { port: u16, memory: String },
    #[error("function code {function_code} not allowed on port {port}")]
    FunctionCodeNotAllowed { port: u16, function_code: u8 },
}

/// unit-id → memory key 路由表。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable(BTreeMap<u8, String>);

impl RoutingTable {
    pub fn new(entries: impl IntoIterator<Item = (u8, String)>) -> Self {
        Self(entries.into_iter().collect())
    }

    pub fn memory_for(&self, unit_id: u8) -> Option<&str> {
        self.0.get(&unit_id).map(String::as_str)
    }

    pub fn contains_unit(&self, unit_id: u8) -> bool {
        self.0.contains_key(&unit_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.0.iter().map(|(unit_id, key)| (*unit_id, key.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 纯函数式解析器，启动后不可变，可通过 `Arc` 跨任务共享。
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    routing: RoutingTable,
    ports: HashMap<u16, PortPolicy>,
}

impl PolicyResolver {
    pub fn new(routing: RoutingTable, ports: HashMap<u16, PortPolicy>) -> Self {
        Self { routing, ports }
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn policy(&self, port: u16) -> Option<&PortPolicy> {
        self.ports.get(&port)
    }

    /// 解析目标内存。
    ///
    /// 1. unit-id 必须在路由表中
    /// 2. 端口无策略时放行
    /// 3. 否则 unit-id、内存、功能码需同时被策略允许
    pub fn resolve(&self, port: u16, unit_id: u8, function_code: u8) -> Result<&str, PolicyDenial> {
        let memory = self
            .routing
            .memory_for(unit_id)
            .ok_or(PolicyDenial::UnroutedUnit(unit_id))?;

        let Some(policy) = self.ports.get(&port) else {
            return Ok(memory);
        };
        if !policy.allows_unit_id(unit_id) {
            return Err(PolicyDenial::UnitNotAllowed { port, unit_id });
        }
        if !policy.allows_memory(memory) {
            return Err(PolicyDenial::MemoryNotAllowed {
                port,
                memory: memory.to_string(),
            });
        }
        if !policy.allows_function_code(function_code) {
            return Err(PolicyDenial::FunctionCodeNotAllowed {
                port,
                function_code,
            });
        }
        Ok(memory)
    }
}
