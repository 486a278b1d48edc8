//! 启动期配置校验：任何错误都阻止启动。

use crate::ConfigError;
use crate::model::{AppConfig, MemoryBlock, MemoryConfig, RoutingConfig};
use domain::Area;
use mma_policy::UnitIdSelector;

/// Modbus 地址为 u16，单个区域最多 65536 个点。
pub const MAX_AREA_SIZE: usize = u16::MAX as usize + 1;
/// Raw Ingest 帧头长度，`max_packet_bytes` 必须大于它。
const RAW_INGEST_HEADER_LEN: usize = 12;

impl AppConfig {
    /// 校验全部配置段。
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.memory.validate()?;
        self.routing.validate(&self.memory)?;
        self.validate_ports()?;
        self.validate_transports()
    }

    fn validate_ports(&self) -> Result<(), ConfigError> {
        for (port, config) in &self.ports {
            if *port == 0 {
                return Err(invalid("invalid port 0"));
            }
            let policy = &config.policy;
            if policy.unit_ids.is_empty() {
                return Err(invalid(format!("ports.{port}.unit_ids cannot be empty")));
            }
            if policy.memories.is_empty() {
                return Err(invalid(format!("ports.{port}.memories cannot be empty")));
            }
            if let UnitIdSelector::List(ids) = &policy.unit_ids {
                for unit_id in ids {
                    if !self.routing.unit_id_map.contains_unit(*unit_id) {
                        return Err(invalid(format!(
                            "ports.{port}: unit_id {unit_id} not in routing.unit_id_map"
                        )));
                    }
                }
            }
            for memory in policy.memories.listed() {
                if memory.trim().is_empty() {
                    return Err(invalid(format!("ports.{port}: memory name cannot be empty")));
                }
                if !self.memory.memories.contains_key(memory) {
                    return Err(invalid(format!("ports.{port}: unknown memory '{memory}'")));
                }
            }
            if config.max_connections == 0 {
                return Err(invalid(format!("ports.{port}.max_connections must be > 0")));
            }
        }
        Ok(())
    }

    fn validate_transports(&self) -> Result<(), ConfigError> {
        let raw = &self.raw_ingest;
        if raw.enabled {
            if raw.listen.trim().is_empty() {
                return Err(invalid("raw_ingest.listen is required"));
            }
            if raw.max_packet_bytes <= RAW_INGEST_HEADER_LEN {
                return Err(invalid(format!(
                    "raw_ingest.max_packet_bytes must be > {RAW_INGEST_HEADER_LEN}"
                )));
            }
            if raw.read_timeout_ms == 0 {
                return Err(invalid("raw_ingest.read_timeout_ms must be > 0"));
            }
        }

        let rest = &self.rest;
        if rest.enabled {
            if rest.address.trim().is_empty() {
                return Err(invalid("rest.address is required"));
            }
            if rest.auth_enabled && rest.tokens.iter().all(|token| token.trim().is_empty()) {
                return Err(invalid("rest.auth_enabled requires at least one token"));
            }
        }

        let mqtt = &self.mqtt;
        if mqtt.enabled {
            if mqtt.broker.trim().is_empty() {
                return Err(invalid("mqtt.broker is required"));
            }
            if mqtt.topic.trim().is_empty() {
                return Err(invalid("mqtt.topic is required"));
            }
        }
        Ok(())
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memories.is_empty() {
            return Err(invalid("no memories defined"));
        }
        let mut defaults = 0;
        for (key, block) in &self.memories {
            if key.trim().is_empty() {
                return Err(invalid("memory id cannot be empty"));
            }
            if block.default {
                defaults += 1;
            }
            validate_block(key, block)?;
        }
        match defaults {
            0 => Err(invalid("no default memory defined")),
            1 => Ok(()),
            _ => Err(invalid("multiple default memories defined")),
        }
    }
}

fn validate_block(key: &str, block: &MemoryBlock) -> Result<(), ConfigError> {
    let areas = [
        (Area::Coils, block.coils.size),
        (Area::DiscreteInputs, block.discrete_inputs.size),
        (Area::HoldingRegisters, block.holding_registers.size),
        (Area::InputRegisters, block.input_registers.size),
    ];
    for (area, size) in areas {
        if size > MAX_AREA_SIZE {
            return Err(invalid(format!(
                "memory '{key}': {area}.size must be <= {MAX_AREA_SIZE}"
            )));
        }
    }

    if let Some(gate) = block.sealing_gate() {
        if gate.area != Area::DiscreteInputs.as_str() {
            return Err(invalid(format!(
                "memory '{key}': state_sealing gate area must be 'discrete_inputs', got '{}'",
                gate.area
            )));
        }
        if gate.address as usize >= block.discrete_inputs.size {
            return Err(invalid(format!(
                "memory '{key}': state_sealing gate address {} outside discrete_inputs (size {})",
                gate.address, block.discrete_inputs.size
            )));
        }
    }
    Ok(())
}

impl RoutingConfig {
    pub fn validate(&self, memory: &MemoryConfig) -> Result<(), ConfigError> {
        if self.unit_id_map.is_empty() {
            return Err(invalid("routing.unit_id_map must not be empty"));
        }
        for (unit_id, key) in self.unit_id_map.iter() {
            if !memory.memories.contains_key(key) {
                return Err(invalid(format!(
                    "routing.unit_id_map[{unit_id}] references unknown memory '{key}'"
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}
