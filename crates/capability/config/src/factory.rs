//! 由已校验的配置构建运行时内存。

use crate::ConfigError;
use crate::model::MemoryConfig;
use domain::{MemoryLayout, MemoryRegistry, RegisterStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// 构建全部内存并登记到注册表。
pub fn build_memories(config: &MemoryConfig) -> Result<MemoryRegistry, ConfigError> {
    let mut memories = HashMap::with_capacity(config.memories.len());
    for (key, block) in &config.memories {
        let layout = MemoryLayout {
            coils: block.coils.size,
            discrete_inputs: block.discrete_inputs.size,
            holding_registers: block.holding_registers.size,
            input_registers: block.input_registers.size,
        };
        let mut store = RegisterStore::new(layout);
        match block.sealing_gate() {
            Some(gate) => {
                let address = u16::try_from(gate.address).map_err(|_| {
                    ConfigError::Validation(format!(
                        "memory '{key}': state_sealing gate address {} exceeds 65535",
                        gate.address
                    ))
                })?;
                store = store.with_state_sealing(address);
                info!(
                    target: "mma.boot",
                    memory = %key,
                    pre_run = store.is_pre_run(),
                    gate_address = address,
                    "state sealing enabled"
                );
            }
            None => {
                info!(target: "mma.boot", memory = %key, "state sealing disabled");
            }
        }
        memories.insert(key.clone(), Arc::new(store));
    }

    let default_key = config
        .default_key()
        .ok_or_else(|| ConfigError::Validation("no default memory defined".to_string()))?;
    Ok(MemoryRegistry::new(memories, default_key)?)
}
