//! 写入命令校验与落地。

use crate::IngestError;
use crate::command::IngestCommand;
use domain::{Area, AreaValues, MemoryRegistry, RegisterError};
use std::sync::Arc;

/// 写入服务：按固定顺序校验命令后写入目标内存。
///
/// 1. 内存存在
/// 2. 区域合法
/// 3. `bools` / `values` 恰好一个
/// 4. 启用封存的内存进入 Run 后拒绝线圈与保持寄存器；未启用封存时四个区域都可写
/// 5. 载荷类型与区域匹配，数值布尔只能是 0 / 1
/// 6. 越界由存储层返回
#[derive(Debug, Clone)]
pub struct IngestService {
    memories: Arc<MemoryRegistry>,
}

impl IngestService {
    pub fn new(memories: Arc<MemoryRegistry>) -> Self {
        Self { memories }
    }

    pub fn memories(&self) -> &Arc<MemoryRegistry> {
        &self.memories
    }

    /// 执行写入，返回写入的值个数。
    pub fn ingest(&self, command: &IngestCommand) -> Result<usize, IngestError> {
        let store = self
            .memories
            .get(&command.memory)
            .ok_or_else(|| IngestError::UnknownMemory(command.memory.clone()))?;

        let area: Area = command
            .area
            .trim()
            .parse()
            .map_err(|_| IngestError::InvalidArea(command.area.clone()))?;

        let has_bools = !command.bools.is_empty();
        let has_values = !command.values.is_empty();
        if has_bools == has_values {
            return Err(IngestError::InvalidPayload);
        }

        if matches!(area, Area::Coils | Area::HoldingRegisters) && store.is_sealed() {
            return Err(IngestError::IngestDenied(area));
        }

        let values = if area.is_bit() {
            if !has_bools {
                return Err(IngestError::PayloadMismatch(area));
            }
            AreaValues::Bits(numeric_bools(&command.bools)?)
        } else {
            if !has_values {
                return Err(IngestError::PayloadMismatch(area));
            }
            AreaValues::Registers(command.values.clone())
        };

        // 校验期间闸门可能已打开，写锁内再判一次。
        match store.write_unless_sealed(area, command.address, &values) {
            Ok(()) => Ok(values.len()),
            Err(RegisterError::Sealed(area)) => Err(IngestError::IngestDenied(area)),
            Err(err) => Err(err.into()),
        }
    }
}

fn numeric_bools(raw: &[i64]) -> Result<Vec<bool>, IngestError> {
    raw.iter()
        .map(|value| match value {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IngestError::InvalidBoolean(*other)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_bools_accepts_only_zero_and_one() {
        assert_eq!(
            numeric_bools(&[0, 1, 1]).expect("bools"),
            vec![false, true, true]
        );
        assert!(matches!(
            numeric_bools(&[1, 2]),
            Err(IngestError::InvalidBoolean(2))
        ));
        assert!(matches!(
            numeric_bools(&[-1]),
            Err(IngestError::InvalidBoolean(-1))
        ));
    }
}
