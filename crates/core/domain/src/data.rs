//! 寄存器区域与取值类型。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Modbus 四类数据区。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Coils,
    DiscreteInputs,
    HoldingRegisters,
    InputRegisters,
}

impl Area {
    pub const ALL: [Area; 4] = [
        Area::Coils,
        Area::DiscreteInputs,
        Area::HoldingRegisters,
        Area::InputRegisters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Area::Coils => "coils",
            Area::DiscreteInputs => "discrete_inputs",
            Area::HoldingRegisters => "holding_registers",
            Area::InputRegisters => "input_registers",
        }
    }

    /// 位区（线圈、离散输入）。
    pub fn is_bit(&self) -> bool {
        matches!(self, Area::Coils | Area::DiscreteInputs)
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的区域名。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown area: {0}")]
pub struct UnknownArea(pub String);

impl FromStr for Area {
    type Err = UnknownArea;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "coils" => Ok(Area::Coils),
            "discrete_inputs" => Ok(Area::DiscreteInputs),
            "holding_registers" => Ok(Area::HoldingRegisters),
            "input_registers" => Ok(Area::InputRegisters),
            other => Err(UnknownArea(other.to_string())),
        }
    }
}

/// 内存运行状态。
///
/// `PreRun` 只出现在启用了状态封存的内存上，且只能单向迁移到 `Run`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    PreRun,
    Run,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::PreRun => "pre_run",
            RunState::Run => "run",
        }
    }
}

/// 区域读写的值：位区为 bool，寄存器区为 u16。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AreaValues {
    Bits(Vec<bool>),
    Registers(Vec<u16>),
}

impl AreaValues {
    pub fn len(&self) -> usize {
        match self {
            AreaValues::Bits(values) => values.len(),
            AreaValues::Registers(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 四个区域的长度（构造后不可变）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoryLayout {
    pub coils: usize,
    pub discrete_inputs: usize,
    pub holding_registers: usize,
    pub input_registers: usize,
}

impl MemoryLayout {
    pub fn size_of(&self, area: Area) -> usize {
        match area {
            Area::Coils => self.coils,
            Area::DiscreteInputs => self.discrete_inputs,
            Area::HoldingRegisters => self.holding_registers,
            Area::InputRegisters => self.input_registers,
        }
    }
}

/// 整块内存的只读副本（诊断用）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterSnapshot {
    pub coils: Vec<bool>,
    pub discrete_inputs: Vec<bool>,
    pub holding_registers: Vec<u16>,
    pub input_registers: Vec<u16>,
    pub run_state: RunState,
}
