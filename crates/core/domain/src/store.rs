//! 并发安全的寄存器存储与状态封存闸门。
//!
//! 每个 `RegisterStore` 用一把读写锁覆盖四个区域和运行状态：
//! - 读取持有共享锁并返回副本
//! - 写入持有独占锁，先校验范围再整体写入
//! - 离散输入写入命中闸门地址且值为 true 时，`PreRun → Run` 单向迁移
//! - 封存内存进入 `Run` 后，`write_unless_sealed` 拒绝线圈与保持寄存器

use crate::data::{Area, AreaValues, MemoryLayout, RegisterSnapshot, RunState};
use crate::error::RegisterError;
use std::ops::Range;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Any,
    UnlessSealed,
}

struct StoreInner {
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    holding_registers: Vec<u16>,
    input_registers: Vec<u16>,
    run_state: RunState,
}

/// 单块 Modbus 内存。
pub struct RegisterStore {
    layout: MemoryLayout,
    gate_address: Option<u16>,
    inner: RwLock<StoreInner>,
}

impl RegisterStore {
    /// 按布局创建全零内存，初始状态为 `Run`。
    pub fn new(layout: MemoryLayout) -> Self {
        Self {
            layout,
            gate_address: None,
            inner: RwLock::new(StoreInner {
                coils: vec![false; layout.coils],
                discrete_inputs: vec![false; layout.discrete_inputs],
                holding_registers: vec![0; layout.holding_registers],
                input_registers: vec![0; layout.input_registers],
                run_state: RunState::Run,
            }),
        }
    }

    /// 启用状态封存：内存进入 `PreRun`，直到 `discrete_inputs[gate_address]` 被写为 true。
    pub fn with_state_sealing(mut self, gate_address: u16) -> Self {
        self.gate_address = Some(gate_address);
        self.write_guard().run_state = RunState::PreRun;
        self
    }

    pub fn layout(&self) -> MemoryLayout {
        self.layout
    }

    pub fn has_state_sealing(&self) -> bool {
        self.gate_address.is_some()
    }

    pub fn gate_address(&self) -> Option<u16> {
        self.gate_address
    }

    pub fn run_state(&self) -> RunState {
        self.read_guard().run_state
    }

    pub fn is_pre_run(&self) -> bool {
        self.run_state() == RunState::PreRun
    }

    /// 启用了封存且闸门已打开。
    pub fn is_sealed(&self) -> bool {
        self.has_state_sealing() && self.run_state() == RunState::Run
    }

    pub fn read_coils(&self, address: u16, count: usize) -> Result<Vec<bool>, RegisterError> {
        let inner = self.read_guard();
        let range = check_range(Area::Coils, inner.coils.len(), address, count)?;
        Ok(inner.coils[range].to_vec())
    }

    pub fn read_discrete_inputs(
        &self,
        address: u16,
        count: usize,
    ) -> Result<Vec<bool>, RegisterError> {
        let inner = self.read_guard();
        let range = check_range(Area::DiscreteInputs, inner.discrete_inputs.len(), address, count)?;
        Ok(inner.discrete_inputs[range].to_vec())
    }

    pub fn read_holding_registers(
        &self,
        address: u16,
        count: usize,
    ) -> Result<Vec<u16>, RegisterError> {
        let inner = self.read_guard();
        let range = check_range(
            Area::HoldingRegisters,
            inner.holding_registers.len(),
            address,
            count,
        )?;
        Ok(inner.holding_registers[range].to_vec())
    }

    pub fn read_input_registers(
        &self,
        address: u16,
        count: usize,
    ) -> Result<Vec<u16>, RegisterError> {
        let inner = self.read_guard();
        let range = check_range(Area::InputRegisters, inner.input_registers.len(), address, count)?;
        Ok(inner.input_registers[range].to_vec())
    }

    /// 按区域读取。
    pub fn read(&self, area: Area, address: u16, count: usize) -> Result<AreaValues, RegisterError> {
        match area {
            Area::Coils => self.read_coils(address, count).map(AreaValues::Bits),
            Area::DiscreteInputs => self.read_discrete_inputs(address, count).map(AreaValues::Bits),
            Area::HoldingRegisters => self
                .read_holding_registers(address, count)
                .map(AreaValues::Registers),
            Area::InputRegisters => self
                .read_input_registers(address, count)
                .map(AreaValues::Registers),
        }
    }

    pub fn write_coils(&self, address: u16, values: &[bool]) -> Result<(), RegisterError> {
        self.write_bits(Area::Coils, address, values, WriteMode::Any)
    }

    /// 写离散输入；命中封存闸门时迁移到 `Run`。
    pub fn write_discrete_inputs(&self, address: u16, values: &[bool]) -> Result<(), RegisterError> {
        self.write_bits(Area::DiscreteInputs, address, values, WriteMode::Any)
    }

    pub fn write_holding_registers(&self, address: u16, values: &[u16]) -> Result<(), RegisterError> {
        self.write_registers(Area::HoldingRegisters, address, values, WriteMode::Any)
    }

    pub fn write_input_registers(&self, address: u16, values: &[u16]) -> Result<(), RegisterError> {
        self.write_registers(Area::InputRegisters, address, values, WriteMode::Any)
    }

    /// 按区域写入，值类型必须与区域匹配。
    pub fn write(&self, area: Area, address: u16, values: &AreaValues) -> Result<(), RegisterError> {
        self.write_values(area, address, values, WriteMode::Any)
    }

    /// 与 `write` 相同，但封存内存进入 `Run` 后拒绝线圈与保持寄存器（`Sealed`）。
    ///
    /// 状态判断与写入在同一把写锁内完成，闸门迁移之后不会再有此类写入落地。
    pub fn write_unless_sealed(
        &self,
        area: Area,
        address: u16,
        values: &AreaValues,
    ) -> Result<(), RegisterError> {
        self.write_values(area, address, values, WriteMode::UnlessSealed)
    }

    fn write_values(
        &self,
        area: Area,
        address: u16,
        values: &AreaValues,
        mode: WriteMode,
    ) -> Result<(), RegisterError> {
        match values {
            AreaValues::Bits(bits) => self.write_bits(area, address, bits, mode),
            AreaValues::Registers(regs) => self.write_registers(area, address, regs, mode),
        }
    }

    fn write_bits(
        &self,
        area: Area,
        address: u16,
        values: &[bool],
        mode: WriteMode,
    ) -> Result<(), RegisterError> {
        let sealed_at = {
            let mut inner = self.write_guard();
            self.check_sealed(&inner, area, mode)?;
            let target = match area {
                Area::Coils => &mut inner.coils,
                Area::DiscreteInputs => &mut inner.discrete_inputs,
                _ => return Err(RegisterError::AreaMismatch(area)),
            };
            let range = check_range(area, target.len(), address, values.len())?;
            target[range.clone()].copy_from_slice(values);
            match self.gate_address {
                Some(gate)
                    if area == Area::DiscreteInputs
                        && inner.run_state == RunState::PreRun
                        && range.contains(&(gate as usize))
                        && values[gate as usize - range.start] =>
                {
                    inner.run_state = RunState::Run;
                    Some(gate)
                }
                _ => None,
            }
        };
        if let Some(gate) = sealed_at {
            info!(
                target: "mma.memory",
                gate_address = gate,
                "memory transitioned to run via discrete input gate"
            );
        }
        Ok(())
    }

    fn write_registers(
        &self,
        area: Area,
        address: u16,
        values: &[u16],
        mode: WriteMode,
    ) -> Result<(), RegisterError> {
        let mut inner = self.write_guard();
        self.check_sealed(&inner, area, mode)?;
        let target = match area {
            Area::HoldingRegisters => &mut inner.holding_registers,
            Area::InputRegisters => &mut inner.input_registers,
            _ => return Err(RegisterError::AreaMismatch(area)),
        };
        let range = check_range(area, target.len(), address, values.len())?;
        target[range].copy_from_slice(values);
        Ok(())
    }

    fn check_sealed(
        &self,
        inner: &StoreInner,
        area: Area,
        mode: WriteMode,
    ) -> Result<(), RegisterError> {
        let operator_area = matches!(area, Area::Coils | Area::HoldingRegisters);
        if mode == WriteMode::UnlessSealed
            && operator_area
            && self.has_state_sealing()
            && inner.run_state == RunState::Run
        {
            return Err(RegisterError::Sealed(area));
        }
        Ok(())
    }

    /// 复制四个区域与运行状态。
    pub fn snapshot(&self) -> RegisterSnapshot {
        let inner = self.read_guard();
        RegisterSnapshot {
            coils: inner.coils.clone(),
            discrete_inputs: inner.discrete_inputs.clone(),
            holding_registers: inner.holding_registers.clone(),
            input_registers: inner.input_registers.clone(),
            run_state: inner.run_state,
        }
    }

    // 写入只在范围校验通过后发生，锁中毒时数据仍然一致。
    fn read_guard(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RegisterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterStore")
            .field("layout", &self.layout)
            .field("gate_address", &self.gate_address)
            .field("run_state", &self.run_state())
            .finish()
    }
}

fn check_range(
    area: Area,
    size: usize,
    address: u16,
    count: usize,
) -> Result<Range<usize>, RegisterError> {
    let start = address as usize;
    match start.checked_add(count) {
        Some(end) if count > 0 && end <= size => Ok(start..end),
        _ => Err(RegisterError::OutOfRange {
            area,
            address,
            count,
            size,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_range_rejects_zero_count() {
        assert!(check_range(Area::Coils, 8, 0, 0).is_err());
    }

    #[test]
    fn check_range_accepts_exact_fit() {
        assert_eq!(check_range(Area::Coils, 8, 6, 2).expect("range"), 6..8);
        assert!(check_range(Area::Coils, 8, 7, 2).is_err());
    }

    #[test]
    fn check_range_on_empty_area() {
        assert!(check_range(Area::InputRegisters, 0, 0, 1).is_err());
    }
}
