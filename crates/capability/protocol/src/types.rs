//! Modbus 功能码、异常码与协议上限

/// 单次读线圈 / 离散输入上限
pub const MAX_READ_BITS: u16 = 2000;
/// 单次读寄存器上限
pub const MAX_READ_REGISTERS: u16 = 125;
/// 单次写多个线圈上限
pub const MAX_WRITE_BITS: u16 = 1968;
/// 单次写多个寄存器上限
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// 支持的 Modbus 功能码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// 读线圈 (0x01)
    ReadCoils = 0x01,
    /// 读离散输入 (0x02)
    ReadDiscreteInputs = 0x02,
    /// 读保持寄存器 (0x03)
    ReadHoldingRegisters = 0x03,
    /// 读输入寄存器 (0x04)
    ReadInputRegisters = 0x04,
    /// 写单个线圈 (0x05)
    WriteSingleCoil = 0x05,
    /// 写单个寄存器 (0x06)
    WriteSingleRegister = 0x06,
    /// 写多个线圈 (0x0F)
    WriteMultipleCoils = 0x0F,
    /// 写多个寄存器 (0x10)
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::ReadCoils),
            0x02 => Some(Self::ReadDiscreteInputs),
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x05 => Some(Self::WriteSingleCoil),
            0x06 => Some(Self::WriteSingleRegister),
            0x0F => Some(Self::WriteMultipleCoils),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }
}

/// Modbus 异常码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// 非法功能 (0x01)：未知功能码，或内存处于 PreRun
    IllegalFunction = 0x01,
    /// 非法数据地址 (0x02)：策略拒绝或越界
    IllegalDataAddress = 0x02,
    /// 非法数据值 (0x03)：线圈值非法、数量越限、字节数不符
    IllegalDataValue = 0x03,
}
