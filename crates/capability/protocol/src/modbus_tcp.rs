//! Modbus TCP 帧编解码与 PDU 处理。
//!
//! 一个请求帧 = 7 字节 MBAP 头 + PDU。响应沿用请求的事务号与 unit id：
//! - 策略拒绝、地址越界或数量为 0：异常 0x02
//! - 内存处于 PreRun、未知功能码：异常 0x01
//! - 线圈值非法、数量越限、字节数不符：异常 0x03

use crate::error::ProtocolError;
use crate::types::{
    ExceptionCode, FunctionCode, MAX_READ_BITS, MAX_READ_REGISTERS, MAX_WRITE_BITS,
    MAX_WRITE_REGISTERS,
};
use domain::{MemoryRegistry, RegisterError, RegisterStore};
use mma_policy::PolicyResolver;
use std::sync::Arc;
use tracing::debug;

/// MBAP 头长度
pub const MBAP_HEADER_LEN: usize = 7;
/// MBAP length 字段上限（unit id + 最大 253 字节 PDU）
pub const MAX_MBAP_LENGTH: u16 = 254;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

/// MBAP 报文头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// 其后字节数（unit id + PDU）
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn parse(bytes: &[u8; MBAP_HEADER_LEN]) -> Self {
        Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        }
    }

    /// 校验协议号与长度，返回 PDU 长度。
    pub fn pdu_len(&self) -> Result<usize, ProtocolError> {
        if self.protocol_id != 0 {
            return Err(ProtocolError::MalformedFrame(format!(
                "unexpected protocol id {}",
                self.protocol_id
            )));
        }
        if self.length < 2 || self.length > MAX_MBAP_LENGTH {
            return Err(ProtocolError::MalformedFrame(format!(
                "invalid mbap length {}",
                self.length
            )));
        }
        Ok(usize::from(self.length) - 1)
    }

    pub fn encode(&self) -> [u8; MBAP_HEADER_LEN] {
        let [t0, t1] = self.transaction_id.to_be_bytes();
        let [p0, p1] = self.protocol_id.to_be_bytes();
        let [l0, l1] = self.length.to_be_bytes();
        [t0, t1, p0, p1, l0, l1, self.unit_id]
    }
}

/// 按请求头组装响应帧。
pub fn encode_response(request: &MbapHeader, pdu: &[u8]) -> Vec<u8> {
    let header = MbapHeader {
        transaction_id: request.transaction_id,
        protocol_id: 0,
        length: (pdu.len() + 1) as u16,
        unit_id: request.unit_id,
    };
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(pdu);
    frame
}

/// 按 unit id 与功能码选择目标内存；`None` 表示拒绝。
pub trait MemoryResolver: Send + Sync {
    fn resolve(&self, unit_id: u8, function_code: u8) -> Option<Arc<RegisterStore>>;
}

/// 基于路由表与端口策略的解析器，绑定到一个监听端口。
pub struct PolicyMemoryResolver {
    port: u16,
    policy: Arc<PolicyResolver>,
    memories: Arc<MemoryRegistry>,
}

impl PolicyMemoryResolver {
    pub fn new(port: u16, policy: Arc<PolicyResolver>, memories: Arc<MemoryRegistry>) -> Self {
        Self {
            port,
            policy,
            memories,
        }
    }
}

impl MemoryResolver for PolicyMemoryResolver {
    fn resolve(&self, unit_id: u8, function_code: u8) -> Option<Arc<RegisterStore>> {
        match self.policy.resolve(self.port, unit_id, function_code) {
            Ok(key) => self.memories.get(key).cloned(),
            Err(denial) => {
                debug!(
                    target: "mma.modbus",
                    port = self.port,
                    unit_id,
                    function_code,
                    reason = %denial,
                    "request denied by policy"
                );
                None
            }
        }
    }
}

/// 未配置端口时的兜底解析器：所有 unit id 都落到默认内存，不做访问控制。
pub struct DefaultMemoryResolver {
    memories: Arc<MemoryRegistry>,
}

impl DefaultMemoryResolver {
    pub fn new(memories: Arc<MemoryRegistry>) -> Self {
        Self { memories }
    }
}

impl MemoryResolver for DefaultMemoryResolver {
    fn resolve(&self, _unit_id: u8, _function_code: u8) -> Option<Arc<RegisterStore>> {
        Some(Arc::clone(self.memories.default_memory()))
    }
}

/// 处理一个请求 PDU，返回响应 PDU（正常或异常）。
pub fn handle_pdu(resolver: &dyn MemoryResolver, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let Some((&code, data)) = pdu.split_first() else {
        return exception(0, ExceptionCode::IllegalFunction);
    };
    let Some(memory) = resolver.resolve(unit_id, code) else {
        return exception(code, ExceptionCode::IllegalDataAddress);
    };
    if memory.is_pre_run() {
        return exception(code, ExceptionCode::IllegalFunction);
    }
    let Some(function) = FunctionCode::from_u8(code) else {
        return exception(code, ExceptionCode::IllegalFunction);
    };
    dispatch(&memory, function, data).unwrap_or_else(|error| exception(code, error))
}

/// 异常 PDU：功能码最高位置 1。
pub fn exception(function_code: u8, code: ExceptionCode) -> Vec<u8> {
    vec![function_code | 0x80, code as u8]
}

pub fn is_exception(pdu: &[u8]) -> bool {
    pdu.first().is_some_and(|code| code & 0x80 != 0)
}

fn dispatch(
    memory: &RegisterStore,
    function: FunctionCode,
    data: &[u8],
) -> Result<Vec<u8>, ExceptionCode> {
    let code = function as u8;
    match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            let (address, count) = address_and_quantity(data)?;
            check_quantity(count, MAX_READ_BITS)?;
            let bits = if function == FunctionCode::ReadCoils {
                memory.read_coils(address, count.into())
            } else {
                memory.read_discrete_inputs(address, count.into())
            }
            .map_err(address_error)?;
            let packed = pack_bits(&bits);
            let mut response = Vec::with_capacity(2 + packed.len());
            response.push(code);
            response.push(packed.len() as u8);
            response.extend_from_slice(&packed);
            Ok(response)
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let (address, count) = address_and_quantity(data)?;
            check_quantity(count, MAX_READ_REGISTERS)?;
            let registers = if function == FunctionCode::ReadHoldingRegisters {
                memory.read_holding_registers(address, count.into())
            } else {
                memory.read_input_registers(address, count.into())
            }
            .map_err(address_error)?;
            let mut response = Vec::with_capacity(2 + registers.len() * 2);
            response.push(code);
            response.push((registers.len() * 2) as u8);
            for value in registers {
                response.extend_from_slice(&value.to_be_bytes());
            }
            Ok(response)
        }
        FunctionCode::WriteSingleCoil => {
            let (address, raw) = address_and_quantity(data)?;
            let value = match raw {
                COIL_ON => true,
                COIL_OFF => false,
                _ => return Err(ExceptionCode::IllegalDataValue),
            };
            memory
                .write_coils(address, &[value])
                .map_err(address_error)?;
            Ok(echo(code, &data[..4]))
        }
        FunctionCode::WriteSingleRegister => {
            let (address, value) = address_and_quantity(data)?;
            memory
                .write_holding_registers(address, &[value])
                .map_err(address_error)?;
            Ok(echo(code, &data[..4]))
        }
        FunctionCode::WriteMultipleCoils => {
            let (address, count) = address_and_quantity(data)?;
            check_quantity(count, MAX_WRITE_BITS)?;
            let payload = byte_counted_payload(data, usize::from(count).div_ceil(8))?;
            let bits = unpack_bits(payload, count.into());
            memory.write_coils(address, &bits).map_err(address_error)?;
            Ok(echo(code, &data[..4]))
        }
        FunctionCode::WriteMultipleRegisters => {
            let (address, count) = address_and_quantity(data)?;
            check_quantity(count, MAX_WRITE_REGISTERS)?;
            let payload = byte_counted_payload(data, usize::from(count) * 2)?;
            let registers: Vec<u16> = payload
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            memory
                .write_holding_registers(address, &registers)
                .map_err(address_error)?;
            Ok(echo(code, &data[..4]))
        }
    }
}

/// 前 4 字节：起始地址 + 数量（或写入值）。
fn address_and_quantity(data: &[u8]) -> Result<(u16, u16), ExceptionCode> {
    match data {
        [a0, a1, q0, q1, ..] => Ok((
            u16::from_be_bytes([*a0, *a1]),
            u16::from_be_bytes([*q0, *q1]),
        )),
        _ => Err(ExceptionCode::IllegalDataValue),
    }
}

/// 数量为 0 按越界处理；超过单帧上限为非法数据值。
fn check_quantity(count: u16, max: u16) -> Result<(), ExceptionCode> {
    match count {
        0 => Err(ExceptionCode::IllegalDataAddress),
        count if count > max => Err(ExceptionCode::IllegalDataValue),
        _ => Ok(()),
    }
}

/// 写多个请求的数据段：第 5 字节为字节数，必须与数量一致。
fn byte_counted_payload(data: &[u8], expected: usize) -> Result<&[u8], ExceptionCode> {
    let byte_count = usize::from(*data.get(4).ok_or(ExceptionCode::IllegalDataValue)?);
    if byte_count != expected {
        return Err(ExceptionCode::IllegalDataValue);
    }
    data.get(5..5 + byte_count)
        .ok_or(ExceptionCode::IllegalDataValue)
}

fn address_error(error: RegisterError) -> ExceptionCode {
    match error {
        RegisterError::OutOfRange { .. } => ExceptionCode::IllegalDataAddress,
        RegisterError::AreaMismatch(_) => ExceptionCode::IllegalDataValue,
        RegisterError::Sealed(_) => ExceptionCode::IllegalFunction,
    }
}

fn echo(code: u8, header: &[u8]) -> Vec<u8> {
    let mut response = Vec::with_capacity(1 + header.len());
    response.push(code);
    response.extend_from_slice(header);
    response
}

/// 按 LSB 优先打包位。
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (index, _) in bits.iter().enumerate().filter(|(_, bit)| **bit) {
        packed[index / 8] |= 1 << (index % 8);
    }
    packed
}

/// 按 LSB 优先解包前 `count` 位。
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|index| {
            bytes
                .get(index / 8)
                .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
        })
        .collect()
}
