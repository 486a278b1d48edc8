//! Raw Ingest 二进制帧。
//!
//! 帧格式（大端）：
//!
//! ```text
//! 0   1   2     3      4     5         6..8    8..10    10..12
//! 'R' 'I' ver=1 flags  area  reserved  mem_id  address  count   | payload
//! ```
//!
//! - area：1=线圈 2=离散输入 3=保持寄存器 4=输入寄存器
//! - 位区域 payload 为 `ceil(count / 8)` 字节（LSB 优先），寄存器区域为 `count * 2` 字节
//! - 每帧应答一个字节：`0x00` 成功，`0x01` 拒绝（随后关闭连接）

use crate::error::Rejected;
use domain::{Area, MemoryRegistry, RegisterError, RegisterStore};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const MAGIC: [u8; 2] = [0x52, 0x49];
pub const VERSION_V1: u8 = 0x01;
pub const HEADER_LEN: usize = 12;
pub const RESPONSE_OK: u8 = 0x00;
pub const RESPONSE_REJECTED: u8 = 0x01;

/// 帧头中的区域编码。
pub fn area_code(area: Area) -> u8 {
    match area {
        Area::Coils => 1,
        Area::DiscreteInputs => 2,
        Area::HoldingRegisters => 3,
        Area::InputRegisters => 4,
    }
}

pub fn area_from_code(code: u8) -> Option<Area> {
    match code {
        1 => Some(Area::Coils),
        2 => Some(Area::DiscreteInputs),
        3 => Some(Area::HoldingRegisters),
        4 => Some(Area::InputRegisters),
        _ => None,
    }
}

/// v1 帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub version: u8,
    pub flags: u8,
    pub area: Area,
    pub memory_id: u16,
    pub address: u16,
    pub count: u16,
}

impl RawHeader {
    pub fn new(area: Area, memory_id: u16, address: u16, count: u16) -> Self {
        Self {
            version: VERSION_V1,
            flags: 0,
            area,
            memory_id,
            address,
            count,
        }
    }

    /// 解析帧头：校验 magic、版本、区域与非零数量。
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self, Rejected> {
        if bytes[0..2] != MAGIC {
            return Err(Rejected::BadMagic);
        }
        if bytes[2] != VERSION_V1 {
            return Err(Rejected::UnsupportedVersion(bytes[2]));
        }
        let area = area_from_code(bytes[4]).ok_or(Rejected::InvalidArea(bytes[4]))?;
        let count = u16::from_be_bytes([bytes[10], bytes[11]]);
        if count == 0 {
            return Err(Rejected::ZeroCount);
        }
        Ok(Self {
            version: bytes[2],
            flags: bytes[3],
            area,
            memory_id: u16::from_be_bytes([bytes[6], bytes[7]]),
            address: u16::from_be_bytes([bytes[8], bytes[9]]),
            count,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let [m0, m1] = self.memory_id.to_be_bytes();
        let [a0, a1] = self.address.to_be_bytes();
        let [c0, c1] = self.count.to_be_bytes();
        [
            MAGIC[0],
            MAGIC[1],
            self.version,
            self.flags,
            area_code(self.area),
            0,
            m0,
            m1,
            a0,
            a1,
            c0,
            c1,
        ]
    }

    pub fn payload_len(&self) -> usize {
        payload_len(self.area, self.count)
    }
}

/// 区域与数量对应的 payload 字节数。
pub fn payload_len(area: Area, count: u16) -> usize {
    let count = usize::from(count);
    if area.is_bit() { count.div_ceil(8) } else { count * 2 }
}

/// 一个完整帧。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub header: RawHeader,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&self.header.encode());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// 读取一帧；对端在帧边界正常关闭时返回 `None`。
///
/// 帧头非法或总长度超过 `max_packet_bytes` 时，不读取 payload 直接拒绝。
pub async fn read_frame<R>(reader: &mut R, max_packet_bytes: usize) -> Result<Option<RawFrame>, Rejected>
where
    R: AsyncRead + Unpin,
{
    if max_packet_bytes <= HEADER_LEN {
        return Err(Rejected::FrameTooLarge(HEADER_LEN));
    }

    let mut header = [0u8; HEADER_LEN];
    let first = reader
        .read(&mut header)
        .await
        .map_err(|_| Rejected::Truncated)?;
    if first == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut header[first..])
        .await
        .map_err(|_| Rejected::Truncated)?;

    let header = RawHeader::parse(&header)?;
    let frame_len = HEADER_LEN + header.payload_len();
    if frame_len > max_packet_bytes {
        return Err(Rejected::FrameTooLarge(frame_len));
    }

    let mut payload = vec![0u8; header.payload_len()];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|_| Rejected::Truncated)?;
    Ok(Some(RawFrame { header, payload }))
}

/// 按 LSB 优先展开 `count` 位，payload 长度必须恰好为 `ceil(count / 8)`。
pub fn align_bits(payload: &[u8], count: u16) -> Result<Vec<bool>, Rejected> {
    let count = usize::from(count);
    if payload.len() != count.div_ceil(8) {
        return Err(Rejected::Misaligned);
    }
    Ok((0..count)
        .map(|index| payload[index / 8] & (1 << (index % 8)) != 0)
        .collect())
}

/// 按大端解析 `count` 个寄存器，payload 长度必须恰好为 `count * 2`。
pub fn align_registers(payload: &[u8], count: u16) -> Result<Vec<u16>, Rejected> {
    if payload.len() != usize::from(count) * 2 {
        return Err(Rejected::Misaligned);
    }
    Ok(payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Raw Ingest 可写入的内存。
pub trait RawWritableMemory: Send + Sync {
    fn write_coils(&self, address: u16, values: &[bool]) -> Result<(), RegisterError>;
    fn write_discrete_inputs(&self, address: u16, values: &[bool]) -> Result<(), RegisterError>;
    fn write_holding_registers(&self, address: u16, values: &[u16]) -> Result<(), RegisterError>;
    fn write_input_registers(&self, address: u16, values: &[u16]) -> Result<(), RegisterError>;
}

impl RawWritableMemory for RegisterStore {
    fn write_coils(&self, address: u16, values: &[bool]) -> Result<(), RegisterError> {
        RegisterStore::write_coils(self, address, values)
    }

    fn write_discrete_inputs(&self, address: u16, values: &[bool]) -> Result<(), RegisterError> {
        RegisterStore::write_discrete_inputs(self, address, values)
    }

    fn write_holding_registers(&self, address: u16, values: &[u16]) -> Result<(), RegisterError> {
        RegisterStore::write_holding_registers(self, address, values)
    }

    fn write_input_registers(&self, address: u16, values: &[u16]) -> Result<(), RegisterError> {
        RegisterStore::write_input_registers(self, address, values)
    }
}

/// 按帧头中的数字 ID 查找内存。
pub trait RawMemoryResolver: Send + Sync {
    fn resolve_memory_by_id(&self, memory_id: u16) -> Option<Arc<dyn RawWritableMemory>>;
}

impl RawMemoryResolver for MemoryRegistry {
    fn resolve_memory_by_id(&self, memory_id: u16) -> Option<Arc<dyn RawWritableMemory>> {
        self.get_by_id(memory_id)
            .map(|store| Arc::clone(store) as Arc<dyn RawWritableMemory>)
    }
}

/// 把 payload 对齐后写入目标区域。
pub fn apply(memory: &dyn RawWritableMemory, header: &RawHeader, payload: &[u8]) -> Result<(), Rejected> {
    let written = match header.area {
        Area::Coils => memory.write_coils(header.address, &align_bits(payload, header.count)?),
        Area::DiscreteInputs => {
            memory.write_discrete_inputs(header.address, &align_bits(payload, header.count)?)
        }
        Area::HoldingRegisters => memory
            .write_holding_registers(header.address, &align_registers(payload, header.count)?),
        Area::InputRegisters => memory
            .write_input_registers(header.address, &align_registers(payload, header.count)?),
    };
    written.map_err(|_| Rejected::WriteFailed)
}
