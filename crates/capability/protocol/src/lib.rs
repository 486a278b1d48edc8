//! # 协议能力模块
//!
//! 对外暴露内存的两个二进制入口：
//! - **Modbus TCP 服务端**：FC 1/2/3/4/5/6/15/16，按端口策略路由到内存
//! - **Raw Ingest**：自定义二进制帧，按数字 ID 直写内存任意区域
//!
//! ## 架构
//!
//! ```text
//! TcpListener (每端口)
//!       │  IP 过滤 → 连接数准入
//!       ▼
//! MBAP 帧 ──► MemoryResolver (路由 + 端口策略) ──► RegisterStore
//!
//! TcpListener (raw ingest)
//!       │  逐帧超时 → 帧头校验 → 长度上限
//!       ▼
//! RawFrame ──► RawMemoryResolver (数字 ID) ──► RawWritableMemory
//! ```

mod error;
mod ip_filter;
mod modbus_tcp;
mod raw_ingest;
mod raw_ingest_server;
mod tcp_server;
mod types;

pub use error::{ProtocolError, Rejected};
pub use ip_filter::IpFilter;
pub use modbus_tcp::{
    DefaultMemoryResolver, MAX_MBAP_LENGTH, MBAP_HEADER_LEN, MbapHeader, MemoryResolver,
    PolicyMemoryResolver, encode_response, exception, handle_pdu, is_exception, pack_bits,
    unpack_bits,
};
pub use raw_ingest::{
    HEADER_LEN, MAGIC, RESPONSE_OK, RESPONSE_REJECTED, RawFrame, RawHeader, RawMemoryResolver,
    RawWritableMemory, VERSION_V1, align_bits, align_registers, apply, area_code, area_from_code,
    payload_len, read_frame,
};
pub use raw_ingest_server::{RawIngestServer, RawIngestServerConfig};
pub use tcp_server::ModbusTcpServer;
pub use types::*;
