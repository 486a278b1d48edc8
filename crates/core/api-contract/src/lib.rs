//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查响应。
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
}

/// 写入已受理。
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestAccepted {
    pub status: String,
    pub memory: String,
    pub area: String,
    pub written: usize,
}

/// 内存读取查询参数；缺失项由处理器返回 400。
#[derive(Debug, Default, Deserialize)]
pub struct MemoryReadQuery {
    pub memory: Option<String>,
    pub area: Option<String>,
    pub address: Option<u16>,
    pub count: Option<usize>,
}

/// 内存读取结果：位区域为 bool 数组，寄存器区域为 u16 数组。
#[derive(Debug, Serialize, Deserialize)]
pub struct MemoryReadResponse {
    pub memory: String,
    pub area: String,
    pub address: u16,
    pub values: serde_json::Value,
}

/// 单个区域的配置范围。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AreaDto {
    pub start: u16,
    pub size: usize,
}

/// 单块内存的诊断信息。
#[derive(Debug, Serialize, Deserialize)]
pub struct MemoryDiagnosticsDto {
    pub key: String,
    pub default: bool,
    pub coils: AreaDto,
    pub discrete_inputs: AreaDto,
    pub holding_registers: AreaDto,
    pub input_registers: AreaDto,
    pub run_state: String,
    pub state_sealing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_address: Option<u16>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RestStatsDto {
    pub requests: u64,
    pub reads: u64,
    pub ingest: u64,
    pub rejected: u64,
    pub unauthorized: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IngestStatsDto {
    pub batches: u64,
    pub written: u64,
    pub rejected: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModbusStatsDto {
    pub connections: u64,
    pub connections_refused: u64,
    pub requests: u64,
    pub exceptions: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawIngestStatsDto {
    pub frames: u64,
    pub rejected: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MqttStatsDto {
    pub messages: u64,
    pub rejected: u64,
}

/// 运行计数快照。
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StatsDto {
    pub rest: RestStatsDto,
    pub ingest: IngestStatsDto,
    pub modbus: ModbusStatsDto,
    pub raw_ingest: RawIngestStatsDto,
    pub mqtt: MqttStatsDto,
}

/// MQTT 订阅状态；未启用时只有 `enabled: false`。
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MqttStatusDto {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}
