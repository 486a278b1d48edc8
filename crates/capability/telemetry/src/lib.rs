//! 追踪初始化、请求 ID 生成与运行统计。

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 统计快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub rest_requests: u64,
    pub rest_reads: u64,
    pub rest_ingest: u64,
    pub rest_rejected: u64,
    pub rest_unauthorized: u64,
    pub ingest_batches: u64,
    pub ingest_written: u64,
    pub ingest_rejected: u64,
    pub modbus_connections: u64,
    pub modbus_connections_refused: u64,
    pub modbus_requests: u64,
    pub modbus_exceptions: u64,
    pub raw_ingest_frames: u64,
    pub raw_ingest_rejected: u64,
    pub mqtt_messages: u64,
    pub mqtt_rejected: u64,
}

/// 网关运行统计。
///
/// 启动时创建一次，以 `Arc<GatewayStats>` 注入各子系统；计数只增不减。
#[derive(Debug, Default)]
pub struct GatewayStats {
    rest_requests: AtomicU64,
    rest_reads: AtomicU64,
    rest_ingest: AtomicU64,
    rest_rejected: AtomicU64,
    rest_unauthorized: AtomicU64,
    ingest_batches: AtomicU64,
    ingest_written: AtomicU64,
    ingest_rejected: AtomicU64,
    modbus_connections: AtomicU64,
    modbus_connections_refused: AtomicU64,
    modbus_requests: AtomicU64,
    modbus_exceptions: AtomicU64,
    raw_ingest_frames: AtomicU64,
    raw_ingest_rejected: AtomicU64,
    mqtt_messages: AtomicU64,
    mqtt_rejected: AtomicU64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rest_requests: self.rest_requests.load(Ordering::Relaxed),
            rest_reads: self.rest_reads.load(Ordering::Relaxed),
            rest_ingest: self.rest_ingest.load(Ordering::Relaxed),
            rest_rejected: self.rest_rejected.load(Ordering::Relaxed),
            rest_unauthorized: self.rest_unauthorized.load(Ordering::Relaxed),
            ingest_batches: self.ingest_batches.load(Ordering::Relaxed),
            ingest_written: self.ingest_written.load(Ordering::Relaxed),
            ingest_rejected: self.ingest_rejected.load(Ordering::Relaxed),
            modbus_connections: self.modbus_connections.load(Ordering::Relaxed),
            modbus_connections_refused: self.modbus_connections_refused.load(Ordering::Relaxed),
            modbus_requests: self.modbus_requests.load(Ordering::Relaxed),
            modbus_exceptions: self.modbus_exceptions.load(Ordering::Relaxed),
            raw_ingest_frames: self.raw_ingest_frames.load(Ordering::Relaxed),
            raw_ingest_rejected: self.raw_ingest_rejected.load(Ordering::Relaxed),
            mqtt_messages: self.mqtt_messages.load(Ordering::Relaxed),
            mqtt_rejected: self.mqtt_rejected.load(Ordering::Relaxed),
        }
    }

    /// 记录 REST 请求次数。
    pub fn record_rest_request(&self) {
        self.rest_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录 REST 读取次数。
    pub fn record_rest_read(&self) {
        self.rest_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录 REST 写入请求次数。
    pub fn record_rest_ingest(&self) {
        self.rest_ingest.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录 REST 拒绝次数。
    pub fn record_rest_rejected(&self) {
        self.rest_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录鉴权失败次数。
    pub fn record_rest_unauthorized(&self) {
        self.rest_unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次写入批次及写入数量。
    pub fn record_ingest_written(&self, written: usize) {
        self.ingest_batches.fetch_add(1, Ordering::Relaxed);
        self.ingest_written
            .fetch_add(written as u64, Ordering::Relaxed);
    }

    /// 记录被拒绝的写入批次。
    pub fn record_ingest_rejected(&self) {
        self.ingest_batches.fetch_add(1, Ordering::Relaxed);
        self.ingest_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_modbus_connection(&self) {
        self.modbus_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// 超出连接上限或被 IP 过滤的连接。
    pub fn record_modbus_connection_refused(&self) {
        self.modbus_connections_refused
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_modbus_request(&self) {
        self.modbus_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_modbus_exception(&self) {
        self.modbus_exceptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_raw_ingest_frame(&self) {
        self.raw_ingest_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_raw_ingest_rejected(&self) {
        self.raw_ingest_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mqtt_message(&self) {
        self.mqtt_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mqtt_rejected(&self) {
        self.mqtt_rejected.fetch_add(1, Ordering::Relaxed);
    }
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}
