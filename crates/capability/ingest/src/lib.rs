//! 写入能力：统一写入命令、校验服务与 MQTT 写入源。

mod command;
mod mqtt;
mod service;

use async_trait::async_trait;
use domain::{Area, RegisterError};
use std::sync::Arc;

pub use command::IngestCommand;
pub use mqtt::{MqttSource, MqttSourceConfig, MqttStatus, parse_broker};
pub use service::IngestService;

/// 写入命令错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("unknown memory: {0}")]
    UnknownMemory(String),
    #[error("invalid area: {0}")]
    InvalidArea(String),
    #[error("invalid payload: exactly one of bools or values is required")]
    InvalidPayload,
    #[error("invalid numeric boolean: {0}")]
    InvalidBoolean(i64),
    #[error("payload does not match area {0}")]
    PayloadMismatch(Area),
    #[error("ingest denied: {0} is not writable once memory is running")]
    IngestDenied(Area),
    #[error(transparent)]
    Memory(#[from] RegisterError),
}

/// 写入源错误。
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("invalid broker address: {0}")]
    InvalidBroker(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// 写入源抽象。
#[async_trait]
pub trait IngestSource: Send + Sync {
    async fn run(&self, service: Arc<IngestService>) -> Result<(), SourceError>;
}
