//! MQTT 写入订阅：订阅单个主题，每条消息按 JSON 解析为 `IngestCommand` 交给 IngestService。

use crate::command::IngestCommand;
use crate::service::IngestService;
use crate::{IngestSource, SourceError};
use async_trait::async_trait;
use mma_telemetry::GatewayStats;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_MQTT_PORT: u16 = 1883;

/// MQTT 订阅配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 连接失败后的重试间隔。
    pub retry_delay: Duration,
}

impl MqttSourceConfig {
    /// 由 broker 地址构建配置；client id 为空时生成 `mma-ingest-{uuid}`。
    pub fn from_broker(
        broker: &str,
        client_id: &str,
        topic: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let (host, port) = parse_broker(broker)?;
        let client_id = if client_id.trim().is_empty() {
            format!("mma-ingest-{}", uuid::Uuid::new_v4())
        } else {
            client_id.to_string()
        };
        Ok(Self {
            host,
            port,
            client_id,
            topic: topic.into(),
            username: None,
            password: None,
            retry_delay: Duration::from_secs(10),
        })
    }
}

/// 解析 `tcp://host:port`、`mqtt://host:port` 或 `host[:port]`。
pub fn parse_broker(broker: &str) -> Result<(String, u16), SourceError> {
    let trimmed = broker.trim();
    let address = trimmed
        .strip_prefix("tcp://")
        .or_else(|| trimmed.strip_prefix("mqtt://"))
        .unwrap_or(trimmed);
    if address.is_empty() {
        return Err(SourceError::InvalidBroker(broker.to_string()));
    }
    match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| SourceError::InvalidBroker(broker.to_string()))?;
            if host.is_empty() {
                return Err(SourceError::InvalidBroker(broker.to_string()));
            }
            Ok((host.to_string(), port))
        }
        None => Ok((address.to_string(), DEFAULT_MQTT_PORT)),
    }
}

/// MQTT 运行状态（诊断接口读取）。
#[derive(Debug)]
pub struct MqttStatus {
    broker: String,
    topic: String,
    connected: AtomicBool,
}

impl MqttStatus {
    pub fn new(broker: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            topic: topic.into(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

/// MQTT 写入源。
pub struct MqttSource {
    config: MqttSourceConfig,
    status: Arc<MqttStatus>,
    stats: Arc<GatewayStats>,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig, status: Arc<MqttStatus>, stats: Arc<GatewayStats>) -> Self {
        Self {
            config,
            status,
            stats,
        }
    }

    pub fn config(&self) -> &MqttSourceConfig {
        &self.config
    }
}

#[async_trait]
impl IngestSource for MqttSource {
    async fn run(&self, service: Arc<IngestService>) -> Result<(), SourceError> {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        self.status.set_connected(false);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.status.set_connected(true);
                    // 每次（重新）连接后都重新订阅。
                    client
                        .try_subscribe(self.config.topic.clone(), QoS::AtMostOnce)
                        .map_err(|err| SourceError::Subscribe(err.to_string()))?;
                    info!(
                        target: "mma.mqtt",
                        host = %self.config.host,
                        port = self.config.port,
                        topic = %self.config.topic,
                        "mqtt ingest subscribed"
                    );
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_payload(&service, &self.stats, &publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(err) => {
                    self.status.set_connected(false);
                    warn!(
                        target: "mma.mqtt",
                        error = %err,
                        retry_ms = self.config.retry_delay.as_millis() as u64,
                        "mqtt unavailable"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }
}

/// 解码并执行单条消息；失败只记录日志，不中断订阅。
fn handle_payload(service: &IngestService, stats: &GatewayStats, topic: &str, payload: &[u8]) {
    stats.record_mqtt_message();
    let command: IngestCommand = match serde_json::from_slice(payload) {
        Ok(command) => command,
        Err(err) => {
            stats.record_mqtt_rejected();
            warn!(target: "mma.mqtt", topic = %topic, error = %err, "mqtt ingest: invalid json");
            return;
        }
    };
    match service.ingest(&command) {
        Ok(written) => stats.record_ingest_written(written),
        Err(err) => {
            stats.record_mqtt_rejected();
            stats.record_ingest_rejected();
            warn!(
                target: "mma.mqtt",
                topic = %topic,
                memory = %command.memory,
                area = %command.area,
                error = %err,
                "mqtt ingest rejected"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{MemoryLayout, MemoryRegistry, RegisterStore};
    use std::collections::HashMap;

    fn service() -> IngestService {
        let mut memories = HashMap::new();
        memories.insert(
            "plant".to_string(),
            Arc::new(RegisterStore::new(MemoryLayout {
                coils: 8,
                discrete_inputs: 8,
                holding_registers: 8,
                input_registers: 8,
            })),
        );
        IngestService::new(Arc::new(
            MemoryRegistry::new(memories, "plant").expect("registry"),
        ))
    }

    #[test]
    fn parse_broker_variants() {
        assert_eq!(
            parse_broker("tcp://10.0.0.5:1884").expect("broker"),
            ("10.0.0.5".to_string(), 1884)
        );
        assert_eq!(
            parse_broker("mqtt://broker.local").expect("broker"),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            parse_broker("localhost:1883").expect("broker"),
            ("localhost".to_string(), 1883)
        );
        assert!(parse_broker("tcp://").is_err());
        assert!(parse_broker("host:notaport").is_err());
    }

    #[test]
    fn generated_client_id_when_empty() {
        let config = MqttSourceConfig::from_broker("localhost", "", "mma/ingest").expect("config");
        assert!(config.client_id.starts_with("mma-ingest-"));
        let config =
            MqttSourceConfig::from_broker("localhost", "gateway-1", "mma/ingest").expect("config");
        assert_eq!(config.client_id, "gateway-1");
    }

    #[test]
    fn payload_is_ingested_and_counted() {
        let service = service();
        let stats = GatewayStats::new();

        handle_payload(
            &service,
            &stats,
            "mma/ingest",
            br#"{"memory":"plant","area":"input_registers","address":2,"values":[7,8]}"#,
        );
        handle_payload(&service, &stats, "mma/ingest", b"not json");
        handle_payload(
            &service,
            &stats,
            "mma/ingest",
            br#"{"memory":"plant","area":"holding_registers","address":8,"values":[1]}"#,
        );

        let store = service.memories().get("plant").expect("plant");
        assert_eq!(store.read_input_registers(2, 2).expect("read"), vec![7, 8]);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.mqtt_messages, 3);
        assert_eq!(snapshot.mqtt_rejected, 2);
        assert_eq!(snapshot.ingest_written, 2);
        assert_eq!(snapshot.ingest_rejected, 1);
    }

    #[test]
    fn status_tracks_connection() {
        let status = MqttStatus::new("tcp://localhost:1883", "mma/ingest");
        assert!(!status.is_connected());
        status.set_connected(true);
        assert!(status.is_connected());
        assert_eq!(status.topic(), "mma/ingest");
    }
}
