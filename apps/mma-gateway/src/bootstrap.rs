//! 运行时装配：按配置启动 Modbus 监听、Raw Ingest、MQTT 订阅与 REST。

use crate::{AppState, build_app};
use domain::MemoryRegistry;
use mma_config::{AppConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MODBUS_PORT, MqttConfig, RawIngestConfig};
use mma_ingest::{IngestService, IngestSource, MqttSource, MqttSourceConfig, MqttStatus, SourceError};
use mma_policy::PolicyResolver;
use mma_protocol::{
    DefaultMemoryResolver, IpFilter, MemoryResolver, ModbusTcpServer, PolicyMemoryResolver,
    ProtocolError, RawIngestServer, RawIngestServerConfig, RawMemoryResolver,
};
use mma_telemetry::GatewayStats;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 启动阶段错误。
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to bind rest listener {addr}: {source}")]
    RestBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// 停机时等待可取消任务退出的时长。
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 已启动的后台任务。
pub struct Runtime {
    pub shutdown: CancellationToken,
    /// 响应取消令牌的任务（Raw Ingest、REST）
    pub graceful: Vec<JoinHandle<()>>,
    /// 不支持优雅退出的任务（Modbus 监听、MQTT 订阅）
    pub detached: Vec<JoinHandle<()>>,
    pub mqtt: Option<Arc<MqttStatus>>,
}

impl Runtime {
    /// 触发取消令牌，等待可取消任务退出，其余任务直接中止。
    pub async fn stop(self) {
        self.shutdown.cancel();
        for task in &self.detached {
            task.abort();
        }
        for mut task in self.graceful {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(target: "mma.boot", "task did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

/// 按配置启动全部入口。
pub async fn start(
    config: &AppConfig,
    memories: Arc<MemoryRegistry>,
    stats: Arc<GatewayStats>,
) -> Result<Runtime, BootError> {
    let shutdown = CancellationToken::new();
    let ingest = Arc::new(IngestService::new(Arc::clone(&memories)));

    let mut graceful = Vec::new();
    let mut detached = start_modbus(config, &memories, &stats).await?;
    if let Some(task) =
        start_raw_ingest(&config.raw_ingest, &memories, &stats, shutdown.clone()).await?
    {
        graceful.push(task);
    }

    let mqtt = match start_mqtt(&config.mqtt, &ingest, &stats)? {
        Some((status, task)) => {
            detached.push(task);
            Some(status)
        }
        None => None,
    };

    if config.rest.enabled {
        let state = AppState::new(
            &config.rest,
            config.memory.clone(),
            Arc::clone(&ingest),
            Arc::clone(&stats),
            mqtt.clone(),
        );
        graceful.push(start_rest(&config.rest.address, state, shutdown.clone()).await?);
    } else {
        info!(target: "mma.boot", "rest api disabled");
    }

    Ok(Runtime {
        shutdown,
        graceful,
        detached,
        mqtt,
    })
}

/// 端口策略解析器。
pub fn build_policy(config: &AppConfig) -> PolicyResolver {
    let ports: HashMap<u16, _> = config
        .ports
        .iter()
        .map(|(port, port_config)| (*port, port_config.policy.clone()))
        .collect();
    PolicyResolver::new(config.routing.unit_id_map.clone(), ports)
}

/// 每个配置端口一个监听器；未配置端口时在默认端口上服务默认内存。
pub async fn start_modbus(
    config: &AppConfig,
    memories: &Arc<MemoryRegistry>,
    stats: &Arc<GatewayStats>,
) -> Result<Vec<JoinHandle<()>>, BootError> {
    let mut servers = Vec::new();
    if config.ports.is_empty() {
        warn!(
            target: "mma.boot",
            port = DEFAULT_MODBUS_PORT,
            memory = memories.default_key(),
            "no modbus ports configured, serving default memory without policy"
        );
        let resolver: Arc<dyn MemoryResolver> =
            Arc::new(DefaultMemoryResolver::new(Arc::clone(memories)));
        servers.push(
            ModbusTcpServer::new(
                format!("0.0.0.0:{DEFAULT_MODBUS_PORT}"),
                resolver,
                Arc::clone(stats),
            )
            .with_max_connections(DEFAULT_MAX_CONNECTIONS),
        );
    } else {
        let policy = Arc::new(build_policy(config));
        for (port, port_config) in &config.ports {
            let ip_filter =
                IpFilter::compile(&port_config.ip_filter.allow, &port_config.ip_filter.deny)?;
            let resolver: Arc<dyn MemoryResolver> = Arc::new(PolicyMemoryResolver::new(
                *port,
                Arc::clone(&policy),
                Arc::clone(memories),
            ));
            servers.push(
                ModbusTcpServer::new(format!("0.0.0.0:{port}"), resolver, Arc::clone(stats))
                    .with_max_connections(port_config.max_connections)
                    .with_ip_filter(ip_filter),
            );
        }
    }

    let mut tasks = Vec::with_capacity(servers.len());
    for server in servers {
        let listener = server.bind().await?;
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!(target: "mma.modbus", listen = server.listen(), error = %e, "modbus server stopped");
            }
        }));
    }
    Ok(tasks)
}

/// 启动 Raw Ingest 监听（未启用时返回 `None`）。
pub async fn start_raw_ingest(
    config: &RawIngestConfig,
    memories: &Arc<MemoryRegistry>,
    stats: &Arc<GatewayStats>,
    shutdown: CancellationToken,
) -> Result<Option<JoinHandle<()>>, BootError> {
    if !config.enabled {
        info!(target: "mma.boot", "raw ingest disabled");
        return Ok(None);
    }
    let resolver: Arc<dyn RawMemoryResolver> = Arc::clone(memories) as Arc<dyn RawMemoryResolver>;
    let server = RawIngestServer::new(
        RawIngestServerConfig {
            listen: config.listen.clone(),
            max_packet_bytes: config.max_packet_bytes,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        },
        resolver,
        Arc::clone(stats),
    )?;
    let listener = server.bind().await?;
    Ok(Some(tokio::spawn(async move {
        if let Err(e) = server.serve(listener, shutdown).await {
            error!(target: "mma.raw_ingest", error = %e, "raw ingest server stopped");
        }
    })))
}

/// 启动 MQTT 订阅（未启用时返回 `None`）。
pub fn start_mqtt(
    config: &MqttConfig,
    ingest: &Arc<IngestService>,
    stats: &Arc<GatewayStats>,
) -> Result<Option<(Arc<MqttStatus>, JoinHandle<()>)>, BootError> {
    if !config.enabled {
        info!(target: "mma.boot", "mqtt ingest disabled");
        return Ok(None);
    }
    let mut source_config =
        MqttSourceConfig::from_broker(&config.broker, &config.client_id, config.topic.clone())?;
    source_config.username = config.username.clone();
    source_config.password = config.password.clone();

    let status = Arc::new(MqttStatus::new(
        format!("{}:{}", source_config.host, source_config.port),
        config.topic.clone(),
    ));
    let source = MqttSource::new(source_config, Arc::clone(&status), Arc::clone(stats));
    let service = Arc::clone(ingest);
    let task = tokio::spawn(async move {
        if let Err(e) = source.run(service).await {
            error!(target: "mma.mqtt", error = %e, "mqtt ingest stopped");
        }
    });
    Ok(Some((status, task)))
}

/// 启动 REST 服务，取消令牌触发后优雅退出。
pub async fn start_rest(
    address: &str,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, BootError> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|source| BootError::RestBind {
            addr: address.to_string(),
            source,
        })?;
    info!(target: "mma.rest", addr = %address, "rest api listening");
    let app = build_app(state);
    Ok(tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!(target: "mma.rest", error = %e, "rest api stopped");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mma_config::build_memories;

    const CONFIG: &str = r#"
memory:
  memories:
    main:
      default: true
      coils: { size: 8 }
      discrete_inputs: { size: 8 }
      holding_registers: { size: 8 }
      input_registers: { size: 8 }
routing:
  unit_id_map:
    1: main
ports:
  1502:
    unit_ids: all
    memories: all
    access: read-only
raw_ingest:
  enabled: true
  listen: "127.0.0.1:0"
"#;

    fn setup() -> (AppConfig, Arc<MemoryRegistry>, Arc<GatewayStats>) {
        let config = AppConfig::from_yaml_str(CONFIG).expect("config");
        let memories = Arc::new(build_memories(&config.memory).expect("memories"));
        (config, memories, Arc::new(GatewayStats::new()))
    }

    #[test]
    fn policy_is_built_per_port() {
        let (config, _, _) = setup();
        let policy = build_policy(&config);
        assert_eq!(policy.resolve(1502, 1, 3), Ok("main"));
        assert!(policy.resolve(1502, 1, 6).is_err());
    }

    #[tokio::test]
    async fn raw_ingest_starts_and_stops_with_token() {
        let (config, memories, stats) = setup();
        let shutdown = CancellationToken::new();
        let task = start_raw_ingest(&config.raw_ingest, &memories, &stats, shutdown.clone())
            .await
            .expect("start")
            .expect("enabled");
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("stopped")
            .expect("join");
    }

    #[tokio::test]
    async fn disabled_transports_are_skipped() {
        let (mut config, memories, stats) = setup();
        config.raw_ingest.enabled = false;
        let ingest = Arc::new(IngestService::new(Arc::clone(&memories)));

        assert!(
            start_raw_ingest(&config.raw_ingest, &memories, &stats, CancellationToken::new())
                .await
                .expect("start")
                .is_none()
        );
        assert!(start_mqtt(&config.mqtt, &ingest, &stats).expect("mqtt").is_none());
    }
}
