//! Raw Ingest TCP 服务端
//!
//! 每个连接顺序处理帧：每帧有独立的读超时；任何失败都回复拒绝字节并关闭连接。
//! 取消令牌触发后停止接受新连接，已有连接在帧边界退出。

use crate::error::{ProtocolError, Rejected};
use crate::raw_ingest::{
    HEADER_LEN, RESPONSE_OK, RESPONSE_REJECTED, RawMemoryResolver, apply, read_frame,
};
use mma_telemetry::GatewayStats;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Raw Ingest 服务端配置
#[derive(Debug, Clone)]
pub struct RawIngestServerConfig {
    pub listen: String,
    /// 单帧最大字节数（含 12 字节帧头）
    pub max_packet_bytes: usize,
    /// 单帧读取超时
    pub read_timeout: Duration,
}

/// Raw Ingest 服务端
pub struct RawIngestServer {
    config: RawIngestServerConfig,
    resolver: Arc<dyn RawMemoryResolver>,
    stats: Arc<GatewayStats>,
}

impl RawIngestServer {
    pub fn new(
        config: RawIngestServerConfig,
        resolver: Arc<dyn RawMemoryResolver>,
        stats: Arc<GatewayStats>,
    ) -> Result<Self, ProtocolError> {
        if config.listen.trim().is_empty() {
            return Err(ProtocolError::Config("raw ingest listen address is empty".into()));
        }
        if config.max_packet_bytes <= HEADER_LEN {
            return Err(ProtocolError::Config(format!(
                "raw ingest max_packet_bytes must exceed {HEADER_LEN}"
            )));
        }
        if config.read_timeout.is_zero() {
            return Err(ProtocolError::Config(
                "raw ingest read timeout must be positive".into(),
            ));
        }
        Ok(Self {
            config,
            resolver,
            stats,
        })
    }

    pub fn config(&self) -> &RawIngestServerConfig {
        &self.config
    }

    pub async fn bind(&self) -> Result<TcpListener, ProtocolError> {
        TcpListener::bind(&self.config.listen)
            .await
            .map_err(|source| ProtocolError::Bind {
                addr: self.config.listen.clone(),
                source,
            })
    }

    /// 绑定并运行，直到取消。
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ProtocolError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// 在已绑定的监听器上接受连接，直到取消。
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ProtocolError> {
        info!(
            target: "mma.raw_ingest",
            addr = %listener.local_addr()?,
            max_packet_bytes = self.config.max_packet_bytes,
            read_timeout_ms = self.config.read_timeout.as_millis() as u64,
            "raw ingest server listening"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(target: "mma.raw_ingest", "raw ingest server stopped");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!(target: "mma.raw_ingest", peer = %peer_addr, "new connection");
                        let connection = Connection {
                            resolver: Arc::clone(&self.resolver),
                            stats: Arc::clone(&self.stats),
                            max_packet_bytes: self.config.max_packet_bytes,
                            read_timeout: self.config.read_timeout,
                            shutdown: shutdown.clone(),
                        };
                        tokio::spawn(connection.handle(stream, peer_addr));
                    }
                    Err(e) => {
                        error!(target: "mma.raw_ingest", "failed to accept connection: {}", e);
                    }
                },
            }
        }
    }
}

struct Connection {
    resolver: Arc<dyn RawMemoryResolver>,
    stats: Arc<GatewayStats>,
    max_packet_bytes: usize,
    read_timeout: Duration,
    shutdown: CancellationToken,
}

impl Connection {
    async fn handle(self, stream: TcpStream, peer_addr: SocketAddr) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        loop {
            let read = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                read = tokio::time::timeout(
                    self.read_timeout,
                    read_frame(&mut reader, self.max_packet_bytes),
                ) => read,
            };

            let frame = match read {
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => {
                    debug!(target: "mma.raw_ingest", peer = %peer_addr, "connection closed");
                    break;
                }
                Ok(Err(reason)) => {
                    self.reject(&mut writer, peer_addr, reason).await;
                    break;
                }
                Err(_) => {
                    self.reject(&mut writer, peer_addr, Rejected::Timeout).await;
                    break;
                }
            };

            let header = frame.header;
            let applied = self
                .resolver
                .resolve_memory_by_id(header.memory_id)
                .ok_or(Rejected::UnknownMemory(header.memory_id))
                .and_then(|memory| apply(memory.as_ref(), &header, &frame.payload));
            if let Err(reason) = applied {
                self.reject(&mut writer, peer_addr, reason).await;
                break;
            }

            self.stats.record_raw_ingest_frame();
            debug!(
                target: "mma.raw_ingest",
                peer = %peer_addr,
                memory_id = header.memory_id,
                area = %header.area,
                address = header.address,
                count = header.count,
                "raw ingest frame applied"
            );
            if writer.write_all(&[RESPONSE_OK]).await.is_err() {
                break;
            }
        }
    }

    async fn reject<W>(&self, writer: &mut W, peer_addr: SocketAddr, reason: Rejected)
    where
        W: AsyncWrite + Unpin,
    {
        self.stats.record_raw_ingest_rejected();
        warn!(
            target: "mma.raw_ingest",
            peer = %peer_addr,
            reason = %reason,
            "raw ingest frame rejected"
        );
        if let Err(e) = writer.write_all(&[RESPONSE_REJECTED]).await {
            debug!(target: "mma.raw_ingest", peer = %peer_addr, "failed to send reject: {}", e);
        }
    }
}
