//! Modbus TCP 服务端
//!
//! 每个监听端口一个实例：接受连接 → IP 过滤 → 连接数准入 → 每连接一个任务。
//! 超过 `max_connections` 的连接先被接受再立即关闭。

use crate::error::ProtocolError;
use crate::ip_filter::IpFilter;
use crate::modbus_tcp::{
    MBAP_HEADER_LEN, MbapHeader, MemoryResolver, encode_response, handle_pdu, is_exception,
};
use mma_telemetry::GatewayStats;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Modbus TCP 服务端
pub struct ModbusTcpServer {
    listen: String,
    resolver: Arc<dyn MemoryResolver>,
    limit: Option<Arc<Semaphore>>,
    ip_filter: IpFilter,
    stats: Arc<GatewayStats>,
}

impl ModbusTcpServer {
    /// 创建服务端；默认不限连接数、不过滤来源。
    pub fn new(
        listen: impl Into<String>,
        resolver: Arc<dyn MemoryResolver>,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            listen: listen.into(),
            resolver,
            limit: None,
            ip_filter: IpFilter::allow_all(),
            stats,
        }
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(max_connections)));
        self
    }

    pub fn with_ip_filter(mut self, ip_filter: IpFilter) -> Self {
        self.ip_filter = ip_filter;
        self
    }

    pub fn listen(&self) -> &str {
        &self.listen
    }

    /// 绑定监听地址。
    pub async fn bind(&self) -> Result<TcpListener, ProtocolError> {
        TcpListener::bind(&self.listen)
            .await
            .map_err(|source| ProtocolError::Bind {
                addr: self.listen.clone(),
                source,
            })
    }

    /// 绑定并运行。
    pub async fn run(&self) -> Result<(), ProtocolError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// 在已绑定的监听器上接受连接，直到任务被取消。
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ProtocolError> {
        info!(
            target: "mma.modbus",
            addr = %listener.local_addr()?,
            ip_filter = self.ip_filter.is_enabled(),
            max_connections = self.limit.as_ref().map(|limit| limit.available_permits()),
            "modbus tcp server listening"
        );

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(target: "mma.modbus", "failed to accept connection: {}", e);
                    continue;
                }
            };

            if !self.ip_filter.allows(peer_addr.ip()) {
                self.stats.record_modbus_connection_refused();
                debug!(target: "mma.modbus", peer = %peer_addr, "connection rejected by ip filter");
                drop(stream);
                continue;
            }

            let permit = match &self.limit {
                Some(limit) => match Arc::clone(limit).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        self.stats.record_modbus_connection_refused();
                        warn!(target: "mma.modbus", peer = %peer_addr, "connection limit reached, closing");
                        drop(stream);
                        continue;
                    }
                },
                None => None,
            };

            self.stats.record_modbus_connection();
            debug!(target: "mma.modbus", peer = %peer_addr, "new connection");

            let resolver = Arc::clone(&self.resolver);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = handle_connection(stream, peer_addr, resolver, stats).await {
                    warn!(target: "mma.modbus", "connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

/// 处理单个连接：顺序读取请求帧并逐个应答。
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    resolver: Arc<dyn MemoryResolver>,
    stats: Arc<GatewayStats>,
) -> Result<(), ProtocolError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut header = [0u8; MBAP_HEADER_LEN];

    loop {
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!(target: "mma.modbus", peer = %peer_addr, "connection closed");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let request = MbapHeader::parse(&header);
        let mut pdu = vec![0u8; request.pdu_len()?];
        reader.read_exact(&mut pdu).await?;

        stats.record_modbus_request();
        let response = handle_pdu(resolver.as_ref(), request.unit_id, &pdu);
        if is_exception(&response) {
            stats.record_modbus_exception();
        }
        writer.write_all(&encode_response(&request, &response)).await?;
    }
}
