use domain::{MemoryLayout, MemoryRegistry, RegisterStore};
use mma_policy::{AccessMode, PolicyResolver, PortPolicy, RoutingTable};
use mma_protocol::{IpFilter, MemoryResolver, ModbusTcpServer, PolicyMemoryResolver};
use mma_telemetry::GatewayStats;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_modbus::prelude::*;

fn layout() -> MemoryLayout {
    MemoryLayout {
        coils: 64,
        discrete_inputs: 64,
        holding_registers: 64,
        input_registers: 64,
    }
}

fn registry() -> Arc<MemoryRegistry> {
    let mut memories = HashMap::new();
    memories.insert("plant".to_string(), Arc::new(RegisterStore::new(layout())));
    memories.insert(
        "sealed".to_string(),
        Arc::new(RegisterStore::new(layout()).with_state_sealing(0)),
    );
    Arc::new(MemoryRegistry::new(memories, "plant").expect("registry"))
}

fn routing() -> RoutingTable {
    RoutingTable::new([(1, "plant".to_string()), (2, "sealed".to_string())])
}

struct Running {
    addr: SocketAddr,
    memories: Arc<MemoryRegistry>,
    stats: Arc<GatewayStats>,
}

async fn start(
    access: AccessMode,
    configure: impl FnOnce(ModbusTcpServer) -> ModbusTcpServer,
) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let memories = registry();
    let stats = Arc::new(GatewayStats::default());

    let mut ports = HashMap::new();
    ports.insert(addr.port(), PortPolicy::allow_all(access));
    let policy = Arc::new(PolicyResolver::new(routing(), ports));
    let resolver: Arc<dyn MemoryResolver> = Arc::new(PolicyMemoryResolver::new(
        addr.port(),
        policy,
        Arc::clone(&memories),
    ));
    let server = configure(ModbusTcpServer::new(
        addr.to_string(),
        resolver,
        Arc::clone(&stats),
    ));
    tokio::spawn(async move { server.serve(listener).await });

    Running {
        addr,
        memories,
        stats,
    }
}

/// 发送一个原始请求帧并读取完整响应帧。
async fn exchange(stream: &mut TcpStream, frame: &[u8]) -> Vec<u8> {
    stream.write_all(frame).await.expect("write");
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await.expect("read header");
    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
    let mut pdu = vec![0u8; length - 1];
    stream.read_exact(&mut pdu).await.expect("read pdu");
    let mut response = header.to_vec();
    response.extend_from_slice(&pdu);
    response
}

async fn expect_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server should close the connection");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn client_reads_and_writes_registers() {
    let running = start(AccessMode::ReadWrite, |server| server).await;
    let mut ctx = tcp::connect_slave(running.addr, Slave(1))
        .await
        .expect("connect");

    ctx.write_multiple_registers(10, &[0x1234, 0xBEEF])
        .await
        .expect("transport")
        .expect("write registers");
    let registers = ctx
        .read_holding_registers(10, 2)
        .await
        .expect("transport")
        .expect("read registers");
    assert_eq!(registers, vec![0x1234, 0xBEEF]);

    ctx.write_single_coil(3, true)
        .await
        .expect("transport")
        .expect("write coil");
    let coils = ctx
        .read_coils(0, 5)
        .await
        .expect("transport")
        .expect("read coils");
    assert_eq!(coils, vec![false, false, false, true, false]);

    let plant = running.memories.get("plant").expect("plant");
    assert_eq!(
        plant.read_holding_registers(10, 2).expect("read"),
        vec![0x1234, 0xBEEF]
    );
    assert!(running.stats.snapshot().modbus_requests >= 4);
}

#[tokio::test]
async fn read_only_port_rejects_writes() {
    let running = start(AccessMode::ReadOnly, |server| server).await;
    let mut ctx = tcp::connect_slave(running.addr, Slave(1))
        .await
        .expect("connect");

    let denied = ctx
        .write_single_register(0, 7)
        .await
        .expect("transport");
    assert!(matches!(
        denied,
        Err(tokio_modbus::ExceptionCode::IllegalDataAddress)
    ));

    let read = ctx
        .read_input_registers(0, 1)
        .await
        .expect("transport")
        .expect("read");
    assert_eq!(read, vec![0]);
    assert_eq!(running.stats.snapshot().modbus_exceptions, 1);
}

#[tokio::test]
async fn sealed_memory_answers_illegal_function_until_gate_opens() {
    let running = start(AccessMode::ReadWrite, |server| server).await;
    let mut ctx = tcp::connect_slave(running.addr, Slave(2))
        .await
        .expect("connect");

    let before = ctx.read_holding_registers(0, 1).await.expect("transport");
    assert!(matches!(
        before,
        Err(tokio_modbus::ExceptionCode::IllegalFunction)
    ));

    let sealed = running.memories.get("sealed").expect("sealed");
    sealed.write_discrete_inputs(0, &[true]).expect("open gate");

    let after = ctx
        .read_holding_registers(0, 1)
        .await
        .expect("transport")
        .expect("read");
    assert_eq!(after, vec![0]);
}

#[tokio::test]
async fn unrouted_unit_and_unknown_function_get_exceptions() {
    let running = start(AccessMode::ReadWrite, |server| server).await;
    let mut stream = TcpStream::connect(running.addr).await.expect("connect");

    // unit 9 未路由 → 0x02
    let unrouted = exchange(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x09, 0x03, 0x00, 0x00, 0x00, 0x01],
    )
    .await;
    assert_eq!(unrouted, vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x09, 0x83, 0x02]);

    // FC 0x2B 未实现 → 0x01
    let unknown = exchange(
        &mut stream,
        &[0x00, 0x02, 0x00, 0x00, 0x00, 0x03, 0x01, 0x2B, 0x0E],
    )
    .await;
    assert_eq!(unknown, vec![0x00, 0x02, 0x00, 0x00, 0x00, 0x03, 0x01, 0xAB, 0x01]);
}

#[tokio::test]
async fn malformed_mbap_closes_connection() {
    let running = start(AccessMode::ReadWrite, |server| server).await;
    let mut stream = TcpStream::connect(running.addr).await.expect("connect");
    stream
        .write_all(&[0x00, 0x01, 0x00, 0x07, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01])
        .await
        .expect("write");
    expect_closed(&mut stream).await;
}

#[tokio::test]
async fn connections_over_limit_are_closed() {
    let running = start(AccessMode::ReadWrite, |server| server.with_max_connections(1)).await;

    let mut first = TcpStream::connect(running.addr).await.expect("connect");
    let response = exchange(
        &mut first,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01],
    )
    .await;
    assert_eq!(response[7], 0x03);

    let mut second = TcpStream::connect(running.addr).await.expect("connect");
    expect_closed(&mut second).await;

    let stats = running.stats.snapshot();
    assert_eq!(stats.modbus_connections, 1);
    assert_eq!(stats.modbus_connections_refused, 1);
}

#[tokio::test]
async fn ip_filter_drops_denied_peers() {
    let filter = IpFilter::compile(&[], &["127.0.0.0/8".to_string()]).expect("filter");
    let running = start(AccessMode::ReadWrite, |server| server.with_ip_filter(filter)).await;

    let mut stream = TcpStream::connect(running.addr).await.expect("connect");
    expect_closed(&mut stream).await;
    assert_eq!(running.stats.snapshot().modbus_connections_refused, 1);
}
