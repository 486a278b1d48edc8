//! 诊断接口。
//!
//! - GET /diagnostics/memory：配置布局与运行状态
//! - GET /diagnostics/stats：运行计数
//! - GET /diagnostics/mqtt：MQTT 订阅状态

use api_contract::{
    AreaDto, IngestStatsDto, MemoryDiagnosticsDto, ModbusStatsDto, MqttStatsDto, MqttStatusDto,
    RawIngestStatsDto, RestStatsDto, StatsDto,
};
use axum::{extract::State, response::Response};
use mma_config::AreaConfig;

use crate::AppState;
use crate::utils::response::{forbidden_error, ok};

fn area_dto(area: &AreaConfig) -> AreaDto {
    AreaDto {
        start: area.start,
        size: area.size,
    }
}

pub async fn memory_diagnostics(State(state): State<AppState>) -> Response {
    if !state.features.diagnostics {
        return forbidden_error("diagnostics is disabled");
    }

    let memories: Vec<MemoryDiagnosticsDto> = state
        .memory_config
        .memories
        .iter()
        .filter_map(|(key, block)| {
            let store = state.memories.get(key)?;
            Some(MemoryDiagnosticsDto {
                key: key.clone(),
                default: block.default,
                coils: area_dto(&block.coils),
                discrete_inputs: area_dto(&block.discrete_inputs),
                holding_registers: area_dto(&block.holding_registers),
                input_registers: area_dto(&block.input_registers),
                run_state: store.run_state().as_str().to_string(),
                state_sealing: store.has_state_sealing(),
                gate_address: store.gate_address(),
            })
        })
        .collect();
    ok(memories)
}

pub async fn stats(State(state): State<AppState>) -> Response {
    if !state.features.diagnostics {
        return forbidden_error("diagnostics is disabled");
    }

    let snapshot = state.stats.snapshot();
    ok(StatsDto {
        rest: RestStatsDto {
            requests: snapshot.rest_requests,
            reads: snapshot.rest_reads,
            ingest: snapshot.rest_ingest,
            rejected: snapshot.rest_rejected,
            unauthorized: snapshot.rest_unauthorized,
        },
        ingest: IngestStatsDto {
            batches: snapshot.ingest_batches,
            written: snapshot.ingest_written,
            rejected: snapshot.ingest_rejected,
        },
        modbus: ModbusStatsDto {
            connections: snapshot.modbus_connections,
            connections_refused: snapshot.modbus_connections_refused,
            requests: snapshot.modbus_requests,
            exceptions: snapshot.modbus_exceptions,
        },
        raw_ingest: RawIngestStatsDto {
            frames: snapshot.raw_ingest_frames,
            rejected: snapshot.raw_ingest_rejected,
        },
        mqtt: MqttStatsDto {
            messages: snapshot.mqtt_messages,
            rejected: snapshot.mqtt_rejected,
        },
    })
}

pub async fn mqtt_status(State(state): State<AppState>) -> Response {
    if !state.features.diagnostics {
        return forbidden_error("diagnostics is disabled");
    }

    let status = match &state.mqtt {
        Some(mqtt) => MqttStatusDto {
            enabled: true,
            connected: Some(mqtt.is_connected()),
            broker: Some(mqtt.broker().to_string()),
            topic: Some(mqtt.topic().to_string()),
        },
        None => MqttStatusDto::default(),
    };
    ok(status)
}
