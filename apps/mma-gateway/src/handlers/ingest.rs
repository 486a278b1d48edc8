//! REST 写入接口。
//!
//! - POST /ingest
//!
//! 只接受离散输入与输入寄存器；线圈与保持寄存器只能经 MQTT 或 Raw Ingest 预置。

use api_contract::IngestAccepted;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::Response,
};
use domain::Area;
use mma_ingest::IngestCommand;
use tracing::{info, warn};

use crate::AppState;
use crate::utils::response::{bad_request_error, forbidden_error, ingest_error, ok};

pub async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestCommand>, JsonRejection>,
) -> Response {
    if !state.features.ingest {
        return forbidden_error("ingest is disabled");
    }

    let command = match payload {
        Ok(Json(command)) => command,
        Err(rejection) => {
            state.stats.record_rest_rejected();
            warn!(target: "mma.rest", error = %rejection, "invalid ingest body");
            return bad_request_error("invalid json");
        }
    };

    if matches!(
        command.area.trim().parse::<Area>(),
        Ok(Area::Coils | Area::HoldingRegisters)
    ) {
        state.stats.record_rest_rejected();
        return forbidden_error("area is not writable via ingest");
    }

    match state.ingest.ingest(&command) {
        Ok(written) => {
            state.stats.record_rest_ingest();
            state.stats.record_ingest_written(written);
            info!(
                target: "mma.rest",
                memory = %command.memory,
                area = %command.area,
                address = command.address,
                written,
                "ingest accepted"
            );
            ok(IngestAccepted {
                status: "accepted".to_string(),
                memory: command.memory,
                area: command.area,
                written,
            })
        }
        Err(err) => {
            state.stats.record_rest_rejected();
            state.stats.record_ingest_rejected();
            warn!(
                target: "mma.rest",
                memory = %command.memory,
                area = %command.area,
                error = %err,
                "ingest rejected"
            );
            ingest_error(&err)
        }
    }
}
