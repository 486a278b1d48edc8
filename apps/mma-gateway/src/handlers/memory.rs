//! 内存读取接口。
//!
//! - GET /memory/read?memory=&area=&address=&count=

use api_contract::{MemoryReadQuery, MemoryReadResponse};
use axum::{
    extract::{Query, State, rejection::QueryRejection},
    response::Response,
};
use domain::{Area, AreaValues};
use serde_json::json;

use crate::AppState;
use crate::utils::response::{bad_request_error, forbidden_error, not_found_error, ok};

pub async fn read_memory(
    State(state): State<AppState>,
    query: Result<Query<MemoryReadQuery>, QueryRejection>,
) -> Response {
    if !state.features.read {
        return forbidden_error("read is disabled");
    }
    let Ok(Query(query)) = query else {
        return bad_request_error("invalid query");
    };

    let Some(memory) = query.memory.filter(|memory| !memory.is_empty()) else {
        return bad_request_error("memory is required");
    };
    let Some(store) = state.memories.get(&memory) else {
        return not_found_error("memory not found");
    };
    let (Some(area), Some(address), Some(count)) = (query.area, query.address, query.count)
    else {
        return bad_request_error("area, address and count are required");
    };
    let Ok(parsed) = area.trim().parse::<Area>() else {
        return bad_request_error("unknown area");
    };

    let values = match store.read(parsed, address, count) {
        Ok(AreaValues::Bits(bits)) => json!(bits),
        Ok(AreaValues::Registers(registers)) => json!(registers),
        Err(err) => return bad_request_error(err.to_string()),
    };
    state.stats.record_rest_read();

    ok(MemoryReadResponse {
        memory,
        area: parsed.to_string(),
        address,
        values,
    })
}
