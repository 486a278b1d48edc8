//! 健康检查（公开）。

use api_contract::HealthDto;
use axum::response::Response;

use crate::utils::response::ok;

pub async fn health() -> Response {
    ok(HealthDto {
        status: "ok".to_string(),
    })
}
