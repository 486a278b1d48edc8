//! 路由定义
//!
//! 挂载在 `/api/v1` 下：
//! - 健康检查：/health
//! - 写入：/ingest
//! - 读取：/memory/read
//! - 诊断：/diagnostics/{memory,stats,mqtt}

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

/// 创建 API 路由
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/memory/read", get(read_memory))
        .route("/diagnostics/memory", get(memory_diagnostics))
        .route("/diagnostics/stats", get(stats))
        .route("/diagnostics/mqtt", get(mqtt_status))
}
