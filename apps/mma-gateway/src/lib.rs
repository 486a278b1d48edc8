//! Modbus 内存设备网关：REST 接口与各传输入口的装配。

pub mod bootstrap;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod utils;

use axum::{Router, middleware as axum_middleware};
use domain::MemoryRegistry;
use mma_auth::TokenSet;
use mma_config::{MemoryConfig, RestConfig};
use mma_ingest::{IngestService, MqttStatus};
use mma_telemetry::GatewayStats;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// REST 功能开关。
#[derive(Debug, Clone, Copy)]
pub struct RestFeatures {
    pub ingest: bool,
    pub read: bool,
    pub diagnostics: bool,
}

impl RestFeatures {
    pub fn all() -> Self {
        Self {
            ingest: true,
            read: true,
            diagnostics: true,
        }
    }
}

/// 处理器共享状态。
#[derive(Clone)]
pub struct AppState {
    pub memories: Arc<MemoryRegistry>,
    pub memory_config: Arc<MemoryConfig>,
    pub ingest: Arc<IngestService>,
    pub stats: Arc<GatewayStats>,
    pub tokens: Arc<TokenSet>,
    /// 未启用 MQTT 时为 `None`
    pub mqtt: Option<Arc<MqttStatus>>,
    pub features: RestFeatures,
}

impl AppState {
    pub fn new(
        rest: &RestConfig,
        memory_config: MemoryConfig,
        ingest: Arc<IngestService>,
        stats: Arc<GatewayStats>,
        mqtt: Option<Arc<MqttStatus>>,
    ) -> Self {
        Self {
            memories: Arc::clone(ingest.memories()),
            memory_config: Arc::new(memory_config),
            ingest,
            stats,
            tokens: Arc::new(TokenSet::new(rest.auth_enabled, rest.tokens.iter().cloned())),
            mqtt,
            features: RestFeatures {
                ingest: rest.enable_ingest,
                read: rest.enable_read,
                diagnostics: rest.enable_diagnostics,
            },
        }
    }
}

/// 组装完整 HTTP 应用：`/api/v1` 路由 + 认证 + 请求上下文。
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::create_api_router())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_token,
        ))
        .layer(axum_middleware::from_fn(middleware::request_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
