//! 认证与请求上下文中间件
//!
//! - request_context：注入 request_id/trace_id，并写回响应头
//! - require_token：除健康检查外校验 Bearer token，同时计数请求
//! - bearer_token：从 Authorization 头提取 Bearer token

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use mma_telemetry::new_request_ids;
use tracing::{Instrument, info_span, warn};

use crate::AppState;
use crate::utils::response::auth_error;

/// 无需鉴权的健康检查路径
pub const HEALTH_PATH: &str = "/api/v1/health";

/// 请求上下文中间件：注入 request_id/trace_id
pub async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

/// 从请求头中提取 Bearer token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header_value = headers.get(header::AUTHORIZATION)?;
    let auth_str = header_value.to_str().ok()?;
    auth_str.strip_prefix("Bearer ")
}

/// 鉴权中间件：健康检查公开，其余路径要求有效 token。
pub async fn require_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    state.stats.record_rest_request();
    if req.uri().path() == HEALTH_PATH {
        return next.run(req).await;
    }

    if let Err(err) = state.tokens.verify(bearer_token(req.headers())) {
        state.stats.record_rest_unauthorized();
        warn!(target: "mma.rest", error = %err, "request rejected");
        return auth_error(StatusCode::UNAUTHORIZED);
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::bearer_token;
    use axum::http::{HeaderMap, HeaderValue, header};

    #[test]
    fn bearer_token_extracts() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token-1"),
        );
        assert_eq!(bearer_token(&headers), Some("token-1"));
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("token-1"));
        assert_eq!(bearer_token(&headers), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
