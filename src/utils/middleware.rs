use crate::{error::AppError, models::user::User, services::SessionId, state::AppState};
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, info, warn};

/// 当前请求所属的浏览会话，以及该会话登录的用户
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub user: Option<User>,
}

/// 会话中间件
///
/// 解析 `Authorization: Bearer <token>`，校验通过后把 [`SessionContext`]
/// 放入请求扩展。无效令牌按匿名请求继续处理。
pub async fn session_middleware(
    State(app_state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    if let Some(token) = token {
        match app_state.tokens.verify(token) {
            Ok(session_id) => {
                let user = app_state.store.current_user(&session_id);
                debug!(
                    "Session {} ({})",
                    session_id,
                    user.as_ref().map(|u| u.id.as_str()).unwrap_or("anonymous")
                );
                request
                    .extensions_mut()
                    .insert(SessionContext { session_id, user });
            }
            Err(e) => {
                debug!("Ignoring invalid session token: {}", e);
            }
        }
    }

    next.run(request).await
}

/// 速率限制中间件（按客户端 IP）
pub async fn rate_limit_middleware(
    State(app_state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    let client_ip = get_client_ip(&request, app_state.config.trust_proxy_headers);

    match app_state.rate_limiter.check_key(&client_ip) {
        Ok(_) => {
            debug!("Rate limit check passed for IP: {}", client_ip);
            Ok(next.run(request).await)
        }
        Err(_) => {
            warn!("Rate limit exceeded for IP: {}", client_ip);
            Err(AppError::RateLimitExceeded)
        }
    }
}

/// 请求日志中间件
pub async fn request_logging_middleware(
    State(app_state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request, app_state.config.trust_proxy_headers);
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let start_time = std::time::Instant::now();

    debug!(
        "Incoming request [{}]: {} {} from {}",
        request_id, method, uri, client_ip
    );

    let response = next.run(request).await;

    info!(
        "Request completed [{}]: {} {} {} - {}ms",
        request_id,
        method,
        uri,
        response.status().as_u16(),
        start_time.elapsed().as_millis()
    );

    response
}

/// 请求 ID 中间件
pub async fn request_id_middleware(mut request: Request<Body>, next: Next<Body>) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// 获取客户端 IP 地址
///
/// 代理头可由客户端任意伪造，只有 `trust_proxy_headers` 为 true 时才读取，
/// 否则使用连接的对端地址。
pub fn get_client_ip(request: &Request<Body>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(request) {
            return ip;
        }
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(request: &Request<Body>) -> Option<String> {
    let headers = request.headers();

    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(ip_str) = forwarded_for.to_str() {
            if let Some(ip) = ip_str.split(',').next() {
                return Some(ip.trim().to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.trim().to_string());
        }
    }

    None
}

/// 请求 ID 包装器
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// 可选会话提取器
pub struct OptionalSession(pub Option<SessionContext>);

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for OptionalSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalSession(parts.extensions.get::<SessionContext>().cloned()))
    }
}

/// 必须携带有效会话（可以未登录）
pub struct RequireSession(pub SessionContext);

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .map(RequireSession)
            .ok_or_else(|| AppError::unauthorized("Session required"))
    }
}

/// 必须已登录
pub struct CurrentUser {
    pub session_id: SessionId,
    pub user: User,
}

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<SessionContext>() {
            Some(SessionContext {
                session_id,
                user: Some(user),
            }) => Ok(CurrentUser {
                session_id: session_id.clone(),
                user: user.clone(),
            }),
            _ => Err(AppError::unauthorized("Login required")),
        }
    }
}
