use crate::{
    error::Result,
    models::{response::ApiResponse, user::LoginRequest},
    state::AppState,
    utils::middleware::{OptionalSession, RequireSession},
};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", post(open_session))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// 打开匿名浏览会话
async fn open_session(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let session_id = state.store.open_session();
    let token = state.tokens.issue(&session_id)?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "token": token,
            "session_id": session_id
        }
    })))
}

/// 按名字登录（不区分大小写），不存在则创建用户
async fn login(
    State(state): State<Arc<AppState>>,
    OptionalSession(session): OptionalSession,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>> {
    request.validate()?;

    let session_id = match session {
        Some(context) => context.session_id,
        None => state.store.open_session(),
    };
    let user = state.store.login(&session_id, &request.name)?;
    let token = state.tokens.issue(&session_id)?;

    info!("Session {} logged in as {}", session_id, user.id);

    Ok(Json(json!({
        "success": true,
        "data": {
            "token": token,
            "session_id": session_id,
            "user": user
        }
    })))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    RequireSession(session): RequireSession,
) -> Result<Json<Value>> {
    state.store.logout(&session.session_id)?;

    Ok(Json(json!({
        "success": true,
        "message": "Logged out"
    })))
}

async fn me(OptionalSession(session): OptionalSession) -> Json<ApiResponse<Value>> {
    let user = session.and_then(|s| s.user);
    ApiResponse::success(json!(user)).json()
}
