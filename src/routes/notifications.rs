use crate::{
    error::Result,
    models::{
        notification::{NotificationFeed, NotificationWithAuthor},
        response::ApiResponse,
    },
    state::AppState,
    utils::middleware::{CurrentUser, OptionalSession},
};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_notifications))
        .route("/read", post(mark_as_read))
}

/// 通知列表（最新在前）及当前用户的未读数；匿名时未读数为 0
async fn get_notifications(
    State(state): State<Arc<AppState>>,
    OptionalSession(session): OptionalSession,
) -> Json<ApiResponse<NotificationFeed>> {
    let users = state.store.users();
    let notifications = state
        .store
        .notifications()
        .into_iter()
        .map(|notification| NotificationWithAuthor {
            author_name: users
                .iter()
                .find(|u| u.id == notification.author_id)
                .map(|u| u.name.clone()),
            notification,
        })
        .collect();

    let unread_count = session
        .map(|s| state.store.unread_count(&s.session_id))
        .unwrap_or(0);

    ApiResponse::success(NotificationFeed {
        notifications,
        unread_count,
    })
    .json()
}

async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Value>> {
    state.store.mark_notifications_as_read(&current.session_id)?;

    Ok(Json(json!({
        "success": true,
        "data": { "unread_count": 0 }
    })))
}
