use crate::{
    error::{AppError, Result},
    models::{
        response::ApiResponse,
        user::{UpdateAvatarRequest, User, UserProfile},
    },
    services::discovery,
    state::AppState,
    utils::middleware::{CurrentUser, OptionalSession},
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id", get(get_profile))
        .route("/:id/avatar", put(update_avatar))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    OptionalSession(session): OptionalSession,
) -> Result<Json<ApiResponse<UserProfile>>> {
    let user = state
        .store
        .get_user(&user_id)
        .ok_or_else(|| AppError::not_found("User"))?;

    let viewer_id = session.and_then(|s| s.user).map(|u| u.id);
    let profile = discovery::profile(user, &state.store.stories(), viewer_id.as_deref());

    Ok(ApiResponse::success(profile).json())
}

/// 只能修改自己的头像
async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    current: CurrentUser,
    Json(request): Json<UpdateAvatarRequest>,
) -> Result<Json<ApiResponse<User>>> {
    if current.user.id != user_id {
        return Err(AppError::forbidden("You can only change your own avatar"));
    }
    request.validate()?;

    let user = state
        .store
        .update_user_avatar(&user_id, request.avatar)?
        .ok_or_else(|| AppError::not_found("User"))?;

    info!("User {} updated avatar", user.id);
    Ok(ApiResponse::success(user).json())
}
