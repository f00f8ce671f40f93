use crate::{
    error::Result,
    models::{
        generation::{GenerateStoryRequest, GeneratedStory},
        response::ApiResponse,
    },
    state::AppState,
    utils::middleware::{rate_limit_middleware, CurrentUser},
};
use axum::{extract::State, middleware, response::Json, routing::post, Router};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(generate_story))
        .route_layer(middleware::from_fn_with_state(state, rate_limit_middleware))
}

/// 生成故事草稿，不保存；由客户端决定是否发布
async fn generate_story(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(request): Json<GenerateStoryRequest>,
) -> Result<Json<ApiResponse<GeneratedStory>>> {
    request.validate()?;

    info!("User {} requested a generated story", current.user.id);
    let story = state
        .generator
        .generate(&current.session_id, request.prompt.trim())
        .await?;

    Ok(ApiResponse::success(story).json())
}
