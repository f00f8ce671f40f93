use crate::{
    error::{AppError, Result},
    models::{
        comment::{CommentWithAuthor, CreateCommentRequest, NewComment},
        response::ApiResponse,
        story::{
            CreateStoryRequest, LikeResponse, NewStory, Story, StoryCategory, StoryHighlights,
            StoryQuery, StoryView, UpdateStoryRequest,
        },
        user::User,
    },
    services::discovery,
    state::AppState,
    utils::{
        middleware::{CurrentUser, OptionalSession, RequireSession},
        validation::ensure_max_length,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_stories).post(create_story))
        .route("/highlights", get(get_highlights))
        .route("/:id", get(get_story).put(update_story).delete(delete_story))
        .route("/:id/view", post(record_view))
        .route("/:id/like", post(toggle_like))
        .route("/:id/comments", get(list_comments).post(add_comment))
}

fn story_view(story: Story, users: &[User], viewer: Option<&User>) -> StoryView {
    let author = users.iter().find(|u| u.id == story.author_id).cloned();
    let viewer_id = viewer.map(|u| u.id.as_str());

    StoryView {
        cover_image_url: story.cover_image_or_placeholder(),
        like_count: story.likes.len(),
        comment_count: story.comments.len(),
        reading_time_minutes: discovery::reading_time(&story.content),
        viewer_has_liked: viewer_id.map_or(false, |id| story.is_liked_by(id)),
        is_author: viewer_id == Some(story.author_id.as_str()),
        author,
        story,
    }
}

/// `all` 或空值表示不过滤
fn parse_category(raw: Option<&str>) -> Result<Option<StoryCategory>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("all") => Ok(None),
        Some(value) => value
            .parse::<StoryCategory>()
            .map(Some)
            .map_err(|e| AppError::bad_request(&e.to_string())),
    }
}

fn check_story_lengths(state: &AppState, title: &str, content: &str) -> Result<()> {
    ensure_max_length("title", title, state.config.max_title_length)?;
    ensure_max_length("content", content, state.config.max_story_length)
}

fn require_author(state: &AppState, story_id: &str, user: &User) -> Result<Story> {
    let story = state
        .store
        .get_story(story_id)
        .ok_or_else(|| AppError::not_found("Story"))?;

    if story.author_id != user.id {
        return Err(AppError::forbidden("Only the author can modify this story"));
    }
    Ok(story)
}

async fn list_stories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StoryQuery>,
    OptionalSession(session): OptionalSession,
) -> Result<Json<ApiResponse<Vec<StoryView>>>> {
    let category = parse_category(query.category.as_deref())?;
    let users = state.store.users();
    let viewer = session.and_then(|s| s.user);

    let stories = discovery::filter_stories(
        &state.store.stories(),
        &users,
        query.search.as_deref(),
        category,
    );
    debug!("Listing {} stories", stories.len());

    let views = stories
        .into_iter()
        .map(|story| story_view(story, &users, viewer.as_ref()))
        .collect();

    Ok(ApiResponse::success(views).json())
}

async fn get_highlights(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StoryHighlights>> {
    ApiResponse::success(discovery::highlights(&state.store.stories())).json()
}

async fn create_story(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(request): Json<CreateStoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StoryView>>)> {
    request.validate()?;
    check_story_lengths(&state, &request.title, &request.content)?;

    let story = state.store.create_story(NewStory {
        title: request.title.trim().to_string(),
        content: request.content,
        author_id: current.user.id.clone(),
        cover_image: request.cover_image,
        category: request.category,
    })?;

    let view = story_view(story, &state.store.users(), Some(&current.user));
    Ok((StatusCode::CREATED, ApiResponse::success(view).json()))
}

/// 故事详情；携带会话时按会话计一次浏览
async fn get_story(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    OptionalSession(session): OptionalSession,
) -> Result<Json<ApiResponse<StoryView>>> {
    if let Some(context) = &session {
        state.store.increment_story_view(&context.session_id, &story_id)?;
    }

    let story = state
        .store
        .get_story(&story_id)
        .ok_or_else(|| AppError::not_found("Story"))?;

    let viewer = session.and_then(|s| s.user);
    Ok(ApiResponse::success(story_view(story, &state.store.users(), viewer.as_ref())).json())
}

async fn update_story(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    current: CurrentUser,
    Json(request): Json<UpdateStoryRequest>,
) -> Result<Json<ApiResponse<StoryView>>> {
    let existing = require_author(&state, &story_id, &current.user)?;
    request.validate()?;
    check_story_lengths(&state, &request.title, &request.content)?;

    let updated = Story {
        title: request.title.trim().to_string(),
        content: request.content,
        category: request.category,
        cover_image: request.cover_image,
        ..existing
    };

    if !state.store.update_story(updated.clone())? {
        return Err(AppError::not_found("Story"));
    }

    info!("Story {} updated by {}", story_id, current.user.id);
    Ok(ApiResponse::success(story_view(updated, &state.store.users(), Some(&current.user))).json())
}

async fn delete_story(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    current: CurrentUser,
) -> Result<Json<Value>> {
    require_author(&state, &story_id, &current.user)?;

    if !state.store.delete_story(&story_id)? {
        return Err(AppError::not_found("Story"));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Story deleted successfully"
    })))
}

async fn record_view(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    RequireSession(session): RequireSession,
) -> Result<Json<Value>> {
    if state.store.get_story(&story_id).is_none() {
        return Err(AppError::not_found("Story"));
    }

    let counted = state
        .store
        .increment_story_view(&session.session_id, &story_id)?;

    Ok(Json(json!({
        "success": true,
        "data": { "counted": counted }
    })))
}

async fn toggle_like(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    current: CurrentUser,
) -> Result<Json<ApiResponse<LikeResponse>>> {
    let liked = state
        .store
        .toggle_like(&story_id, &current.user.id)?
        .ok_or_else(|| AppError::not_found("Story"))?;

    let like_count = state
        .store
        .get_story(&story_id)
        .map(|s| s.likes.len())
        .unwrap_or_default();

    Ok(ApiResponse::success(LikeResponse { liked, like_count }).json())
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<CommentWithAuthor>>>> {
    let story = state
        .store
        .get_story(&story_id)
        .ok_or_else(|| AppError::not_found("Story"))?;
    let users = state.store.users();

    let comments = story
        .comments
        .into_iter()
        .map(|comment| CommentWithAuthor {
            author: users.iter().find(|u| u.id == comment.author_id).cloned(),
            comment,
        })
        .collect();

    Ok(ApiResponse::success(comments).json())
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    current: CurrentUser,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CommentWithAuthor>>)> {
    request.validate()?;
    ensure_max_length("content", &request.content, state.config.max_comment_length)?;

    let comment = state
        .store
        .add_comment(
            &story_id,
            NewComment {
                author_id: current.user.id.clone(),
                content: request.content.trim().to_string(),
            },
        )?
        .ok_or_else(|| AppError::not_found("Story"))?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::success(CommentWithAuthor {
            comment,
            author: Some(current.user),
        })
        .json(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category(None).unwrap(), None);
        assert_eq!(parse_category(Some("all")).unwrap(), None);
        assert_eq!(parse_category(Some(" ")).unwrap(), None);
        assert_eq!(
            parse_category(Some("horror")).unwrap(),
            Some(StoryCategory::Horror)
        );
        assert_eq!(
            parse_category(Some("غموض")).unwrap(),
            Some(StoryCategory::Mystery)
        );
        assert!(parse_category(Some("poetry")).is_err());
    }
}
