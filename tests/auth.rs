//! 会话与登录测试

mod common;

use axum::http::StatusCode;
use common::app;
use serde_json::json;

#[tokio::test]
async fn health_check_is_public() {
    let app = app();
    let resp = app.get("/api/hakayat/health", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["status"], "ok");
}

#[tokio::test]
async fn login_creates_user_once_case_insensitive() {
    let app = app();
    let first = app.login("Scheherazade").await;
    let second = app.login("  scheherazade ").await;

    assert_eq!(first.id, second.id);
    assert_eq!(second.name, "Scheherazade");

    // 三个演示用户加一个新用户
    assert_eq!(app.state.store.users().len(), 4);
}

#[tokio::test]
async fn login_matches_seeded_user() {
    let app = app();
    let user = app.login("عاشق الفضاء").await;
    assert_eq!(user.id, "user-2");
}

#[tokio::test]
async fn login_rejects_blank_name() {
    let app = app();
    let resp = app
        .post_json("/api/hakayat/auth/login", json!({ "name": "   " }), None)
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn me_reflects_session_state() {
    let app = app();

    let anonymous = app.open_session().await;
    let resp = app.get("/api/hakayat/auth/me", Some(&anonymous)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.data().is_null());

    let user = app.login("Sinbad").await;
    let resp = app.get("/api/hakayat/auth/me", Some(&user.token)).await;
    assert_eq!(resp.data()["id"], user.id.as_str());

    let resp = app.post("/api/hakayat/auth/logout", Some(&user.token)).await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app.get("/api/hakayat/auth/me", Some(&user.token)).await;
    assert!(resp.data().is_null());
}

#[tokio::test]
async fn login_keeps_existing_session() {
    let app = app();
    let token = app.open_session().await;

    let resp = app
        .post_json("/api/hakayat/auth/login", json!({ "name": "Aladdin" }), Some(&token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    // 原令牌对应的会话现在已登录
    let me = app.get("/api/hakayat/auth/me", Some(&token)).await;
    assert_eq!(me.data()["name"], "Aladdin");
}

#[tokio::test]
async fn logout_requires_session() {
    let app = app();
    let resp = app.post("/api/hakayat/auth/logout", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app.post("/api/hakayat/auth/logout", Some("garbage")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn avatar_can_only_be_changed_by_owner() {
    let app = app();
    let alice = app.login("Alice").await;
    let bob = app.login("Bob").await;
    let avatar = json!({ "avatar": "data:image/png;base64,iVBORw0KGgo=" });

    let resp = app
        .put_json(&format!("/api/hakayat/users/{}/avatar", alice.id), avatar.clone(), Some(&bob.token))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .put_json(&format!("/api/hakayat/users/{}/avatar", alice.id), avatar, Some(&alice.token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["avatar"], "data:image/png;base64,iVBORw0KGgo=");

    let me = app.get("/api/hakayat/auth/me", Some(&alice.token)).await;
    assert_eq!(me.data()["avatar"], "data:image/png;base64,iVBORw0KGgo=");

    let resp = app
        .put_json(
            &format!("/api/hakayat/users/{}/avatar", alice.id),
            json!({ "avatar": "not-an-image" }),
            Some(&alice.token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_lists_written_liked_and_commented() {
    let app = app();
    let alice = app.login("Alice").await;
    let bob = app.login("Bob").await;

    let mine = app.create_story(&alice, "Mine", "drama").await;
    let theirs = app.create_story(&bob, "Theirs", "comedy").await;

    app.post(&format!("/api/hakayat/stories/{}/like", theirs), Some(&alice.token))
        .await;
    app.post_json(
        &format!("/api/hakayat/stories/{}/comments", theirs),
        json!({ "content": "Lovely" }),
        Some(&alice.token),
    )
    .await;

    let resp = app
        .get(&format!("/api/hakayat/users/{}", alice.id), Some(&alice.token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let profile = resp.data();
    assert_eq!(profile["is_own_profile"], true);
    assert_eq!(profile["written"][0]["id"], mine.as_str());
    assert_eq!(profile["liked"][0]["id"], theirs.as_str());
    assert_eq!(profile["commented"][0]["id"], theirs.as_str());

    let resp = app.get("/api/hakayat/users/user-404", None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}
