mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use chat_service::routes::build_router;

#[tokio::test]
async fn health_is_open() {
    let state = common::test_state(common::lazy_db());
    let app = build_router(state.clone()).with_state(state);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn chat_routes_require_bearer() {
    let state = common::test_state(common::lazy_db());
    let app = build_router(state.clone()).with_state(state);

    let response = app
        .oneshot(
            Request::get("/chat/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_authorization_header_is_rejected() {
    let state = common::test_state(common::lazy_db());
    let app = build_router(state.clone()).with_state(state);

    let response = app
        .oneshot(
            Request::get("/chat/conversations")
                .header("Authorization", "Basic dXNlcjpwYXNz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let state = common::test_state(common::lazy_db());
    let app = build_router(state.clone()).with_state(state);

    let response = app
        .oneshot(Request::get("/chat/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
