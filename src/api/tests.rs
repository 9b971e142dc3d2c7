use super::build_router;
use super::test_support::{signed_in, test_state};
use crate::db::repositories::fixtures::{self, date};
use crate::models::ShareSettingsInput;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::COOKIE, format!("session={}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let app = build_router(test_state().await);

    let response = send(&app, Method::GET, "/api/city/visited", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let response = send(&app, Method::GET, "/api/city/visited", Some("bogus"), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_sets_cookie_and_me() {
    let state = test_state().await;
    signed_in(&state, "ivan").await;
    let app = build_router(state);

    let response = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"username": "ivan", "password": "Travel-2024!"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));
    let token = json_body(response).await["token"].as_str().unwrap().to_string();

    let response = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let me = json_body(response).await;
    assert_eq!(me["username"], "ivan");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let state = test_state().await;
    signed_in(&state, "ivan").await;
    let app = build_router(state);

    let response = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"username": "ivan", "password": "nope-nope"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_throttled_after_failures() {
    let state = test_state().await;
    signed_in(&state, "ivan").await;
    let app = build_router(state);

    for _ in 0..5 {
        let response = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "ivan", "password": "wrong-password"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"username": "ivan", "password": "Travel-2024!"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_visited_markers_and_unknown_sort() {
    let state = test_state().await;
    let geo = fixtures::seed_geography(&state.pool).await;
    let (user, token) = signed_in(&state, "ivan").await;
    fixtures::insert_visit(&state.pool, user, geo.cities[0], Some(date(2024, 5, 1)), 5).await;
    fixtures::insert_visit(&state.pool, user, geo.cities[5], Some(date(2023, 5, 1)), 4).await;
    let app = build_router(state);

    let response = send(&app, Method::GET, "/api/city/visited?sort=name_down", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cities = json_body(response).await;
    let titles: Vec<&str> = cities
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["city_title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Казань", "Тверь"]);

    let response = send(&app, Method::GET, "/api/city/visited?sort=price", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, Method::GET, "/api/city/not_visited", Some(&token), None).await;
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_list_by_region_is_public() {
    let state = test_state().await;
    let geo = fixtures::seed_geography(&state.pool).await;
    let app = build_router(state);

    let uri = format!("/api/city/list_by_region?region_id={}", geo.regions[1]);
    let response = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let state = test_state().await;
    // The first account becomes admin
    let (_, admin) = signed_in(&state, "admin").await;
    let (_, user) = signed_in(&state, "ivan").await;
    let app = build_router(state);

    let response = send(&app, Method::GET, "/api/admin/dashboard", Some(&user), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        Method::POST,
        "/api/admin/areas",
        Some(&admin),
        Some(json!({"title": "Центральный"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let area = json_body(response).await;

    let response = send(
        &app,
        Method::POST,
        "/api/admin/areas",
        Some(&admin),
        Some(json!({"title": "Центральный"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let uri = format!("/api/admin/areas/{}", area["id"]);
    let response = send(&app, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&app, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, Method::GET, "/api/admin/dashboard", Some(&admin), None).await;
    assert_eq!(json_body(response).await["total_users"], 2);
}

#[tokio::test]
async fn test_share_data_gated_by_settings() {
    let state = test_state().await;
    let geo = fixtures::seed_geography(&state.pool).await;
    let (owner, _) = signed_in(&state, "ivan").await;
    fixtures::insert_visit(&state.pool, owner, geo.cities[0], None, 5).await;
    let app = build_router(state.clone());

    let uri = format!("/api/share/{}/cities", owner);
    let response = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    state
        .share_service
        .save(
            owner,
            ShareSettingsInput {
                can_share: true,
                can_share_dashboard: false,
                can_share_city_map: true,
                can_share_region_map: false,
                can_subscribe: false,
            },
        )
        .await
        .unwrap();

    let response = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

    let uri = format!("/api/share/{}/regions", owner);
    let response = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_subscribe_flow() {
    let state = test_state().await;
    let geo = fixtures::seed_geography(&state.pool).await;
    let (follower, token) = signed_in(&state, "ivan").await;
    let (target, _) = signed_in(&state, "petr").await;
    fixtures::insert_visit(&state.pool, target, geo.cities[3], None, 4).await;
    let app = build_router(state.clone());

    let response = send(
        &app,
        Method::POST,
        "/api/subscribe",
        Some(&token),
        Some(json!({"to_id": follower, "action": "subscribe"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        Method::POST,
        "/api/subscribe",
        Some(&token),
        Some(json!({"to_id": target, "action": "subscribe"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let uri = format!("/api/city/visited/subscriptions?ids={}", target);
    let response = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    state
        .share_service
        .save(
            target,
            ShareSettingsInput {
                can_share: true,
                can_share_dashboard: true,
                can_share_city_map: false,
                can_share_region_map: false,
                can_subscribe: true,
            },
        )
        .await
        .unwrap();

    let response = send(
        &app,
        Method::POST,
        "/api/subscribe",
        Some(&token),
        Some(json!({"to_id": target, "action": "subscribe"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["subscribed"], true);

    let response = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let markers = json_body(response).await;
    assert_eq!(markers[0]["user_id"], target);
    assert_eq!(markers[0]["city_title"], "Ярославль");

    // Turning sharing off cuts the follower off
    state
        .share_service
        .save(target, ShareSettingsInput::default())
        .await
        .unwrap();
    let response = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_logout_clears_session() {
    let state = test_state().await;
    let (_, token) = signed_in(&state, "ivan").await;
    let app = build_router(state);

    let response = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));

    let response = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
