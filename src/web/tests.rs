use crate::api::build_router;
use crate::api::test_support::{signed_in, test_state};
use crate::db::repositories::fixtures::{self, date};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

async fn get(app: &Router, uri: &str, token: Option<&str>) -> Response {
    let mut request = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        request = request.header(header::COOKIE, format!("session={}", token));
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_form(app: &Router, uri: &str, token: Option<&str>, fields: &[(&str, &str)]) -> Response {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let mut request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = token {
        request = request.header(header::COOKIE, format!("session={}", token));
    }
    app.clone()
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

async fn text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

#[tokio::test]
async fn test_landing_page() {
    let app = build_router(test_state().await);

    let response = get(&app, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = text(response).await;
    assert!(html.contains("Мои города"));
    assert!(html.contains("/account/signup"));
}

#[tokio::test]
async fn test_landing_redirects_signed_in_user() {
    let state = test_state().await;
    let (_, token) = signed_in(&state, "anna").await;
    let app = build_router(state);

    let response = get(&app, "/", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/city/all/list");
}

#[tokio::test]
async fn test_private_page_redirects_to_signin() {
    let app = build_router(test_state().await);

    let response = get(&app, "/city/all/list?sort=date_down", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "/account/signin?next=%2Fcity%2Fall%2Flist%3Fsort%3Ddate_down"
    );
}

#[tokio::test]
async fn test_unknown_page_renders_error_template() {
    let app = build_router(test_state().await);

    let response = get(&app, "/no/such/page", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let html = text(response).await;
    assert!(html.contains("<!DOCTYPE html>"));
    assert!(html.contains("Страница не найдена"));
}

#[tokio::test]
async fn test_visited_list_ignores_unknown_sort() {
    let state = test_state().await;
    let geo = fixtures::seed_geography(&state.pool).await;
    let (user, token) = signed_in(&state, "anna").await;
    fixtures::insert_visit(&state.pool, user, geo.cities[0], Some(date(2024, 5, 1)), 5).await;
    let app = build_router(state);

    let response = get(&app, "/city/all/list?sort=sideways", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = text(response).await;
    assert!(html.contains("Тверь"));
    assert!(html.contains("01.05.2024"));
}

#[tokio::test]
async fn test_signin_returns_to_nested_page() {
    let state = test_state().await;
    fixtures::seed_geography(&state.pool).await;
    signed_in(&state, "anna").await;
    let app = build_router(state);

    let response = get(&app, "/region/all/list?filter=visited", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let signin = location(&response).to_string();
    assert_eq!(signin, "/account/signin?next=%2Fregion%2Fall%2Flist%3Ffilter%3Dvisited");

    let form = text(get(&app, &signin, None).await).await;
    assert!(form.contains("name=\"next\""));
    assert!(form.contains("filter=visited"));

    let response = post_form(
        &app,
        "/account/signin",
        None,
        &[("username", "anna"), ("password", "Travel-2024!"), ("next", "/region/all/list?filter=visited")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/region/all/list?filter=visited");

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    let token = cookie
        .trim_start_matches("session=")
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let response = get(&app, "/region/all/list?filter=visited", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_nav_marks_nested_section() {
    let state = test_state().await;
    let (_, token) = signed_in(&state, "anna").await;
    let app = build_router(state);

    let html = text(get(&app, "/city/all/list", Some(&token)).await).await;
    assert!(html.contains("<a href=\"/city/all/list\" class=\"active\">"));
    assert!(!html.contains("<a href=\"/region/all/list\" class=\"active\">"));
}

#[tokio::test]
async fn test_signin_flow() {
    let state = test_state().await;
    signed_in(&state, "anna").await;
    let app = build_router(state);

    let response = post_form(
        &app,
        "/account/signin",
        None,
        &[("username", "anna"), ("password", "wrong"), ("next", "/region/all/list")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let html = text(response).await;
    assert!(html.contains("name=\"password\""));
    assert!(html.contains("value=\"anna\""));

    let response = post_form(
        &app,
        "/account/signin",
        None,
        &[("username", "anna"), ("password", "Travel-2024!"), ("next", "/region/all/list")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/region/all/list");
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_signin_rejects_offsite_next() {
    let state = test_state().await;
    signed_in(&state, "anna").await;
    let app = build_router(state);

    let response = post_form(
        &app,
        "/account/signin",
        None,
        &[("username", "anna"), ("password", "Travel-2024!"), ("next", "//evil.example")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/city/all/list");
}

#[tokio::test]
async fn test_visit_form_round() {
    let state = test_state().await;
    let geo = fixtures::seed_geography(&state.pool).await;
    let (_, token) = signed_in(&state, "anna").await;
    let app = build_router(state);
    let region = geo.regions[0].to_string();
    let city = geo.cities[1].to_string();

    // Missing rating re-renders the form with the message
    let response = post_form(
        &app,
        "/city/create",
        Some(&token),
        &[("region_id", &region), ("city_id", &city), ("rating", "")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("Поставьте оценку от 1 до 5"));

    let response = post_form(
        &app,
        "/city/create",
        Some(&token),
        &[
            ("region_id", &region),
            ("city_id", &city),
            ("date_of_visit", "2024-07-14"),
            ("has_magnet", "on"),
            ("impression", "Тихо и зелено"),
            ("rating", "4"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/city/{}", city));

    let html = text(get(&app, &format!("/city/{}", city), Some(&token)).await).await;
    assert!(html.contains("Ржев"));
    assert!(html.contains("Тихо и зелено"));
    assert!(html.contains("14.07.2024"));

    // Same city and date again is a duplicate
    let response = post_form(
        &app,
        "/city/create",
        Some(&token),
        &[("region_id", &region), ("city_id", &city), ("date_of_visit", "2024-07-14"), ("rating", "3")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("class=\"errors\""));
}

#[tokio::test]
async fn test_foreign_visit_is_not_found() {
    let state = test_state().await;
    let geo = fixtures::seed_geography(&state.pool).await;
    let owner = fixtures::insert_user(&state.pool, "owner").await;
    let visit = fixtures::insert_visit(&state.pool, owner, geo.cities[0], None, 5).await;
    let (_, token) = signed_in(&state, "anna").await;
    let app = build_router(state);

    let response = get(&app, &format!("/city/update/{}", visit), Some(&token)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_region_pages() {
    let state = test_state().await;
    let geo = fixtures::seed_geography(&state.pool).await;
    let (user, token) = signed_in(&state, "anna").await;
    fixtures::insert_visit(&state.pool, user, geo.cities[3], None, 5).await;
    let app = build_router(state);

    let response = get(&app, "/region/all/list?filter=visited", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = text(response).await;
    assert!(html.contains("Ярославская"));
    assert!(!html.contains("Татарстан"));

    let response = get(&app, &format!("/region/{}/map", geo.regions[1]), Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = text(response).await;
    assert!(html.contains("id=\"map-data\""));
    assert!(html.contains("Углич"));

    let response = get(&app, "/region/9999/list", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_share_page_gating() {
    let state = test_state().await;
    fixtures::seed_geography(&state.pool).await;
    let (owner, owner_token) = signed_in(&state, "anna").await;
    let app = build_router(state.clone());

    let response = get(&app, &format!("/share/{}", owner), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post_form(
        &app,
        "/account/share",
        Some(&owner_token),
        &[("can_share", "on"), ("can_share_region_map", "on")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("Настройки сохранены"));

    let settings = state.share_service.settings(owner).await.unwrap();
    assert!(settings.can_share);
    assert!(settings.can_share_region_map);
    assert!(!settings.can_share_dashboard);
    assert!(!settings.can_subscribe);

    // Default page is the first allowed one
    let response = get(&app, &format!("/share/{}", owner), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("region-tiles"));

    let response = get(&app, &format!("/share/{}/dashboard", owner), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = get(&app, &format!("/share/{}/anything", owner), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_report_download() {
    let state = test_state().await;
    let geo = fixtures::seed_geography(&state.pool).await;
    let (user, token) = signed_in(&state, "anna").await;
    fixtures::insert_visit(&state.pool, user, geo.cities[5], Some(date(2023, 8, 2)), 5).await;
    let app = build_router(state);

    let response = get(&app, "/report/download?kind=city&format=csv", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\""));
    assert!(disposition.ends_with(".csv\""));
    assert!(text(response).await.contains("Казань"));

    let response = get(&app, "/report/download?format=pdf", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_blog_and_news_are_public() {
    let app = build_router(test_state().await);

    for uri in ["/news", "/news/", "/blog/", "/blog/?tag=volga&page=2"] {
        let response = get(&app, uri, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
    let response = get(&app, "/blog/42", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_assets() {
    let app = build_router(test_state().await);

    let response = get(&app, "/static/css/style.css", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css; charset=utf-8");

    let response = get(&app, "/static/js/map.js", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/static/missing.css", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
