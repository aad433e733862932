use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::{net::TcpListener, sync::Mutex};

use super::*;

#[derive(Debug, Clone)]
struct SeenRequest {
    authorization: Option<String>,
    query: HashMap<String, String>,
}

#[derive(Clone, Default)]
struct CatalogState {
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

fn page_json(titles: &[&str]) -> serde_json::Value {
    let results: Vec<_> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            serde_json::json!({
                "id": i + 1,
                "title": title,
                "popularity": 100.0 - i as f64,
                "release_date": "2024-10-01",
                "adult": false
            })
        })
        .collect();
    serde_json::json!({
        "page": 1,
        "results": results,
        "total_pages": 1,
        "total_results": titles.len()
    })
}

async fn record(state: &CatalogState, headers: &HeaderMap, query: HashMap<String, String>) {
    state.seen.lock().await.push(SeenRequest {
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        query,
    });
}

async fn popular(
    State(state): State<CatalogState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    record(&state, &headers, query).await;
    Json(page_json(&["Joker", "Venom", "Wild Robot"]))
}

async fn now_playing(
    State(state): State<CatalogState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    record(&state, &headers, query).await;
    Json(page_json(&["Smile 2"]))
}

async fn spawn_catalog_server() -> (String, CatalogState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = CatalogState::default();
    let app = Router::new()
        .route("/3/movie/popular", get(popular))
        .route("/3/movie/now_playing", get(now_playing))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/3"), state)
}

async fn spawn_rejecting_server() -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(
        "/movie/popular",
        get(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "status_code": 7,
                    "status_message": "Invalid API key: You must be granted a valid key.",
                    "success": false
                })),
            )
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn renders_one_line_per_returned_movie() {
    let (base_url, state) = spawn_catalog_server().await;
    let mut screen = MovieScreen::new(
        CatalogClient::new(base_url, "tmdb-token", "en-US"),
        MovieFeed::Popular,
    );

    screen.mount().await;

    let lines = screen.render();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Joker"));
    assert!(lines[2].contains("Wild Robot"));

    let seen = state.seen.lock().await;
    assert_eq!(seen.len(), 1, "mount issues exactly one request");
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer tmdb-token"));
    assert_eq!(seen[0].query.get("language").map(String::as_str), Some("en-US"));
    assert_eq!(seen[0].query.get("page").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn now_playing_feed_uses_its_own_endpoint() {
    let (base_url, _state) = spawn_catalog_server().await;
    let mut screen = MovieScreen::new(
        CatalogClient::new(base_url, "tmdb-token", "ko-KR"),
        MovieFeed::NowPlaying,
    );

    screen.mount().await;

    let movies = screen.state().ready().expect("ready");
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].title, "Smile 2");
}

#[tokio::test]
async fn rejected_token_renders_error_branch() {
    let base_url = spawn_rejecting_server().await;
    let mut screen = MovieScreen::new(
        CatalogClient::new(base_url, "bad-token", "en-US"),
        MovieFeed::Popular,
    );

    screen.mount().await;

    let lines = screen.render();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("Invalid API key"), "{lines:?}");
}

#[tokio::test]
async fn missing_token_fails_without_a_request() {
    let (base_url, state) = spawn_catalog_server().await;
    let client = CatalogClient::new(base_url, "  ", "en-US");

    let err = client.popular(1).await.expect_err("no token");
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(state.seen.lock().await.is_empty());
}

#[test]
fn idle_screen_renders_nothing() {
    let screen = MovieScreen::new(CatalogClient::new("http://x", "t", "en-US"), MovieFeed::Popular);
    assert!(screen.render().is_empty());
}
