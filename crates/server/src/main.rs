use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use server_api::{tokens::AuthConfig, ApiContext};
use shared::{
    domain::{Todo, TodoId, UserProfile},
    error::{ApiError, ErrorCode},
    protocol::{
        AuthTokens, CreateTodoRequest, LoginRequest, RegisterRequest, TodoQuery, UpdateTodoRequest,
    },
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod http_error;

use app_state::AppState;
use config::{load_settings, prepare_database_url};
use http_error::{json_error_body, ApiJson, ApiPath, ApiQuery, HttpError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; check the parent directory and its permissions"
        );
        error
    })?;
    let api = ApiContext {
        storage,
        auth: AuthConfig {
            secret: settings.jwt_secret,
            access_ttl_seconds: settings.access_ttl_seconds,
            refresh_ttl_seconds: settings.refresh_ttl_seconds,
        },
    };

    let app = build_router(Arc::new(AppState { api }), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/register", post(http_register))
        .route("/auth/login", post(http_login))
        .route("/auth/refresh", post(http_refresh))
        .route("/user/me", get(http_me))
        .route("/todo", get(http_list_todos).post(http_create_todo))
        .route(
            "/todo/:todo_id",
            get(http_get_todo)
                .patch(http_update_todo)
                .delete(http_delete_todo),
        )
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::map_response(json_error_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn reject(err: ApiError) -> HttpError {
    HttpError::from(err)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, HttpError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            reject(ApiError::new(
                ErrorCode::Unauthorized,
                "missing bearer token",
            ))
        })
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok("ok")
}

async fn http_register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), HttpError> {
    let profile = server_api::register(&state.api, &req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthTokens>, HttpError> {
    server_api::login(&state.api, &req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AuthTokens>, HttpError> {
    let token = bearer_token(&headers)?;
    server_api::refresh(&state.api, token)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, HttpError> {
    let token = bearer_token(&headers)?;
    server_api::me(&state.api, token)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_todos(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<TodoQuery>,
) -> Result<Json<Vec<Todo>>, HttpError> {
    server_api::list_todos(&state.api, &query)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_todo(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateTodoRequest>,
) -> Result<(StatusCode, Json<Todo>), HttpError> {
    let todo = server_api::create_todo(&state.api, &req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn http_get_todo(
    State(state): State<Arc<AppState>>,
    ApiPath(todo_id): ApiPath<i64>,
) -> Result<Json<Todo>, HttpError> {
    server_api::get_todo(&state.api, TodoId(todo_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_todo(
    State(state): State<Arc<AppState>>,
    ApiPath(todo_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateTodoRequest>,
) -> Result<Json<Todo>, HttpError> {
    server_api::update_todo(&state.api, TodoId(todo_id), &req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_todo(
    State(state): State<Arc<AppState>>,
    ApiPath(todo_id): ApiPath<i64>,
) -> Result<StatusCode, HttpError> {
    server_api::delete_todo(&state.api, TodoId(todo_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
