use shared::{
    domain::{Todo, TodoId, UserProfile},
    error::{ApiError, ErrorCode},
    protocol::{
        AuthTokens, CreateTodoRequest, LoginRequest, RegisterRequest, TodoQuery, UpdateTodoRequest,
    },
    validation::{validate_email, validate_password, validate_password_check},
};
use storage::{Storage, TodoChanges};
use tracing::{info, warn};

pub mod password;
pub mod tokens;

use password::{hash_password, verify_password};
use tokens::{issue_tokens, verify_token, AuthConfig, TokenKind};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub auth: AuthConfig,
}

pub async fn register(ctx: &ApiContext, req: &RegisterRequest) -> Result<UserProfile, ApiError> {
    let email = req.email.trim();
    validate_email(email).map_err(validation)?;
    validate_password(&req.password).map_err(validation)?;
    validate_password_check(&req.password, &req.password_check).map_err(validation)?;

    if ctx
        .storage
        .find_user_by_email(email)
        .await
        .map_err(internal)?
        .is_some()
    {
        return Err(email_taken());
    }

    let hash = hash_password(&req.password).map_err(internal)?;
    let user_id = ctx
        .storage
        .create_user(email, &hash)
        .await
        .map_err(insert_user_error)?;
    info!(user_id = user_id.0, "registered user");
    Ok(UserProfile {
        id: user_id,
        email: email.to_string(),
    })
}

pub async fn login(ctx: &ApiContext, req: &LoginRequest) -> Result<AuthTokens, ApiError> {
    let email = req.email.trim();
    let user = ctx
        .storage
        .find_user_by_email(email)
        .await
        .map_err(internal)?
        .ok_or_else(bad_credentials)?;

    if !verify_password(&req.password, &user.password_hash).map_err(internal)? {
        warn!(user_id = user.user_id.0, "login rejected: password mismatch");
        return Err(bad_credentials());
    }

    issue_tokens(&ctx.auth, user.user_id, &user.email)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("token mint failed: {e}")))
}

pub async fn refresh(ctx: &ApiContext, refresh_token: &str) -> Result<AuthTokens, ApiError> {
    let user = authenticate(ctx, refresh_token, TokenKind::Refresh).await?;
    issue_tokens(&ctx.auth, user.id, &user.email)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("token mint failed: {e}")))
}

pub async fn me(ctx: &ApiContext, access_token: &str) -> Result<UserProfile, ApiError> {
    authenticate(ctx, access_token, TokenKind::Access).await
}

async fn authenticate(
    ctx: &ApiContext,
    token: &str,
    kind: TokenKind,
) -> Result<UserProfile, ApiError> {
    let claims = verify_token(&ctx.auth, token, kind)
        .map_err(|e| ApiError::new(ErrorCode::Unauthorized, e.to_string()))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "malformed token subject"))?;
    let user = ctx
        .storage
        .user_by_id(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "user no longer exists"))?;
    Ok(UserProfile {
        id: user.user_id,
        email: user.email,
    })
}

pub async fn list_todos(ctx: &ApiContext, query: &TodoQuery) -> Result<Vec<Todo>, ApiError> {
    ctx.storage
        .list_todos(query.title_filter(), query.checked)
        .await
        .map_err(internal)
}

pub async fn get_todo(ctx: &ApiContext, todo_id: TodoId) -> Result<Todo, ApiError> {
    ctx.storage
        .get_todo(todo_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| todo_not_found(todo_id))
}

pub async fn create_todo(ctx: &ApiContext, req: &CreateTodoRequest) -> Result<Todo, ApiError> {
    require_text("title", &req.title)?;
    require_text("content", &req.content)?;
    let todo = ctx
        .storage
        .insert_todo(&req.title, &req.content, req.checked)
        .await
        .map_err(internal)?;
    info!(todo_id = todo.id.0, "created todo");
    Ok(todo)
}

pub async fn update_todo(
    ctx: &ApiContext,
    todo_id: TodoId,
    req: &UpdateTodoRequest,
) -> Result<Todo, ApiError> {
    if let Some(title) = &req.title {
        require_text("title", title)?;
    }
    if let Some(content) = &req.content {
        require_text("content", content)?;
    }
    ctx.storage
        .update_todo(
            todo_id,
            TodoChanges {
                title: req.title.as_deref(),
                content: req.content.as_deref(),
                checked: req.checked,
            },
        )
        .await
        .map_err(internal)?
        .ok_or_else(|| todo_not_found(todo_id))
}

pub async fn delete_todo(ctx: &ApiContext, todo_id: TodoId) -> Result<(), ApiError> {
    if !ctx.storage.delete_todo(todo_id).await.map_err(internal)? {
        return Err(todo_not_found(todo_id));
    }
    info!(todo_id = todo_id.0, "deleted todo");
    Ok(())
}

fn require_text(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{field} must not be empty"),
        ));
    }
    Ok(())
}

fn todo_not_found(todo_id: TodoId) -> ApiError {
    ApiError::new(ErrorCode::NotFound, format!("todo {todo_id} not found"))
}

fn bad_credentials() -> ApiError {
    ApiError::new(ErrorCode::Unauthorized, "invalid email or password")
}

fn validation(err: shared::validation::FieldError) -> ApiError {
    ApiError::new(ErrorCode::Validation, err.to_string())
}

fn email_taken() -> ApiError {
    ApiError::new(ErrorCode::Conflict, "email is already registered")
}

/// A concurrent registration can pass the lookup and still lose the insert.
fn insert_user_error(err: anyhow::Error) -> ApiError {
    if storage::is_unique_violation(&err) {
        warn!("registration raced on a duplicate email");
        return email_taken();
    }
    internal(err)
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
