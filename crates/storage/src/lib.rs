use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::{Todo, TodoId, UserId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user_id: UserId,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Column changes for [`Storage::update_todo`]; `None` leaves a column as is.
#[derive(Debug, Clone, Default)]
pub struct TodoChanges<'a> {
    pub title: Option<&'a str>,
    pub content: Option<&'a str>,
    pub checked: Option<bool>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, email: &str, password_hash: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert user '{email}'"))?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<StoredUser>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| user_from_row(&row)).transpose()
    }

    pub async fn user_by_id(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query("SELECT id, email, password_hash, created_at FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| user_from_row(&row)).transpose()
    }

    /// Lists todos ordered by id. `title_filter` matches case-insensitively
    /// anywhere in the title. SQLite's `lower()` only folds ASCII, so both
    /// sides are folded in Rust.
    pub async fn list_todos(
        &self,
        title_filter: Option<&str>,
        checked: Option<bool>,
    ) -> Result<Vec<Todo>> {
        let rows = sqlx::query(
            "SELECT id, title, content, checked, created_at, updated_at
             FROM todos
             WHERE (?1 IS NULL OR instr(title_folded, ?1) > 0)
               AND (?2 IS NULL OR checked = ?2)
             ORDER BY id",
        )
        .bind(title_filter.map(fold_title))
        .bind(checked)
        .fetch_all(&self.pool)
        .await?;
        debug!(count = rows.len(), ?title_filter, "listed todos");
        rows.iter().map(todo_from_row).collect()
    }

    pub async fn get_todo(&self, todo_id: TodoId) -> Result<Option<Todo>> {
        let row = sqlx::query(
            "SELECT id, title, content, checked, created_at, updated_at FROM todos WHERE id = ?",
        )
        .bind(todo_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(todo_from_row).transpose()
    }

    pub async fn insert_todo(&self, title: &str, content: &str, checked: bool) -> Result<Todo> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO todos (title, title_folded, content, checked, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id, title, content, checked, created_at, updated_at",
        )
        .bind(title)
        .bind(fold_title(title))
        .bind(content)
        .bind(checked)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert todo")?;
        todo_from_row(&row)
    }

    pub async fn update_todo(
        &self,
        todo_id: TodoId,
        changes: TodoChanges<'_>,
    ) -> Result<Option<Todo>> {
        let row = sqlx::query(
            "UPDATE todos SET
                title = COALESCE(?, title),
                title_folded = COALESCE(?, title_folded),
                content = COALESCE(?, content),
                checked = COALESCE(?, checked),
                updated_at = ?
             WHERE id = ?
             RETURNING id, title, content, checked, created_at, updated_at",
        )
        .bind(changes.title)
        .bind(changes.title.map(fold_title))
        .bind(changes.content)
        .bind(changes.checked)
        .bind(Utc::now())
        .bind(todo_id.0)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to update todo {todo_id}"))?;
        row.as_ref().map(todo_from_row).transpose()
    }

    pub async fn delete_todo(&self, todo_id: TodoId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(todo_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// True when `err` was caused by a UNIQUE constraint, e.g. a duplicate email.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}

fn fold_title(title: &str) -> String {
    title.to_lowercase()
}

fn user_from_row(row: &SqliteRow) -> Result<StoredUser> {
    Ok(StoredUser {
        user_id: UserId(row.try_get("id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn todo_from_row(row: &SqliteRow) -> Result<Todo> {
    Ok(Todo {
        id: TodoId(row.try_get("id")?),
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        checked: row.try_get("checked")?,
        created_at: Some(row.try_get("created_at")?),
        updated_at: Some(row.try_get("updated_at")?),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
