//! To-do manager: backend client, list screen and the debounced search loop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{Todo, TodoId},
    protocol::{CreateTodoRequest, TodoQuery, UpdateTodoRequest},
};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

use crate::{
    debounce::debounce,
    error::{ClientError, Result},
    http::{check_status, endpoint, read_json},
    load_state::LoadState,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoDraft {
    pub title: String,
    pub content: String,
}

impl TodoDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ClientError::Validation("title must not be empty".into()));
        }
        if self.content.trim().is_empty() {
            return Err(ClientError::Validation("content must not be empty".into()));
        }
        Ok(())
    }
}

#[async_trait]
pub trait TodoApi: Send + Sync {
    async fn list(&self, query: &TodoQuery) -> Result<Vec<Todo>>;
    async fn get(&self, id: TodoId) -> Result<Todo>;
    async fn create(&self, req: &CreateTodoRequest) -> Result<Todo>;
    async fn update(&self, id: TodoId, req: &UpdateTodoRequest) -> Result<Todo>;
    async fn delete(&self, id: TodoId) -> Result<()>;
}

pub struct TodoClient {
    http: Client,
    base_url: String,
}

impl TodoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn item_url(&self, id: TodoId) -> Result<url::Url> {
        endpoint(&self.base_url, &format!("todo/{id}"))
    }
}

#[async_trait]
impl TodoApi for TodoClient {
    async fn list(&self, query: &TodoQuery) -> Result<Vec<Todo>> {
        let url = endpoint(&self.base_url, "todo")?;
        let res = self.http.get(url).query(query).send().await?;
        read_json(res).await
    }

    async fn get(&self, id: TodoId) -> Result<Todo> {
        let res = self.http.get(self.item_url(id)?).send().await?;
        read_json(res).await
    }

    async fn create(&self, req: &CreateTodoRequest) -> Result<Todo> {
        let url = endpoint(&self.base_url, "todo")?;
        let res = self.http.post(url).json(req).send().await?;
        read_json(res).await
    }

    async fn update(&self, id: TodoId, req: &UpdateTodoRequest) -> Result<Todo> {
        let res = self.http.patch(self.item_url(id)?).json(req).send().await?;
        read_json(res).await
    }

    async fn delete(&self, id: TodoId) -> Result<()> {
        let res = self.http.delete(self.item_url(id)?).send().await?;
        check_status(res).await?;
        Ok(())
    }
}

pub struct TodoScreen<A: TodoApi> {
    api: A,
    pub draft: TodoDraft,
    search_term: String,
    applied_term: String,
    todos: LoadState<Vec<Todo>>,
    detail: LoadState<Todo>,
}

impl<A: TodoApi> TodoScreen<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            draft: TodoDraft::default(),
            search_term: String::new(),
            applied_term: String::new(),
            todos: LoadState::Idle,
            detail: LoadState::Idle,
        }
    }

    pub fn todos(&self) -> &LoadState<Vec<Todo>> {
        &self.todos
    }

    pub fn detail(&self) -> &LoadState<Todo> {
        &self.detail
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn applied_term(&self) -> &str {
        &self.applied_term
    }

    pub async fn mount(&mut self) {
        self.search_term.clear();
        self.apply_search("").await;
    }

    /// Records raw input only; nothing is fetched until `apply_search`.
    pub fn type_search(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    pub fn is_searching(&self) -> bool {
        self.search_term != self.applied_term
    }

    pub async fn apply_search(&mut self, term: &str) {
        self.applied_term = term.to_string();
        self.refetch().await;
    }

    async fn refetch(&mut self) {
        self.todos = LoadState::Loading;
        let result = self.api.list(&TodoQuery::search(&self.applied_term)).await;
        if let Ok(todos) = &result {
            debug!(term = %self.applied_term, count = todos.len(), "todos fetched");
        }
        self.todos = LoadState::from_result(result, "todos");
    }

    pub async fn create(&mut self) -> Result<Todo> {
        self.draft.validate()?;
        let req = CreateTodoRequest {
            title: self.draft.title.clone(),
            content: self.draft.content.clone(),
            checked: false,
        };
        let todo = self.api.create(&req).await.map_err(|err| {
            error!(error = %err, "failed to create todo");
            err
        })?;
        info!(id = %todo.id, "todo created");
        self.draft = TodoDraft::default();
        self.refetch().await;
        Ok(todo)
    }

    pub async fn toggle(&mut self, id: TodoId) -> Result<Todo> {
        let checked = self
            .cached(id)
            .map(|todo| todo.checked)
            .ok_or_else(|| unknown_todo(id))?;
        let todo = self
            .api
            .update(id, &UpdateTodoRequest::checked(!checked))
            .await
            .map_err(|err| {
                error!(error = %err, %id, "failed to toggle todo");
                err
            })?;
        self.replace_cached(&todo);
        Ok(todo)
    }

    pub async fn edit(
        &mut self,
        id: TodoId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Todo> {
        let draft = TodoDraft::new(title, content);
        draft.validate()?;
        let req = UpdateTodoRequest {
            title: Some(draft.title),
            content: Some(draft.content),
            checked: None,
        };
        let todo = self.api.update(id, &req).await.map_err(|err| {
            error!(error = %err, %id, "failed to update todo");
            err
        })?;
        self.replace_cached(&todo);
        if matches!(&self.detail, LoadState::Ready(current) if current.id == id) {
            self.detail = LoadState::Ready(todo.clone());
        }
        Ok(todo)
    }

    pub async fn remove(&mut self, id: TodoId) -> Result<()> {
        self.api.delete(id).await.map_err(|err| {
            error!(error = %err, %id, "failed to delete todo");
            err
        })?;
        if let Some(todos) = self.todos.ready_mut() {
            todos.retain(|todo| todo.id != id);
        }
        if matches!(&self.detail, LoadState::Ready(current) if current.id == id) {
            self.detail = LoadState::Idle;
        }
        info!(%id, "todo removed");
        Ok(())
    }

    pub async fn open(&mut self, id: TodoId) {
        self.detail = LoadState::Loading;
        self.detail = LoadState::from_result(self.api.get(id).await, "todo detail");
    }

    fn cached(&self, id: TodoId) -> Option<&Todo> {
        self.todos.ready()?.iter().find(|todo| todo.id == id)
    }

    fn replace_cached(&mut self, updated: &Todo) {
        if let Some(slot) = self
            .todos
            .ready_mut()
            .and_then(|todos| todos.iter_mut().find(|todo| todo.id == updated.id))
        {
            *slot = updated.clone();
        }
    }

    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.is_searching() {
            lines.push("searching...".to_string());
        }
        match &self.todos {
            LoadState::Idle => {}
            LoadState::Loading => lines.push("loading todos...".to_string()),
            LoadState::Failed(message) => lines.push(format!("could not load todos: {message}")),
            LoadState::Ready(todos) if todos.is_empty() => lines.push("no todos".to_string()),
            LoadState::Ready(todos) => lines.extend(todos.iter().map(render_todo)),
        }
        lines
    }

    pub fn render_detail(&self) -> Vec<String> {
        match &self.detail {
            LoadState::Idle => Vec::new(),
            LoadState::Loading => vec!["loading todo...".to_string()],
            LoadState::Failed(message) => vec![format!("could not load todo: {message}")],
            LoadState::Ready(todo) => {
                let mut lines = vec![render_todo(todo), todo.content.clone()];
                if let Some(updated) = todo.updated_at {
                    lines.push(format!("updated {}", updated.format("%Y-%m-%d %H:%M")));
                }
                lines
            }
        }
    }
}

fn unknown_todo(id: TodoId) -> ClientError {
    ClientError::Validation(format!("no todo with id {id} in the current list"))
}

fn render_todo(todo: &Todo) -> String {
    let mark = if todo.checked { "[x]" } else { "[ ]" };
    format!("{mark} #{} {}: {}", todo.id, todo.title, todo.content)
}

/// Feeds raw terms into the screen and applies each debounced term, one
/// request at a time, calling `render` after every applied search. Returns
/// the number of searches applied once `inputs` closes.
pub async fn drive_search<A, F>(
    screen: &mut TodoScreen<A>,
    mut inputs: mpsc::Receiver<String>,
    delay: Duration,
    mut render: F,
) -> usize
where
    A: TodoApi,
    F: FnMut(&TodoScreen<A>),
{
    let (raw_tx, raw_rx) = mpsc::channel(16);
    let mut debounced = debounce(raw_rx, delay);
    let mut raw_tx = Some(raw_tx);
    let mut applied = 0;

    loop {
        tokio::select! {
            raw = inputs.recv(), if raw_tx.is_some() => match raw {
                Some(term) => {
                    screen.type_search(term.clone());
                    if let Some(tx) = &raw_tx {
                        if tx.send(term).await.is_err() {
                            raw_tx = None;
                        }
                    }
                }
                None => raw_tx = None,
            },
            term = debounced.next() => match term {
                Some(term) => {
                    screen.apply_search(&term).await;
                    applied += 1;
                    render(screen);
                }
                None => break,
            },
        }
    }
    applied
}

#[cfg(test)]
#[path = "tests/todos_tests.rs"]
mod tests;
