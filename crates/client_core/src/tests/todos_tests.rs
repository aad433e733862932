use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tokio::{net::TcpListener, sync::Mutex, time::Instant};

use super::*;

fn todo(id: i64, title: &str, checked: bool) -> Todo {
    Todo {
        id: TodoId(id),
        title: title.into(),
        content: format!("{title} notes"),
        checked,
        created_at: None,
        updated_at: None,
    }
}

/// In-memory backend that records every call it receives.
#[derive(Clone)]
struct FakeTodos {
    items: Arc<Mutex<Vec<Todo>>>,
    calls: Arc<Mutex<Vec<String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl FakeTodos {
    fn with(items: Vec<Todo>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
            calls: Arc::default(),
            fail_writes: Arc::default(),
        }
    }

    fn write_result(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 500,
                error: shared::error::ApiError::new(
                    shared::error::ErrorCode::Internal,
                    "database is locked",
                ),
            });
        }
        Ok(())
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl TodoApi for FakeTodos {
    async fn list(&self, query: &TodoQuery) -> Result<Vec<Todo>> {
        let term = query.title_filter().unwrap_or_default().to_lowercase();
        self.calls.lock().await.push(format!("list {term}"));
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .filter(|t| t.title.to_lowercase().contains(&term))
            .cloned()
            .collect())
    }

    async fn get(&self, id: TodoId) -> Result<Todo> {
        self.calls.lock().await.push(format!("get {id}"));
        self.items
            .lock()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| ClientError::Validation("missing".into()))
    }

    async fn create(&self, req: &CreateTodoRequest) -> Result<Todo> {
        self.calls.lock().await.push(format!("create {}", req.title));
        let mut items = self.items.lock().await;
        let id = items.iter().map(|t| t.id.0).max().unwrap_or(0) + 1;
        let created = Todo {
            id: TodoId(id),
            title: req.title.clone(),
            content: req.content.clone(),
            checked: req.checked,
            created_at: None,
            updated_at: None,
        };
        items.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: TodoId, req: &UpdateTodoRequest) -> Result<Todo> {
        self.calls.lock().await.push(format!("update {id}"));
        self.write_result()?;
        let mut items = self.items.lock().await;
        let item = items
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ClientError::Validation("missing".into()))?;
        if let Some(title) = &req.title {
            item.title = title.clone();
        }
        if let Some(content) = &req.content {
            item.content = content.clone();
        }
        if let Some(checked) = req.checked {
            item.checked = checked;
        }
        Ok(item.clone())
    }

    async fn delete(&self, id: TodoId) -> Result<()> {
        self.calls.lock().await.push(format!("delete {id}"));
        self.write_result()?;
        self.items.lock().await.retain(|t| t.id != id);
        Ok(())
    }
}

fn seeded() -> FakeTodos {
    FakeTodos::with(vec![
        todo(1, "Buy milk", false),
        todo(2, "Write report", true),
        todo(3, "Buy stamps", false),
    ])
}

#[tokio::test]
async fn mount_lists_everything_and_renders_checkboxes() {
    let api = seeded();
    let mut screen = TodoScreen::new(api.clone());

    screen.mount().await;

    assert_eq!(
        screen.render(),
        vec![
            "[ ] #1 Buy milk: Buy milk notes",
            "[x] #2 Write report: Write report notes",
            "[ ] #3 Buy stamps: Buy stamps notes",
        ]
    );
    assert_eq!(api.calls().await, vec!["list "]);
}

#[tokio::test]
async fn empty_title_or_content_creates_nothing() {
    let api = seeded();
    let mut screen = TodoScreen::new(api.clone());

    screen.draft = TodoDraft::new("   ", "body");
    assert!(matches!(screen.create().await, Err(ClientError::Validation(_))));
    screen.draft = TodoDraft::new("title", "");
    assert!(matches!(screen.create().await, Err(ClientError::Validation(_))));

    assert!(api.calls().await.is_empty());
    assert_eq!(screen.draft, TodoDraft::new("title", ""), "draft kept for correction");
}

#[tokio::test]
async fn create_clears_draft_and_refetches_with_applied_term() {
    let api = seeded();
    let mut screen = TodoScreen::new(api.clone());
    screen.apply_search("buy").await;

    screen.draft = TodoDraft::new("Buy bread", "whole wheat");
    let created = screen.create().await.expect("create");

    assert!(!created.checked);
    assert_eq!(screen.draft, TodoDraft::default());
    assert_eq!(screen.todos().ready().map(Vec::len), Some(3));
    assert_eq!(api.calls().await, vec!["list buy", "create Buy bread", "list buy"]);
}

#[tokio::test]
async fn toggle_uses_server_copy() {
    let api = seeded();
    let mut screen = TodoScreen::new(api.clone());
    screen.mount().await;

    let toggled = screen.toggle(TodoId(1)).await.expect("toggle");
    assert!(toggled.checked);
    assert_eq!(screen.render()[0], "[x] #1 Buy milk: Buy milk notes");

    screen.toggle(TodoId(2)).await.expect("toggle back");
    assert!(screen.render()[1].starts_with("[ ]"));
}

#[tokio::test]
async fn toggle_of_unknown_id_is_rejected_locally() {
    let api = seeded();
    let mut screen = TodoScreen::new(api.clone());
    screen.mount().await;

    let err = screen.toggle(TodoId(99)).await.expect_err("unknown");
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(api.calls().await, vec!["list "]);
}

#[tokio::test]
async fn edit_updates_list_and_open_detail() {
    let api = seeded();
    let mut screen = TodoScreen::new(api.clone());
    screen.mount().await;
    screen.open(TodoId(2)).await;

    screen
        .edit(TodoId(2), "Write summary", "two pages")
        .await
        .expect("edit");

    assert_eq!(screen.render()[1], "[x] #2 Write summary: two pages");
    assert_eq!(screen.detail().ready().map(|t| t.title.as_str()), Some("Write summary"));

    let err = screen.edit(TodoId(2), "", "x").await.expect_err("blank title");
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn remove_drops_item_and_detail() {
    let api = seeded();
    let mut screen = TodoScreen::new(api.clone());
    screen.mount().await;
    screen.open(TodoId(3)).await;

    screen.remove(TodoId(3)).await.expect("remove");

    assert_eq!(screen.todos().ready().map(Vec::len), Some(2));
    assert_eq!(screen.detail(), &LoadState::Idle);
}

#[tokio::test]
async fn failed_writes_leave_cached_list_untouched() {
    let api = seeded();
    let mut screen = TodoScreen::new(api.clone());
    screen.mount().await;
    screen.open(TodoId(1)).await;
    let before = screen.render();
    api.fail_writes.store(true, Ordering::SeqCst);

    let err = screen.toggle(TodoId(1)).await.expect_err("toggle fails");
    assert_eq!(err.api_code(), Some(shared::error::ErrorCode::Internal));
    screen
        .edit(TodoId(1), "Buy oat milk", "two cartons")
        .await
        .expect_err("edit fails");
    screen.remove(TodoId(1)).await.expect_err("remove fails");

    assert_eq!(screen.render(), before);
    assert_eq!(screen.render()[0], "[ ] #1 Buy milk: Buy milk notes");
    assert_eq!(screen.detail().ready().map(|t| t.title.as_str()), Some("Buy milk"));
    assert_eq!(
        api.calls().await,
        vec!["list ", "get 1", "update 1", "update 1", "delete 1"]
    );
}

#[tokio::test]
async fn typing_marks_searching_until_applied() {
    let mut screen = TodoScreen::new(seeded());
    screen.mount().await;

    screen.type_search("stamps");
    assert!(screen.is_searching());
    assert_eq!(screen.render()[0], "searching...");

    screen.apply_search("stamps").await;
    assert!(!screen.is_searching());
    assert_eq!(screen.render(), vec!["[ ] #3 Buy stamps: Buy stamps notes"]);
}

#[tokio::test(start_paused = true)]
async fn search_refetches_only_after_quiet_interval() {
    let api = seeded();
    let mut screen = TodoScreen::new(api.clone());
    let (tx, rx) = mpsc::channel(8);
    let start = Instant::now();
    let renders = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = renders.clone();

    let driver = drive_search(&mut screen, rx, Duration::from_millis(800), move |screen| {
        seen.lock()
            .expect("renders")
            .push((start.elapsed(), screen.applied_term().to_string()));
    });
    let feeder = {
        let calls = api.calls.clone();
        async move {
            for term in ["b", "bu", "buy"] {
                tx.send(term.to_string()).await.expect("send");
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            tokio::time::sleep(Duration::from_millis(400)).await;
            assert!(calls.lock().await.is_empty(), "no fetch inside the interval");
            tokio::time::sleep(Duration::from_millis(1000)).await;
        }
    };

    let (applied, ()) = tokio::join!(driver, feeder);

    assert_eq!(applied, 1);
    assert_eq!(api.calls().await, vec!["list buy"]);
    let renders = renders.lock().expect("renders");
    assert_eq!(renders.len(), 1);
    assert!(renders[0].0 >= Duration::from_millis(1400), "{:?}", renders[0].0);
    assert_eq!(renders[0].1, "buy");
    assert!(!screen.is_searching());
}

async fn spawn_todo_server() -> (String, Arc<Mutex<Vec<HashMap<String, String>>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let queries: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::default();
    let app = Router::new()
        .route(
            "/todo",
            get(
                |State(queries): State<Arc<Mutex<Vec<HashMap<String, String>>>>>,
                 Query(query): Query<HashMap<String, String>>| async move {
                    queries.lock().await.push(query);
                    Json(vec![todo(1, "Buy milk", false)])
                },
            ),
        )
        .route(
            "/todo/:id",
            get(|Path(id): Path<i64>| async move {
                if id == 1 {
                    Ok(Json(todo(1, "Buy milk", false)))
                } else {
                    Err((
                        StatusCode::NOT_FOUND,
                        Json(shared::error::ApiError::new(
                            shared::error::ErrorCode::NotFound,
                            "todo not found",
                        )),
                    ))
                }
            })
            .delete(|| async { StatusCode::NO_CONTENT }),
        )
        .with_state(queries.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), queries)
}

#[tokio::test]
async fn client_sends_search_term_and_maps_errors() {
    let (base_url, queries) = spawn_todo_server().await;
    let client = TodoClient::new(base_url);

    let todos = client.list(&TodoQuery::search("milk")).await.expect("list");
    assert_eq!(todos.len(), 1);
    assert_eq!(
        queries.lock().await[0].get("title").map(String::as_str),
        Some("milk")
    );

    assert_eq!(client.get(TodoId(1)).await.expect("get").title, "Buy milk");
    let err = client.get(TodoId(2)).await.expect_err("missing");
    assert_eq!(err.api_code(), Some(shared::error::ErrorCode::NotFound));

    client.delete(TodoId(1)).await.expect("delete");
}
