use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use server_api::password::hash_password;
use shared::validation::{validate_email, validate_password};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/server.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateUser { email: String, password: String },
    AddTodo { title: String, content: String },
    ListTodos {
        #[arg(long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;

    match cli.command {
        Command::CreateUser { email, password } => {
            validate_email(&email)?;
            validate_password(&password)?;
            let hash = hash_password(&password)?;
            let user_id = storage.create_user(&email, &hash).await?;
            println!("created user_id={user_id}");
        }
        Command::AddTodo { title, content } => {
            anyhow::ensure!(
                !title.trim().is_empty() && !content.trim().is_empty(),
                "title and content must not be empty"
            );
            let todo = storage.insert_todo(title.trim(), content.trim(), false).await?;
            println!("created todo_id={}", todo.id);
        }
        Command::ListTodos { search } => {
            for todo in storage.list_todos(search.as_deref(), None).await? {
                let mark = if todo.checked { "x" } else { " " };
                println!("[{mark}] {} {}: {}", todo.id, todo.title, todo.content);
            }
        }
    }

    Ok(())
}
