use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    drive_search, AuthClient, CatalogClient, ClientSettings, FileTokenStore, LoginScreen,
    MovieFeed, MovieScreen, Session, TodoClient, TodoDraft, TodoScreen,
};
use shared::domain::TodoId;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Movie browser, login form and to-do manager in the terminal")]
struct Cli {
    /// Settings file; defaults to ./screens.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the first page of popular movies.
    Movies {
        #[arg(long)]
        now_playing: bool,
    },
    Login {
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        password: String,
    },
    Logout,
    Whoami,
    #[command(subcommand)]
    Todos(TodoCommand),
}

#[derive(Subcommand, Debug)]
enum TodoCommand {
    List {
        #[arg(long, default_value = "")]
        search: String,
    },
    Add(TodoText),
    Toggle {
        id: i64,
    },
    Show {
        id: i64,
    },
    Edit {
        id: i64,
        #[command(flatten)]
        text: TodoText,
    },
    Rm {
        id: i64,
    },
    /// Read search terms from stdin, one per line, and re-render after each
    /// debounced search.
    Watch,
}

#[derive(Args, Debug)]
struct TodoText {
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings =
        ClientSettings::load(cli.config.as_deref()).context("failed to load client settings")?;
    debug!(?settings, "settings loaded");

    match cli.command {
        Command::Movies { now_playing } => {
            let feed = if now_playing {
                MovieFeed::NowPlaying
            } else {
                MovieFeed::Popular
            };
            let mut screen = MovieScreen::new(CatalogClient::from_settings(&settings), feed);
            screen.mount().await;
            println!("{}", feed.heading());
            print_lines(&screen.render());
            if let Some(message) = screen.state().error() {
                anyhow::bail!("{message}");
            }
        }
        Command::Login { email, password } => {
            let mut screen = LoginScreen::new(
                AuthClient::new(&settings.backend_url),
                FileTokenStore::new(&settings.token_path),
            );
            screen.set_email(email);
            screen.set_password(password);
            if !screen.submit_enabled() {
                print_lines(&screen.render());
                anyhow::bail!("fix the highlighted fields and try again");
            }
            let result = screen.submit().await;
            print_lines(&screen.render());
            result?;
        }
        Command::Logout => {
            Session::logout(&FileTokenStore::new(&settings.token_path))?;
            println!("logged out");
        }
        Command::Whoami => {
            let store = FileTokenStore::new(&settings.token_path);
            let api = AuthClient::new(&settings.backend_url);
            match Session::restore(&store, &api).await? {
                Some(session) => println!("{}", session.display_name),
                None => println!("not logged in"),
            }
        }
        Command::Todos(command) => run_todos(&settings, command).await?,
    }

    Ok(())
}

async fn run_todos(settings: &ClientSettings, command: TodoCommand) -> Result<()> {
    let mut screen = TodoScreen::new(TodoClient::new(&settings.backend_url));

    match command {
        TodoCommand::List { search } => {
            screen.apply_search(&search).await;
            print_lines(&screen.render());
        }
        TodoCommand::Add(text) => {
            screen.draft = TodoDraft::new(text.title, text.content);
            let todo = screen.create().await?;
            println!("created #{}", todo.id);
            print_lines(&screen.render());
        }
        TodoCommand::Toggle { id } => {
            screen.mount().await;
            screen.toggle(TodoId(id)).await?;
            print_lines(&screen.render());
        }
        TodoCommand::Show { id } => {
            screen.open(TodoId(id)).await;
            print_lines(&screen.render_detail());
            if let Some(message) = screen.detail().error() {
                anyhow::bail!("{message}");
            }
        }
        TodoCommand::Edit { id, text } => {
            screen.open(TodoId(id)).await;
            screen.edit(TodoId(id), text.title, text.content).await?;
            print_lines(&screen.render_detail());
        }
        TodoCommand::Rm { id } => {
            screen.remove(TodoId(id)).await?;
            println!("removed #{id}");
        }
        TodoCommand::Watch => {
            screen.mount().await;
            print_lines(&screen.render());
            let delay = settings.search_debounce();
            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(async move {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(term)) => {
                            if tx.send(term.trim().to_string()).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(error) => {
                            warn!(%error, "failed to read search input");
                            break;
                        }
                    }
                }
                // Let the last term settle before closing the input.
                tokio::time::sleep(delay * 2).await;
            });
            let applied = drive_search(&mut screen, rx, delay, |screen| {
                println!("-- search: {:?}", screen.applied_term());
                print_lines(&screen.render());
            })
            .await;
            debug!(applied, "search input closed");
        }
    }

    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
