//! Screen models and HTTP clients for the movie browser, the login form and
//! the to-do manager. Screens render to plain text lines so any front end
//! can draw them.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod debounce;
pub mod error;
mod http;
pub mod load_state;
pub mod todos;
pub mod token_store;

pub use auth::{AuthApi, AuthClient, LoginForm, LoginScreen, RegisterForm, Session};
pub use catalog::{CatalogClient, MovieCatalog, MovieFeed, MovieScreen};
pub use config::ClientSettings;
pub use error::{ClientError, Result};
pub use load_state::LoadState;
pub use todos::{drive_search, TodoApi, TodoClient, TodoDraft, TodoScreen};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
