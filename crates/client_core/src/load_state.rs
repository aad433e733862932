use tracing::warn;

use crate::error::Result;

/// What a screen renders from: nothing yet, a request in flight, the last
/// failure, or the last successful payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LoadState<T> {
    #[default]
    Idle,
    Loading,
    Failed(String),
    Ready(T),
}

impl<T> LoadState<T> {
    pub fn from_result(result: Result<T>, what: &str) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(error) => {
                warn!(%error, what, "load failed");
                Self::Failed(error.to_string())
            }
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}
