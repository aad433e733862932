use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {}", error.message)]
    Api { status: u16, error: ApiError },
    /// Rejected before any request was sent.
    #[error("{0}")]
    Validation(String),
    #[error("not logged in")]
    Unauthenticated,
    #[error("token store: {0}")]
    TokenStore(String),
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    pub fn api_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { error, .. } => Some(error.code),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthenticated) || self.api_code() == Some(ErrorCode::Unauthorized)
    }
}

impl From<shared::validation::FieldError> for ClientError {
    fn from(value: shared::validation::FieldError) -> Self {
        Self::Validation(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
