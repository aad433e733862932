//! Response handling shared by the catalog, auth and todo clients.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::error::{ApiError, ErrorCode};
use url::Url;

use crate::error::{ClientError, Result};

pub(crate) fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    Ok(Url::parse(&format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    ))?)
}

pub(crate) async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T> {
    let res = check_status(res).await?;
    Ok(res.json().await?)
}

pub(crate) async fn check_status(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        error: parse_error_body(status, &body),
    })
}

/// Accepts the backend's `ApiError` body, the catalog's `status_message`
/// body, or anything else as plain text.
fn parse_error_body(status: StatusCode, body: &str) -> ApiError {
    if let Ok(error) = serde_json::from_str::<ApiError>(body) {
        return error;
    }
    let code = code_for_status(status);
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["status_message", "message", "error"] {
            if let Some(message) = map.get(key).and_then(|v| v.as_str()) {
                return ApiError::new(code, message);
            }
        }
    }
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    };
    ApiError::new(code, message)
}

fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
        StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::CONFLICT => ErrorCode::Conflict,
        s if s.is_client_error() => ErrorCode::Validation,
        _ => ErrorCode::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let url = endpoint("http://localhost:8080/", "/todo").expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/todo");
        let url = endpoint("https://api.themoviedb.org/3", "movie/popular").expect("url");
        assert_eq!(url.as_str(), "https://api.themoviedb.org/3/movie/popular");
    }

    #[test]
    fn backend_error_body_is_kept() {
        let err = parse_error_body(
            StatusCode::NOT_FOUND,
            r#"{"code":"not_found","message":"todo 9 not found"}"#,
        );
        assert_eq!(err, ApiError::new(ErrorCode::NotFound, "todo 9 not found"));
    }

    #[test]
    fn catalog_status_message_is_extracted() {
        let err = parse_error_body(
            StatusCode::UNAUTHORIZED,
            r#"{"status_code":7,"status_message":"Invalid API key","success":false}"#,
        );
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.message, "Invalid API key");
    }

    #[test]
    fn empty_body_falls_back_to_reason_phrase() {
        let err = parse_error_body(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "Bad Gateway");
    }
}
