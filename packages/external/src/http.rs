//! Error classification shared by the HTTP clients.

use std::time::Duration;

use crate::{JoinError, LookupError};

/// Builds a client with the service's request timeout.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, JoinError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| JoinError::Client {
            message: e.to_string(),
        })
}

/// Maps a transport error onto the retry classes.
pub fn classify_error(e: &reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Timeout
    } else if e.is_connect() || e.is_request() || e.is_body() {
        LookupError::Transient {
            message: e.to_string(),
        }
    } else {
        LookupError::Permanent {
            message: e.to_string(),
        }
    }
}

/// HTTP 429 and 5xx are worth retrying; 404 means no data; other
/// client errors are permanent.
pub fn check_status(status: reqwest::StatusCode) -> Result<(), LookupError> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("HTTP {status}");
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(LookupError::Transient { message })
    } else if status == reqwest::StatusCode::NOT_FOUND {
        Err(LookupError::NotFound { message })
    } else {
        Err(LookupError::Permanent { message })
    }
}

/// Reads and decodes a JSON body.
pub async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, LookupError> {
    let text = response.text().await.map_err(|e| classify_error(&e))?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| LookupError::Permanent {
        message: format!("invalid JSON response: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert!(check_status(reqwest::StatusCode::OK).is_ok());
        assert!(
            check_status(reqwest::StatusCode::TOO_MANY_REQUESTS)
                .unwrap_err()
                .is_retryable()
        );
        assert!(
            check_status(reqwest::StatusCode::BAD_GATEWAY)
                .unwrap_err()
                .is_retryable()
        );
        assert!(matches!(
            check_status(reqwest::StatusCode::NOT_FOUND),
            Err(LookupError::NotFound { .. })
        ));
        assert!(matches!(
            check_status(reqwest::StatusCode::BAD_REQUEST),
            Err(LookupError::Permanent { .. })
        ));
    }
}
