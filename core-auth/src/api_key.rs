//! Static API key validation.

use crate::error::{AuthError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Keys shorter than this (after trimming) are rejected locally.
pub const MIN_API_KEY_LENGTH: usize = 20;

/// Checks the key's shape and returns the trimmed key.
pub fn validate_format(raw: &str) -> Result<&str> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(AuthError::Validation("API key is empty".to_string()));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(AuthError::Validation(
            "API key must not contain whitespace".to_string(),
        ));
    }
    if key.chars().count() < MIN_API_KEY_LENGTH {
        return Err(AuthError::Validation(format!(
            "API key is too short (minimum {MIN_API_KEY_LENGTH} characters)"
        )));
    }
    Ok(key)
}

/// Asks `validation_url` whether the key is accepted.
///
/// 401 and 403 are definitive rejections. Transport failures and 5xx are
/// reported as retryable errors.
#[instrument(skip(http, key))]
pub async fn validate_remote(
    http: &dyn HttpClient,
    validation_url: &str,
    key: &str,
    timeout: Duration,
) -> Result<()> {
    let request = HttpRequest::new(HttpMethod::Get, validation_url)
        .header("x-api-key", key)
        .timeout(timeout);

    let response = http.execute(request).await?;

    match response.status {
        status if (200..300).contains(&status) => {
            debug!("API key accepted");
            Ok(())
        }
        401 | 403 => {
            warn!(status = response.status, "API key rejected");
            Err(AuthError::Authentication(
                "the API key was rejected by the service".to_string(),
            ))
        }
        status => Err(AuthError::TokenEndpoint {
            status,
            message: "API key validation failed".to_string(),
        }),
    }
}
