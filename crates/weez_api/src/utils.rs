use crate::types::ApiError;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::collections::HashMap;

/// Pass successful responses through; turn anything else into a classified [`ApiError`].
pub async fn check_response_error(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let response_text = response
        .text()
        .await
        .map_err(|e| ApiError::NetworkError(e.to_string()))?;

    Err(classify_status(status, response_text))
}

pub(crate) fn classify_status(status: StatusCode, body: String) -> ApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimit(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Authentication(body),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiError::InvalidRequest(body),
        StatusCode::NOT_FOUND => ApiError::NotFound(body),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiError::Timeout(body),
        status if status.is_server_error() => ApiError::ServiceError(body),
        _ => ApiError::Unknown(format!("Status {status}: {body}")),
    }
}

pub(crate) fn apply_headers(
    mut builder: RequestBuilder,
    headers: &HashMap<String, String>,
) -> RequestBuilder {
    for (key, value) in headers {
        builder = builder.header(key, value);
    }
    builder
}

/// Join a base URL and a path without doubling or dropping the slash
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
