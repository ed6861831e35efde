use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use backend_domain::RuntimeConfig;

/// With no `api_token` configured every request is allowed.
pub fn authorize(config: &RuntimeConfig, headers: &HeaderMap) -> bool {
    match &config.api_token {
        Some(api_token) => extract_bearer(headers).is_some_and(|token| token == api_token),
        None => true,
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
