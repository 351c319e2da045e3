//! Token authentication middleware.

use crate::server::AppContext;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

const TOKEN_HEADER: &str = "x-chancast-token";

fn token_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token").then(|| value.to_string())
    })
}

/// Enforce token authentication on protected routes. Players that cannot
/// set headers pass the token as a `token` query parameter instead.
pub async fn token_auth_middleware(
    State(ctx): State<AppContext>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let auth = &ctx.config.auth;
    if !auth.enabled {
        return Ok(next.run(request).await);
    }

    let header_token = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let query_token = request.uri().query().and_then(token_from_query);

    match header_token.or(query_token) {
        Some(token) if token == auth.token => Ok(next.run(request).await),
        _ => {
            tracing::warn!("Unauthorized request to {}", request.uri().path());
            Err((StatusCode::UNAUTHORIZED, "Unauthorized: valid token required"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_from_query() {
        assert_eq!(
            token_from_query("variant=low&token=abc"),
            Some("abc".to_string())
        );
        assert_eq!(token_from_query("token=abc"), Some("abc".to_string()));
        assert_eq!(token_from_query("variant=low"), None);
        assert_eq!(token_from_query(""), None);
    }
}
