/// Bearer token authentication middleware for the supervisor API.
///
/// When a token is configured (via `--api-token`), every `/api/*` request
/// must include `Authorization: Bearer <token>`.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

#[derive(Clone)]
pub struct ApiToken(pub Option<String>);

pub async fn require_auth(
    token: axum::extract::Extension<ApiToken>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected = match &token.0 {
        Some(t) => t,
        None => return Ok(next.run(req).await),
    };

    if !req.uri().path().starts_with("/api/") {
        return Ok(next.run(req).await);
    }

    let auth_header = req.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) if value.starts_with("Bearer ") => {
            if constant_time_eq(value[7..].as_bytes(), expected.as_bytes()) {
                Ok(next.run(req).await)
            } else {
                Err(StatusCode::UNAUTHORIZED)
            }
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
