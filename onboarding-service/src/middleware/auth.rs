use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{dtos::ErrorResponse, AppState};

/// Account id taken from a validated bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthAccount(pub Uuid);

/// Require a valid `Authorization: Bearer <token>` header.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("Missing or invalid Authorization header"))?;

    let subject = state
        .credentials
        .validate_token(token)
        .map_err(|_| unauthorized("Invalid or expired token"))?;

    let user_id = Uuid::parse_str(&subject).map_err(|_| {
        tracing::warn!(subject = %subject, "Token subject is not an account id");
        unauthorized("Invalid or expired token")
    })?;

    req.extensions_mut().insert(AuthAccount(user_id));
    Ok(next.run(req).await)
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthAccount
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthAccount>().copied().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Authenticated account missing from request extensions".to_string(),
            }),
        ))
    }
}
