use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{CreateAccountRequest, CreateAccountResponse, ErrorResponse},
    middleware::AuthAccount,
    models::AccountResponse,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Onboard a new user
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = CreateAccountResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Applicant is blacklisted", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Accounts"
)]
pub async fn create_account(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = state
        .onboarding
        .create_account(&req.email, &Password::new(req.password), &req.name)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Current account
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Authenticated account", body = AccountResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    tag = "Accounts",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    AuthAccount(user_id): AuthAccount,
) -> Result<Json<AccountResponse>, AppError> {
    Ok(Json(state.accounts.get_account(user_id).await?))
}
