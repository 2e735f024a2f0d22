pub mod accounts;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use accounts::{CreateAccountRequest, CreateAccountResponse, LoginRequest, LoginResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Invalid email or password")]
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "onboarding-service")]
    pub service: String,
    #[schema(example = "1.0.0")]
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    #[schema(example = "up")]
    pub database: String,
    #[schema(example = "up")]
    pub event_channel: String,
    /// `disabled` when this instance runs no consumer.
    #[schema(example = "up")]
    pub event_consumer: String,
}
