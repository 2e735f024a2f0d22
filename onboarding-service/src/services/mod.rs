//! Services layer: the onboarding pipeline and its collaborators.

pub mod accounts;
pub mod audit;
mod credentials;
pub mod error;
pub mod metrics;
pub mod onboarding;
pub mod screening;
pub mod store;

pub use accounts::AccountService;
pub use audit::AuditRecorder;
pub use credentials::{CredentialService, TokenClaims};
pub use error::ServiceError;
pub use onboarding::{EventDispatch, OnboardingService};
pub use screening::{BlacklistScreener, MockScreener, ScreeningClient, ScreeningError, ScreeningRequest};
pub use store::{Database, InMemoryStore, RecordStore, StoreError};
