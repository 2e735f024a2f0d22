//! Account creation: uniqueness, screening, persistence, credential and
//! event hand-off.

use std::sync::Arc;
use tokio::sync::Notify;

use crate::dtos::CreateAccountResponse;
use crate::events::{AccountCreated, EventPublisher};
use crate::models::{split_display_name, Account, AuditEventType, OutboxEntry};
use crate::services::metrics;
use crate::services::screening::BlacklistScreener;
use crate::services::store::{RecordStore, StoreError};
use crate::services::{CredentialService, ServiceError};
use crate::utils::{hash_password, Password};

/// How the account-created event leaves a successful creation.
#[derive(Clone)]
pub enum EventDispatch {
    /// Event row committed with the account; the dispatcher is woken.
    Outbox { wake: Arc<Notify> },
    /// Publish spawned on a detached task; failures are only logged.
    Detached { publisher: EventPublisher },
}

#[derive(Clone)]
pub struct OnboardingService {
    store: Arc<dyn RecordStore>,
    screener: Arc<dyn BlacklistScreener>,
    credentials: CredentialService,
    dispatch: EventDispatch,
    screening_fail_open: bool,
}

impl OnboardingService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        screener: Arc<dyn BlacklistScreener>,
        credentials: CredentialService,
        dispatch: EventDispatch,
        screening_fail_open: bool,
    ) -> Self {
        Self {
            store,
            screener,
            credentials,
            dispatch,
            screening_fail_open,
        }
    }

    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn create_account(
        &self,
        email: &str,
        secret: &Password,
        display_name: &str,
    ) -> Result<CreateAccountResponse, ServiceError> {
        if email.trim().is_empty() || display_name.trim().is_empty() || secret.is_blank() {
            metrics::record_rejection("invalid_input");
            return Err(ServiceError::InvalidInput(
                "email, password and name are required".to_string(),
            ));
        }

        // Fast path only; the unique constraint on insert is authoritative.
        if self.store.find_account_by_email(email).await?.is_some() {
            metrics::record_rejection("already_exists");
            return Err(ServiceError::AccountAlreadyExists);
        }

        let (first_name, last_name) = split_display_name(display_name);
        if self.is_blacklisted(&first_name, &last_name, email).await? {
            tracing::info!("Applicant matched the screening blacklist");
            metrics::record_rejection("blacklisted");
            return Err(ServiceError::AccountBlacklisted);
        }

        let password_hash = hash_password(secret).map_err(ServiceError::Internal)?;
        let account = Account::new(
            email.to_string(),
            password_hash,
            display_name.trim().to_string(),
        );
        account.validate().map_err(|e| {
            metrics::record_rejection("invalid_input");
            ServiceError::InvalidInput(e)
        })?;

        let event = AccountCreated::from_account(&account);
        let outbox = match &self.dispatch {
            EventDispatch::Outbox { .. } => Some(OutboxEntry::new(
                AuditEventType::UserCreated.as_str(),
                event.to_json().map_err(|e| ServiceError::Internal(e.into()))?,
            )),
            EventDispatch::Detached { .. } => None,
        };

        match self.store.insert_account(&account, outbox.as_ref()).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation) => {
                tracing::info!("Lost creation race on email uniqueness");
                metrics::record_rejection("already_exists");
                return Err(ServiceError::AccountAlreadyExists);
            }
            Err(e) => return Err(ServiceError::Store(e)),
        }

        tracing::info!(user_id = %account.user_id, "Account created");
        metrics::record_account_created();

        // From here on the account exists even if the caller sees an error.
        let token = self.credentials.issue_token(&account.user_id.to_string())?;

        self.dispatch_event(event);

        Ok(CreateAccountResponse {
            user: account.sanitized(),
            token,
        })
    }

    async fn is_blacklisted(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<bool, ServiceError> {
        if self.screening_fail_open {
            return Ok(self
                .screener
                .check_blacklist(first_name, last_name, email)
                .await);
        }

        let request = crate::services::screening::ScreeningRequest {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        };
        self.screener.screen(&request).await.map_err(|e| {
            tracing::error!(error = %e, "Screening failed and fail-open is disabled");
            ServiceError::ScreeningUnavailable(e.to_string())
        })
    }

    fn dispatch_event(&self, event: AccountCreated) {
        match &self.dispatch {
            EventDispatch::Outbox { wake } => wake.notify_one(),
            EventDispatch::Detached { publisher } => {
                let publisher = publisher.clone();
                tokio::spawn(async move {
                    if let Err(e) = publisher.publish(&event).await {
                        tracing::error!(
                            user_id = %event.user_id,
                            error = %e,
                            "Detached publish of account created event failed"
                        );
                    }
                });
            }
        }
    }
}
