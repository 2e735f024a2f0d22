use std::sync::Arc;
use uuid::Uuid;

use crate::models::AccountResponse;
use crate::services::store::RecordStore;
use crate::services::{CredentialService, ServiceError};
use crate::utils::{verify_password, Password};

/// Login and account lookup for already onboarded users.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn RecordStore>,
    credentials: CredentialService,
}

impl AccountService {
    pub fn new(store: Arc<dyn RecordStore>, credentials: CredentialService) -> Self {
        Self { store, credentials }
    }

    /// Unknown email and wrong secret fail identically.
    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn login(&self, email: &str, secret: &Password) -> Result<String, ServiceError> {
        let Some(account) = self.store.find_account_by_email(email).await? else {
            tracing::info!("Login failed");
            return Err(ServiceError::InvalidCredentials);
        };

        if verify_password(secret, &account.password_hash()).is_err() {
            tracing::info!(user_id = %account.user_id, "Login failed");
            return Err(ServiceError::InvalidCredentials);
        }

        tracing::info!(user_id = %account.user_id, "Login succeeded");
        self.credentials.issue_token(&account.user_id.to_string())
    }

    pub async fn get_account(&self, user_id: Uuid) -> Result<AccountResponse, ServiceError> {
        self.store
            .find_account_by_id(user_id)
            .await?
            .map(|a| a.sanitized())
            .ok_or(ServiceError::AccountNotFound)
    }
}
