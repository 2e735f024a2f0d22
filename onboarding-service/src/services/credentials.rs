use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::services::ServiceError;

/// Issues and validates HS256 bearer tokens bound to an account id.
#[derive(Clone)]
pub struct CredentialService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (account id)
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl CredentialService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let secret = config.secret.expose_secret();
        if secret.is_empty() {
            return Err(anyhow::anyhow!("JWT secret must not be empty"));
        }

        tracing::info!(
            ttl_minutes = config.token_ttl_minutes,
            "Credential service initialized with HS256"
        );

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl_minutes: config.token_ttl_minutes,
        })
    }

    /// Mint a token: issued-at and not-before are now, expiry is now + ttl.
    /// A negative ttl yields a token that is already expired.
    pub fn issue_token(&self, subject: &str) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = Duration::try_minutes(self.token_ttl_minutes)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                ServiceError::Internal(anyhow::anyhow!(
                    "Token lifetime of {} minutes is out of range",
                    self.token_ttl_minutes
                ))
            })?;

        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
    }

    /// Verify signature, algorithm and time window; return the subject.
    pub fn validate_token(&self, token: &str) -> Result<String, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            ServiceError::InvalidToken
        })?;

        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn service(secret: &str, ttl_minutes: i64) -> CredentialService {
        CredentialService::new(&JwtConfig {
            secret: Secret::new(secret.to_string()),
            token_ttl_minutes: ttl_minutes,
        })
        .expect("credential service")
    }

    #[test]
    fn issued_token_resolves_to_subject() {
        let svc = service("test-secret", 60);
        let token = svc.issue_token("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            svc.validate_token(&token).unwrap(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn negative_ttl_issues_expired_token() {
        let svc = service("test-secret", -5);
        let token = svc.issue_token("subject").unwrap();
        assert!(matches!(
            svc.validate_token(&token),
            Err(ServiceError::InvalidToken)
        ));
    }

    #[test]
    fn out_of_range_ttl_is_an_error() {
        let svc = service("test-secret", i64::MAX / 2);
        assert!(matches!(
            svc.issue_token("subject"),
            Err(ServiceError::Internal(_))
        ));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issuer = service("secret-a", 60);
        let verifier = service("secret-b", 60);
        let token = issuer.issue_token("subject").unwrap();
        assert!(matches!(
            verifier.validate_token(&token),
            Err(ServiceError::InvalidToken)
        ));
    }

    #[test]
    fn other_hmac_algorithm_is_rejected() {
        let svc = service("test-secret", 60);
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: "subject".to_string(),
            iat: now,
            nbf: now,
            exp: now + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(
            svc.validate_token(&token),
            Err(ServiceError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let svc = service("test-secret", 60);
        assert!(svc.validate_token("not.a.token").is_err());
        assert!(svc.validate_token("").is_err());
    }

    #[test]
    fn empty_secret_is_refused() {
        let result = CredentialService::new(&JwtConfig {
            secret: Secret::new(String::new()),
            token_ttl_minutes: 60,
        });
        assert!(result.is_err());
    }
}
