//! Explicit registration, sign-in and sign-out.
//!
//! Token issuance policy is the server's business; this module only performs
//! the client-side calls and keeps the credential store and remembered
//! session in step with their results.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::credential::Identity;
use crate::error::{AuthError, AuthResult};
use crate::refresh::RenewalGrant;
use crate::storage::RememberedSession;
use crate::store::CredentialStore;

/// Sign-in/sign-out operations over the shared HTTP client and store.
///
/// Uses the same `reqwest` client as the renewal path so the session cookie
/// the server sets at sign-in lands in the jar the renewal endpoint later
/// relies on.
pub struct SessionClient {
    client: reqwest::Client,
    signin_url: String,
    register_url: String,
    store: Arc<CredentialStore>,
    remembered: Option<Arc<RememberedSession>>,
}

impl SessionClient {
    /// Create a session client
    pub fn new(
        client: reqwest::Client,
        config: &ApiConfig,
        store: Arc<CredentialStore>,
        remembered: Option<Arc<RememberedSession>>,
    ) -> Self {
        Self {
            client,
            signin_url: config.url_for(&config.signin_path),
            register_url: config.url_for(&config.register_path),
            store,
            remembered,
        }
    }

    /// Sign in with account credentials, seeding the credential store and
    /// remembering the identity hint for future bootstraps.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let response = self
            .client
            .post(&self.signin_url)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::authorization_failure(
                status.as_u16(),
                "sign-in rejected",
            ));
        }
        if !status.is_success() {
            return Err(AuthError::request_failed(status.as_u16(), "sign-in"));
        }

        let body = response.text().await?;
        let grant = RenewalGrant::from_json(&body, "sign-in endpoint")?;

        info!(user = %grant.identity.id, "signed in");
        self.seed(grant).await
    }

    /// Register a new account. The server issues a credential on success, so
    /// a registration doubles as the first sign-in.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> AuthResult<Identity> {
        let response = self
            .client
            .post(&self.register_url)
            .json(&json!({ "name": name, "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::authorization_failure(
                status.as_u16(),
                "registration rejected",
            ));
        }
        if !status.is_success() {
            return Err(AuthError::request_failed(status.as_u16(), "registration"));
        }

        let body = response.text().await?;
        let grant = RenewalGrant::from_json(&body, "registration endpoint")?;

        info!(user = %grant.identity.id, "registered and signed in");
        self.seed(grant).await
    }

    /// Install a freshly issued grant and remember the identity hint
    async fn seed(&self, grant: RenewalGrant) -> AuthResult<Identity> {
        self.store
            .set(grant.credential, grant.identity.clone())
            .await;
        if let Some(remembered) = &self.remembered {
            remembered.remember(&grant.identity.email);
        }
        Ok(grant.identity)
    }

    /// Sign out unconditionally.
    ///
    /// Clears the store (bumping the sign-out epoch, so any in-flight renewal
    /// result is discarded) and forgets the remembered session hint. Safe to
    /// call regardless of what the coordinator is doing.
    pub async fn sign_out(&self) {
        warn!("signing out, clearing session");
        self.store.clear().await;
        if let Some(remembered) = &self.remembered {
            remembered.forget();
        }
    }
}
