//! Initial authentication state at process start.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::credential::Identity;
use crate::refresh::RenewalClient;
use crate::storage::RememberedSession;
use crate::store::CredentialStore;

/// What session bootstrap decided
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    /// Whether a session was established
    pub authenticated: bool,
    /// The identity when authenticated
    pub identity: Option<Identity>,
}

impl BootstrapOutcome {
    fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            identity: None,
        }
    }
}

/// Decides the initial [`AuthSnapshot`](crate::credential::AuthSnapshot) by
/// attempting one opportunistic renewal with ambient session evidence.
///
/// Runs before any request traffic exists, so it talks to the renewal
/// endpoint directly rather than through the coordinator's queue. A failed
/// attempt is the normal signed-out start, not an error. Navigation decisions
/// belong to the consumer: subscribe to the store's events or inspect the
/// returned outcome.
pub struct SessionBootstrapper {
    renewal: Arc<dyn RenewalClient>,
    store: Arc<CredentialStore>,
    remembered: Option<Arc<RememberedSession>>,
}

impl SessionBootstrapper {
    /// Create a bootstrapper over the renewal endpoint and store
    pub fn new(
        renewal: Arc<dyn RenewalClient>,
        store: Arc<CredentialStore>,
        remembered: Option<Arc<RememberedSession>>,
    ) -> Self {
        Self {
            renewal,
            store,
            remembered,
        }
    }

    /// Attempt to establish the initial session. Call once at startup.
    pub async fn bootstrap(&self) -> BootstrapOutcome {
        let hint = self
            .remembered
            .as_ref()
            .and_then(|remembered| remembered.identity_hint());

        debug!(has_hint = hint.is_some(), "attempting session bootstrap");

        match self.renewal.renew(hint.as_deref()).await {
            Ok(grant) => {
                info!(user = %grant.identity.id, "session restored at startup");
                self.store
                    .set(grant.credential, grant.identity.clone())
                    .await;
                BootstrapOutcome {
                    authenticated: true,
                    identity: Some(grant.identity),
                }
            }
            Err(err) => {
                // Expected on first run or after the server-side session
                // lapsed; start signed out.
                warn!(error = %err, "session bootstrap did not authenticate");
                BootstrapOutcome::unauthenticated()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::testing::MockRenewalClient;

    #[tokio::test]
    async fn successful_bootstrap_seeds_the_store() {
        let store = Arc::new(CredentialStore::new());
        let renewal = Arc::new(MockRenewalClient::new());
        renewal.succeed_with("tok-boot", "u1").await;

        let bootstrapper = SessionBootstrapper::new(
            Arc::clone(&renewal) as Arc<dyn RenewalClient>,
            Arc::clone(&store),
            None,
        );

        let outcome = bootstrapper.bootstrap().await;
        assert!(outcome.authenticated);
        assert_eq!(outcome.identity.unwrap().id, "u1");

        let snapshot = store.snapshot().await;
        assert!(snapshot.authenticated);
        assert!(snapshot.credential.is_some());
    }

    #[tokio::test]
    async fn failed_bootstrap_leaves_store_unauthenticated() {
        let store = Arc::new(CredentialStore::new());
        let renewal = Arc::new(MockRenewalClient::new());
        renewal.fail_with("no session cookie").await;

        let bootstrapper = SessionBootstrapper::new(
            Arc::clone(&renewal) as Arc<dyn RenewalClient>,
            Arc::clone(&store),
            None,
        );

        let outcome = bootstrapper.bootstrap().await;
        assert!(!outcome.authenticated);
        assert!(outcome.identity.is_none());
        assert!(!store.snapshot().await.authenticated);
    }
}
