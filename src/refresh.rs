//! Single-flight credential renewal.
//!
//! Arbitrarily many requests can observe a 401 while one renewal is already in
//! flight; everyone queues on the same exchange and is resolved with its
//! outcome. The exchange itself runs in a spawned task so an abandoned caller
//! can never cancel a renewal other callers are waiting on.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::ApiConfig;
use crate::credential::{Credential, Identity};
use crate::error::{AuthError, AuthResult};
use crate::http::HttpResponse;
use crate::store::CredentialStore;

/// Wire shape of a successful renewal or sign-in response
#[derive(Debug, Clone, Deserialize)]
struct SessionResponse {
    token: String,
    user: Identity,
}

/// A fresh credential and the identity it belongs to
#[derive(Debug, Clone)]
pub struct RenewalGrant {
    pub credential: Credential,
    pub identity: Identity,
}

impl RenewalGrant {
    /// Parse a grant out of a `{token, user}` JSON body
    pub fn from_json(body: &str, context: &str) -> AuthResult<Self> {
        let parsed: SessionResponse = serde_json::from_str(body)
            .map_err(|_| AuthError::invalid_response(context.to_string()))?;
        Ok(Self {
            credential: Credential::new(parsed.token),
            identity: parsed.user,
        })
    }

    /// Parse a grant out of a `{token, user}` response
    pub fn from_response(response: &HttpResponse, context: &str) -> AuthResult<Self> {
        Self::from_json(&response.body, context)
    }
}

/// Contract of the credential renewal endpoint.
///
/// A renewal call carries ambient session evidence (the cookie jar of the
/// underlying client), never the expired credential. The optional identity
/// hint is only used by session bootstrap.
#[async_trait]
pub trait RenewalClient: Send + Sync {
    /// Perform one renewal exchange
    async fn renew(&self, identity_hint: Option<&str>) -> AuthResult<RenewalGrant>;
}

/// Renewal client against the dedicated HTTP renewal endpoint
pub struct HttpRenewalClient {
    client: reqwest::Client,
    renewal_url: String,
}

impl HttpRenewalClient {
    /// Build a renewal client around an existing `reqwest` client.
    ///
    /// The client must have its cookie store enabled and be the same one the
    /// sign-in call went through, otherwise the session cookie the server set
    /// at sign-in is not available as ambient evidence.
    pub fn new(client: reqwest::Client, config: &ApiConfig) -> Self {
        Self {
            client,
            renewal_url: config.url_for(&config.renewal_path),
        }
    }
}

#[async_trait]
impl RenewalClient for HttpRenewalClient {
    async fn renew(&self, identity_hint: Option<&str>) -> AuthResult<RenewalGrant> {
        let mut builder = self.client.post(&self.renewal_url);
        if let Some(hint) = identity_hint {
            builder = builder.query(&[("identity_hint", hint)]);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::renewal_failure(format!("renewal transport error: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(status = %status, "renewal endpoint rejected session evidence");
            return Err(AuthError::renewal_failure(format!(
                "renewal rejected with status {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(AuthError::renewal_failure(format!(
                "renewal endpoint returned status {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::renewal_failure(format!("renewal body unreadable: {}", e)))?;
        let grant = RenewalGrant::from_json(&body, "renewal endpoint")?;

        debug!(user = %grant.identity.id, "renewal exchange succeeded");
        Ok(grant)
    }
}

/// One queued caller, resolved with the exchange outcome
type RefreshWaiter = oneshot::Sender<AuthResult<Credential>>;

/// Compound coordinator state.
///
/// The flag and the queue live behind one mutex and are only ever updated
/// together, so no caller can observe `refreshing` set without the queue or
/// the other way round.
struct CoordinatorInner {
    refreshing: bool,
    waiters: Vec<RefreshWaiter>,
}

/// Serializes credential renewal: at most one exchange in flight, every
/// concurrent caller queued on it and resolved with its outcome.
///
/// State machine: `Idle -> Refreshing -> Idle`. The queue is drained only by
/// the exchange task; when the state returns to idle no waiter is left
/// unresolved.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    renewal: Arc<dyn RenewalClient>,
    inner: Arc<Mutex<CoordinatorInner>>,
}

impl RefreshCoordinator {
    /// Create a coordinator over the given store and renewal client
    pub fn new(store: Arc<CredentialStore>, renewal: Arc<dyn RenewalClient>) -> Self {
        Self {
            store,
            renewal,
            inner: Arc::new(Mutex::new(CoordinatorInner {
                refreshing: false,
                waiters: Vec::new(),
            })),
        }
    }

    /// Request a renewed credential.
    ///
    /// Joins the in-flight exchange when one exists, otherwise starts one.
    /// Resolves strictly after the exchange settles, with its outcome:
    /// the fresh credential, or the terminal error shared by every waiter.
    pub async fn renew(&self) -> AuthResult<Credential> {
        let (tx, rx) = oneshot::channel();

        let start_epoch = {
            let mut inner = self.inner.lock().await;
            inner.waiters.push(tx);
            if inner.refreshing {
                debug!(
                    queued = inner.waiters.len(),
                    "joining in-flight renewal exchange"
                );
                None
            } else {
                // Pin the sign-out epoch before the transition to refreshing
                // is visible anywhere; a clear() landing any time after this
                // read invalidates the exchange result, even one that slips
                // in before the exchange task gets its first poll.
                let epoch = self.store.epoch().await;
                inner.refreshing = true;
                Some(epoch)
            }
        };

        if let Some(epoch) = start_epoch {
            info!("starting credential renewal exchange");
            let store = Arc::clone(&self.store);
            let renewal = Arc::clone(&self.renewal);
            let inner = Arc::clone(&self.inner);
            // Detached so the exchange survives the initiating caller
            tokio::spawn(async move {
                Self::run_exchange(store, renewal, inner, epoch).await;
            });
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AuthError::internal("renewal waiter dropped unresolved")),
        }
    }

    /// Perform one exchange and fan its outcome out to every queued waiter.
    ///
    /// `epoch` is the sign-out epoch observed when the exchange was started;
    /// a clear() since then makes the result stale.
    async fn run_exchange(
        store: Arc<CredentialStore>,
        renewal: Arc<dyn RenewalClient>,
        inner: Arc<Mutex<CoordinatorInner>>,
        epoch: u64,
    ) {
        let outcome: AuthResult<Credential> = match renewal.renew(None).await {
            Ok(grant) => {
                let applied = store
                    .set_if_epoch(grant.credential.clone(), grant.identity, epoch)
                    .await;
                if applied {
                    Ok(grant.credential)
                } else {
                    // Sign-out won the race; the cleared session stays cleared
                    warn!("renewal succeeded but session was cleared meanwhile");
                    Err(AuthError::RenewalSuperseded)
                }
            }
            Err(err) => {
                error!(error = %err, "renewal exchange failed, clearing session");
                store.clear().await;
                Err(match err {
                    e @ AuthError::RenewalFailure { .. } => e,
                    other => AuthError::renewal_failure(other.to_string()),
                })
            }
        };

        let waiters = {
            let mut inner = inner.lock().await;
            inner.refreshing = false;
            std::mem::take(&mut inner.waiters)
        };

        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "settling renewal waiters");
        for waiter in waiters {
            // A waiter whose caller went away is fine to miss
            let _ = waiter.send(outcome.clone());
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_exchange() {
        let store = Arc::new(CredentialStore::new());
        let renewal = Arc::new(MockRenewalClient::new().with_delay(Duration::from_millis(50)));
        renewal.succeed_with("tok-fresh", "u1").await;

        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&renewal) as Arc<dyn RenewalClient>,
        ));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let coordinator = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move { coordinator.renew().await }));
        }

        for handle in handles {
            let credential = handle.await.unwrap().unwrap();
            assert_eq!(credential, Credential::new("tok-fresh"));
        }

        // Exactly one exchange for all five callers
        assert_eq!(renewal.call_count(), 1);
        let snapshot = store.snapshot().await;
        assert!(snapshot.authenticated);
        assert_eq!(snapshot.credential, Some(Credential::new("tok-fresh")));
    }

    #[tokio::test]
    async fn failed_exchange_clears_store_and_fails_all_waiters() {
        let store = Arc::new(CredentialStore::new());
        store
            .set(Credential::new("tok-old"), test_identity("u1"))
            .await;

        let renewal = Arc::new(MockRenewalClient::new().with_delay(Duration::from_millis(30)));
        renewal.fail_with("session evidence rejected").await;

        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&renewal) as Arc<dyn RenewalClient>,
        ));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let coordinator = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move { coordinator.renew().await }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, AuthError::RenewalFailure { .. }));
        }

        assert_eq!(renewal.call_count(), 1);
        let snapshot = store.snapshot().await;
        assert!(!snapshot.authenticated);
        assert!(snapshot.credential.is_none());
    }

    #[tokio::test]
    async fn sign_out_during_exchange_wins_over_late_success() {
        let store = Arc::new(CredentialStore::new());
        store
            .set(Credential::new("tok-old"), test_identity("u1"))
            .await;

        let renewal = Arc::new(MockRenewalClient::new().with_delay(Duration::from_millis(80)));
        renewal.succeed_with("tok-late", "u1").await;

        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&renewal) as Arc<dyn RenewalClient>,
        ));

        let renew_handle = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.renew().await })
        };

        // Let the exchange start, then sign out underneath it
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.clear().await;

        let err = renew_handle.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthError::RenewalSuperseded));

        // The late success must not resurrect the cleared session
        let snapshot = store.snapshot().await;
        assert!(!snapshot.authenticated);
        assert!(snapshot.credential.is_none());
    }

    /// A sign-out can land after the coordinator has committed to an exchange
    /// but before the spawned exchange task ever runs. The single-worker
    /// runtime forces exactly that interleaving: the clear is queued ahead of
    /// the exchange task, so it executes between the refreshing transition
    /// and the exchange's first poll. The late success must still be
    /// discarded.
    #[tokio::test(flavor = "current_thread")]
    async fn sign_out_queued_before_exchange_first_poll_is_honored() {
        let store = Arc::new(CredentialStore::new());
        store
            .set(Credential::new("tok-old"), test_identity("u1"))
            .await;

        let renewal = Arc::new(MockRenewalClient::new());
        renewal.succeed_with("tok-late", "u1").await;

        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&renewal) as Arc<dyn RenewalClient>,
        );

        let clearer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.clear().await })
        };

        let err = coordinator.renew().await.unwrap_err();
        clearer.await.unwrap();
        assert!(matches!(err, AuthError::RenewalSuperseded));

        // The cleared session stays cleared
        let snapshot = store.snapshot().await;
        assert!(!snapshot.authenticated);
        assert!(snapshot.credential.is_none());
    }

    #[tokio::test]
    async fn coordinator_is_reusable_after_settling() {
        let store = Arc::new(CredentialStore::new());
        let renewal = Arc::new(MockRenewalClient::new());
        renewal.fail_with("first attempt rejected").await;
        renewal.succeed_with("tok-second", "u2").await;

        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&renewal) as Arc<dyn RenewalClient>,
        );

        assert!(coordinator.renew().await.is_err());
        let credential = coordinator.renew().await.unwrap();
        assert_eq!(credential, Credential::new("tok-second"));
        assert_eq!(renewal.call_count(), 2);
    }
}
