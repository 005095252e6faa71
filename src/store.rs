use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::credential::{AuthEvent, AuthSnapshot, Credential, Identity};
use crate::events::{EventStream, Subscriber, EVENT_BUFFER_SIZE, EVENT_CAPACITY};

/// Mutable state behind the store's lock.
///
/// All fields move together; readers can never observe a half-updated state.
struct StoreInner {
    credential: Option<Credential>,
    authenticated: bool,
    identity: Option<Identity>,
    /// Bumped on every clear; renewal results from before a clear are stale
    epoch: u64,
}

/// Process-wide holder of the current access credential and authentication
/// flag.
///
/// Single-writer contract: writes come only from the refresh coordinator, the
/// session bootstrapper, and explicit sign-in/sign-out. Request dispatch only
/// reads. State transitions are published as [`AuthEvent`]s for navigation/UI
/// collaborators.
pub struct CredentialStore {
    inner: RwLock<StoreInner>,
    events: EventStream<AuthEvent>,
}

impl CredentialStore {
    /// Create an empty, unauthenticated store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                credential: None,
                authenticated: false,
                identity: None,
                epoch: 0,
            }),
            events: EventStream::new(EVENT_CAPACITY, EVENT_BUFFER_SIZE),
        }
    }

    /// Atomic snapshot of the current state
    pub async fn snapshot(&self) -> AuthSnapshot {
        let inner = self.inner.read().await;
        AuthSnapshot {
            credential: inner.credential.clone(),
            authenticated: inner.authenticated,
            identity: inner.identity.clone(),
            epoch: inner.epoch,
        }
    }

    /// Current sign-out epoch
    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// Atomically install a credential and identity, marking authenticated.
    ///
    /// Replaces any prior credential wholesale.
    pub async fn set(&self, credential: Credential, identity: Identity) {
        {
            let mut inner = self.inner.write().await;
            inner.credential = Some(credential);
            inner.identity = Some(identity.clone());
            inner.authenticated = true;
        }
        info!(user = %identity.id, "credential installed, session authenticated");
        self.events.publish(AuthEvent::established(identity)).await;
    }

    /// Install a credential only if no clear happened since `expected_epoch`
    /// was observed. Returns whether the write was applied.
    ///
    /// This is the guard that keeps a stale in-flight renewal success from
    /// resurrecting a session the user has since signed out of.
    pub async fn set_if_epoch(
        &self,
        credential: Credential,
        identity: Identity,
        expected_epoch: u64,
    ) -> bool {
        let applied = {
            let mut inner = self.inner.write().await;
            if inner.epoch != expected_epoch {
                false
            } else {
                inner.credential = Some(credential);
                inner.identity = Some(identity.clone());
                inner.authenticated = true;
                true
            }
        };

        if applied {
            info!(user = %identity.id, "renewed credential installed");
            self.events.publish(AuthEvent::established(identity)).await;
        } else {
            debug!(
                expected_epoch,
                "renewal result discarded, sign-out epoch moved"
            );
        }
        applied
    }

    /// Atomically discard credential and identity and mark unauthenticated.
    ///
    /// Always bumps the epoch, so any renewal started before this call can no
    /// longer apply its result.
    pub async fn clear(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.credential = None;
            inner.identity = None;
            inner.authenticated = false;
            inner.epoch += 1;
        }
        info!("session cleared");
        self.events.publish(AuthEvent::cleared()).await;
    }

    /// Subscribe to authentication state events
    pub fn subscribe(&self) -> Subscriber<AuthEvent> {
        self.events.subscribe()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
