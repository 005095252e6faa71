//! authrelay: a client-side HTTP request layer that transparently manages a
//! short-lived access credential.
//!
//! The layer attaches the current credential to outgoing requests, detects
//! authorization failures, and recovers by performing a single coordinated
//! credential-renewal exchange shared by every request that failed
//! concurrently, then replays those requests. Collaborators that only consume
//! its outputs (live message transport, chat persistence, views) stay
//! outside; they get a valid credential and authentication events.
//!
//! Typical wiring:
//!
//! ```no_run
//! use authrelay::{ApiConfig, AuthLayer, RequestSpec};
//!
//! # async fn run() -> authrelay::AuthResult<()> {
//! let layer = AuthLayer::new(ApiConfig::from_env().unwrap())?;
//!
//! // Decide the initial authentication state once at startup
//! let outcome = layer.bootstrap().await;
//! println!("signed in: {}", outcome.authenticated);
//!
//! // Every protected call goes through the dispatcher; a 401 triggers one
//! // shared renewal and a replay, invisibly to this call site.
//! let response = layer.execute(RequestSpec::get("/chats")).await?;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub mod bootstrap;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod http;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod store;

#[cfg(test)]
mod tests;

pub use bootstrap::{BootstrapOutcome, SessionBootstrapper};
pub use config::ApiConfig;
pub use credential::{AuthEvent, AuthSnapshot, Credential, Identity, PresenceStatus};
pub use dispatch::{PendingCall, RequestDispatcher};
pub use error::{AuthError, AuthResult};
pub use events::{EventStream, Subscriber};
pub use http::{Disposition, HttpResponse, HttpTransport, RequestSpec, ReqwestTransport};
pub use refresh::{HttpRenewalClient, RefreshCoordinator, RenewalClient, RenewalGrant};
pub use session::SessionClient;
pub use storage::RememberedSession;
pub use store::CredentialStore;

/// Fully wired authorization layer.
///
/// Owns one `reqwest` client (cookie store enabled) shared by the transport,
/// the renewal endpoint and sign-in, so the server-held session cookie set at
/// sign-in is the ambient evidence every later renewal rides on.
pub struct AuthLayer {
    store: Arc<CredentialStore>,
    dispatcher: Arc<RequestDispatcher>,
    bootstrapper: SessionBootstrapper,
    session: SessionClient,
}

impl AuthLayer {
    /// Wire up the layer from a config
    pub fn new(config: ApiConfig) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()
            .map_err(|e| AuthError::transport(format!("failed to build HTTP client: {}", e)))?;

        let store = Arc::new(CredentialStore::new());
        let remembered = config
            .data_dir
            .as_ref()
            .map(|dir| Arc::new(RememberedSession::new(dir)));

        let renewal: Arc<dyn RenewalClient> =
            Arc::new(HttpRenewalClient::new(client.clone(), &config));
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&renewal),
        ));
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::with_client(client.clone(), &config));
        let dispatcher = Arc::new(RequestDispatcher::new(
            transport,
            Arc::clone(&store),
            coordinator,
        ));
        let bootstrapper = SessionBootstrapper::new(
            renewal,
            Arc::clone(&store),
            remembered.clone(),
        );
        let session = SessionClient::new(client, &config, Arc::clone(&store), remembered);

        Ok(Self {
            store,
            dispatcher,
            bootstrapper,
            session,
        })
    }

    /// Decide the initial authentication state. Call once at startup.
    pub async fn bootstrap(&self) -> BootstrapOutcome {
        self.bootstrapper.bootstrap().await
    }

    /// Execute a protected request with renew-and-replay handling
    pub async fn execute(&self, spec: RequestSpec) -> AuthResult<HttpResponse> {
        self.dispatcher.execute(spec).await
    }

    /// The request dispatcher, for collaborators that hold their own handle
    pub fn dispatcher(&self) -> Arc<RequestDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Atomic snapshot of the current authentication state
    pub async fn snapshot(&self) -> AuthSnapshot {
        self.store.snapshot().await
    }

    /// Subscribe to authentication state events
    pub fn subscribe(&self) -> Subscriber<AuthEvent> {
        self.store.subscribe()
    }

    /// Sign in with account credentials
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        self.session.sign_in(email, password).await
    }

    /// Register a new account; a success is also the first sign-in
    pub async fn register(&self, name: &str, email: &str, password: &str) -> AuthResult<Identity> {
        self.session.register(name, email, password).await
    }

    /// Sign out unconditionally; wins over any in-flight renewal
    pub async fn sign_out(&self) {
        self.session.sign_out().await
    }
}
