//! Request dispatch with transparent renew-and-replay.
//!
//! Every outbound protected call goes through [`RequestDispatcher::execute`],
//! which attaches the current credential, classifies the response, and on a
//! 401 hands the call to the refresh coordinator instead of failing. The
//! retry-once marker lives on the captured call itself, so a request can
//! trigger at most one renewal no matter how the service behaves.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::http::{Disposition, HttpResponse, HttpTransport, RequestSpec};
use crate::refresh::RefreshCoordinator;
use crate::store::CredentialStore;

/// A request that failed authorization once, captured for replay.
///
/// Consumed exactly once: either replayed after a successful renewal or
/// rejected. The marker bounds renewal attempts to one per logical request.
#[derive(Debug)]
pub struct PendingCall {
    /// Correlation id for logs
    pub id: Uuid,
    /// The original request, replayed verbatim with a fresh credential
    pub spec: RequestSpec,
    retried: bool,
}

impl PendingCall {
    /// Capture a request for dispatch
    pub fn new(spec: RequestSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            retried: false,
        }
    }

    /// Whether this call has already consumed its one renewal attempt
    pub fn already_retried(&self) -> bool {
        self.retried
    }

    /// Consume the single renewal attempt
    fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// Issues protected calls with the current credential attached and recovers
/// from authorization failures through the refresh coordinator.
pub struct RequestDispatcher {
    transport: Arc<dyn HttpTransport>,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestDispatcher {
    /// Create a dispatcher over the given transport, store and coordinator
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
        }
    }

    /// Execute a request against the remote service.
    ///
    /// Attaches `Authorization: Bearer <credential>` when a credential is
    /// present. A 401 response triggers exactly one renewal via the
    /// coordinator and one replay with the fresh credential; a second 401
    /// surfaces immediately as [`AuthError::AuthorizationFailure`]. Non-auth
    /// error statuses and transport errors pass through without touching
    /// authentication state.
    pub async fn execute(&self, spec: RequestSpec) -> AuthResult<HttpResponse> {
        let mut call = PendingCall::new(spec);

        let credential = self.store.snapshot().await.credential;
        let response = self.transport.send(&call.spec, credential.as_ref()).await?;

        match response.disposition() {
            Disposition::Success => Ok(response),
            Disposition::OtherFailure => Err(Self::passthrough_error(&call, &response)),
            Disposition::AuthFailure => self.recover(&mut call, &response).await,
        }
    }

    /// Handle a 401 on a call that has not yet consumed its renewal attempt
    async fn recover(
        &self,
        call: &mut PendingCall,
        rejection: &HttpResponse,
    ) -> AuthResult<HttpResponse> {
        // Only reachable on the first rejection; replays are settled inline
        // below, but keep the guard in case a caller re-dispatches a call.
        if call.already_retried() {
            return Err(Self::authorization_error(call, rejection));
        }
        call.mark_retried();

        debug!(
            call = %call.id,
            path = %call.spec.path,
            "authorization failure, requesting credential renewal"
        );

        let fresh = match self.coordinator.renew().await {
            Ok(credential) => credential,
            Err(err) => {
                warn!(call = %call.id, error = %err, "renewal did not yield a credential, not replaying");
                return Err(Self::recovery_error(call, err));
            }
        };

        debug!(call = %call.id, "replaying request with renewed credential");
        let replay = self.transport.send(&call.spec, Some(&fresh)).await?;

        match replay.disposition() {
            Disposition::Success => Ok(replay),
            // Second rejection: the one renewal attempt is spent, stop here
            Disposition::AuthFailure => Err(Self::authorization_error(call, &replay)),
            Disposition::OtherFailure => Err(Self::passthrough_error(call, &replay)),
        }
    }

    /// Map a coordinator error onto the call it stranded.
    ///
    /// Sign-out supersession and coordinator plumbing faults pass through
    /// unchanged, so callers never mistake them for a terminal loss of the
    /// session. Only genuine renewal failures get the request context folded
    /// in.
    fn recovery_error(call: &PendingCall, err: AuthError) -> AuthError {
        match err {
            AuthError::RenewalSuperseded => AuthError::RenewalSuperseded,
            fault @ AuthError::Internal { .. } => fault,
            other => AuthError::renewal_failure(format!(
                "{} (while recovering {} {})",
                other, call.spec.method, call.spec.path
            )),
        }
    }

    fn authorization_error(call: &PendingCall, response: &HttpResponse) -> AuthError {
        AuthError::authorization_failure(
            response.status.as_u16(),
            format!("{} {}", call.spec.method, call.spec.path),
        )
    }

    fn passthrough_error(call: &PendingCall, response: &HttpResponse) -> AuthError {
        let mut context = format!("{} {}", call.spec.method, call.spec.path);
        if !response.body.is_empty() {
            let excerpt: String = response.body.chars().take(120).collect();
            context.push_str(": ");
            context.push_str(&excerpt);
        }
        AuthError::request_failed(response.status.as_u16(), context)
    }
}
