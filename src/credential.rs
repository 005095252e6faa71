use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An opaque bearer token for the remote service.
///
/// Expiry is not locally known; validity is only ever discovered through a
/// server rejection. Credentials are replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw bearer token string
    pub fn new(token: impl Into<String>) -> Self {
        Credential(token.into())
    }

    /// The raw token value, as it goes into the Authorization header
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the Authorization header value for this credential
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

/// Presence status reported by the service for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

/// The authenticated user as reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Service-assigned user id
    pub id: String,
    /// Display name
    pub name: String,
    /// Account email, also usable as a bootstrap hint
    pub email: String,
    /// Presence status (plain data here, no behavior attached)
    #[serde(default = "default_status")]
    pub status: PresenceStatus,
    /// Optional avatar image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

fn default_status() -> PresenceStatus {
    PresenceStatus::Offline
}

/// An atomic view of the credential store.
///
/// Invariant: `authenticated == true` implies `credential` is present.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    /// Current access credential, if any
    pub credential: Option<Credential>,
    /// Whether the layer currently considers the user signed in
    pub authenticated: bool,
    /// Identity associated with the credential
    pub identity: Option<Identity>,
    /// Sign-out epoch at the time of the snapshot; bumped by every `clear()`
    pub epoch: u64,
}

impl AuthSnapshot {
    /// An empty, unauthenticated snapshot at epoch zero
    pub fn unauthenticated() -> Self {
        Self {
            credential: None,
            authenticated: false,
            identity: None,
            epoch: 0,
        }
    }
}

/// Events raised to the surrounding application.
///
/// Consumed by navigation/UI collaborators; nothing in this crate acts on
/// them beyond publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthEvent {
    /// A valid credential and identity are now in place
    AuthenticationEstablished {
        /// Who was authenticated
        identity: Identity,
        /// When the state transition happened
        timestamp: DateTime<Utc>,
    },

    /// The session was cleared, by sign-out or terminal renewal failure
    AuthenticationCleared {
        /// When the state transition happened
        timestamp: DateTime<Utc>,
    },
}

impl AuthEvent {
    /// Event for a newly established session
    pub fn established(identity: Identity) -> Self {
        AuthEvent::AuthenticationEstablished {
            identity,
            timestamp: Utc::now(),
        }
    }

    /// Event for a cleared session
    pub fn cleared() -> Self {
        AuthEvent::AuthenticationCleared {
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_formats_token() {
        let credential = Credential::new("abc123");
        assert_eq!(credential.bearer_header(), "Bearer abc123");
        assert_eq!(credential.as_str(), "abc123");
    }

    #[test]
    fn identity_deserializes_without_optional_fields() {
        let identity: Identity = serde_json::from_str(
            r#"{"id":"u1","name":"Ada","email":"ada@example.com"}"#,
        )
        .unwrap();

        assert_eq!(identity.status, PresenceStatus::Offline);
        assert!(identity.avatar_url.is_none());
    }

    #[test]
    fn unauthenticated_snapshot_holds_invariant() {
        let snapshot = AuthSnapshot::unauthenticated();
        assert!(!snapshot.authenticated);
        assert!(snapshot.credential.is_none());
        assert_eq!(snapshot.epoch, 0);
    }
}
