//! Polygon WebSocket Authentication
//!
//! # Authentication Flow
//!
//! 1. Connect to the channel endpoint
//! 2. Send `{"action":"auth","params":"<key>"}` immediately
//! 3. Receive `{"ev":"status","status":"auth_success"}` or `auth_failed`
//!
//! When no acknowledgement arrives within the auth timeout the session is
//! treated as live but unconfirmed; some clusters never acknowledge.

use std::time::Duration;

use thiserror::Error;

use super::messages::{ControlRequest, StatusKind, StatusMessage};

// =============================================================================
// Constants
// =============================================================================

/// Default wait for an auth acknowledgement.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The vendor rejected the key.
    #[error("authentication failed: {0}")]
    Rejected(String),

    /// A credential was empty.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

// =============================================================================
// Authentication State
// =============================================================================

/// Current state of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No auth request sent on this socket.
    #[default]
    Idle,
    /// Auth request sent, awaiting acknowledgement.
    Pending,
    /// Vendor acknowledged the key.
    Authenticated,
    /// No acknowledgement before the deadline; streaming anyway.
    Unconfirmed,
    /// Vendor rejected the key.
    Failed,
}

impl AuthState {
    /// Whether the session may stream.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Authenticated | Self::Unconfirmed)
    }
}

/// Result of feeding a status message to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProgress {
    /// The acknowledgement arrived; the session is authenticated.
    Authenticated,
    /// Status unrelated to authentication.
    Unchanged,
}

// =============================================================================
// Credentials
// =============================================================================

/// Vendor API key.
///
/// `Debug` and `Display` redact the key for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or whitespace.
    pub fn new(api_key: impl Into<String>) -> Result<Self, AuthError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AuthError::InvalidCredential(
                "API key cannot be empty".to_string(),
            ));
        }
        Ok(Self { api_key })
    }

    /// The raw API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Auth request carrying this key.
    #[must_use]
    pub fn to_auth_request(&self) -> ControlRequest {
        ControlRequest::auth(&self.api_key)
    }

    fn redacted(&self) -> String {
        let visible: String = self.api_key.chars().take(4).collect();
        format!("{visible}…")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Display for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials(key={})", self.redacted())
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Authentication state machine for one socket.
///
/// # Example
///
/// ```rust
/// use market_stream_ingest::infrastructure::polygon::auth::{AuthHandler, AuthProgress, Credentials};
/// use market_stream_ingest::infrastructure::polygon::messages::StatusMessage;
///
/// let mut handler = AuthHandler::new(Credentials::new("key").unwrap());
/// let _request = handler.begin();
///
/// let ack = StatusMessage { status: "auth_success".into(), message: String::new() };
/// assert_eq!(handler.on_status(&ack), Ok(AuthProgress::Authenticated));
/// assert!(handler.state().is_live());
/// ```
#[derive(Debug)]
pub struct AuthHandler {
    credentials: Credentials,
    state: AuthState,
}

impl AuthHandler {
    /// Create a handler.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Start authentication, returning the request to send.
    #[must_use]
    pub fn begin(&mut self) -> ControlRequest {
        self.state = AuthState::Pending;
        self.credentials.to_auth_request()
    }

    /// Feed a status message.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Rejected` on `auth_failed`.
    pub fn on_status(&mut self, status: &StatusMessage) -> Result<AuthProgress, AuthError> {
        match status.kind() {
            StatusKind::AuthSuccess => {
                self.state = AuthState::Authenticated;
                Ok(AuthProgress::Authenticated)
            }
            StatusKind::AuthFailed => {
                self.state = AuthState::Failed;
                Err(AuthError::Rejected(status.message.clone()))
            }
            StatusKind::Connected | StatusKind::Success | StatusKind::Other => {
                Ok(AuthProgress::Unchanged)
            }
        }
    }

    /// The acknowledgement deadline passed.
    ///
    /// Only a pending handler moves to `Unconfirmed`.
    pub fn on_timeout(&mut self) {
        if self.state == AuthState::Pending {
            self.state = AuthState::Unconfirmed;
        }
    }

    /// Back to idle, for a fresh socket.
    pub const fn reset(&mut self) {
        self.state = AuthState::Idle;
    }
}
