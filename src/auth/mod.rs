//! Session management seam and the error taxonomy surfaced to the auth form.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::model::SessionIdentity;

/// Shown when an auth failure carries no displayable message of its own.
pub const FALLBACK_AUTH_MESSAGE: &str = "An unknown error occurred during authentication.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid email address (auth/invalid-email)")]
    InvalidEmail,
    #[error("no account found for that email (auth/user-not-found)")]
    UserNotFound,
    #[error("incorrect password (auth/wrong-password)")]
    WrongPassword,
    #[error("an account already exists for that email (auth/email-already-in-use)")]
    EmailAlreadyInUse,
    #[error("password should be at least 6 characters (auth/weak-password)")]
    WeakPassword,
    #[error("the supplied sign-in token is not valid (auth/invalid-custom-token)")]
    InvalidToken,
    #[error("internal auth failure: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code, in the vendor's `auth/<reason>` shape.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail => "auth/invalid-email",
            AuthError::UserNotFound => "auth/user-not-found",
            AuthError::WrongPassword => "auth/wrong-password",
            AuthError::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthError::WeakPassword => "auth/weak-password",
            AuthError::InvalidToken => "auth/invalid-custom-token",
            AuthError::Internal(_) => "auth/internal-error",
        }
    }

    /// Message fit for the form, with codes and vendor prefixes already
    /// stripped. Internal failures collapse to the fixed fallback text.
    pub fn human_message(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail => "Invalid email address.",
            AuthError::UserNotFound => "No account found for that email.",
            AuthError::WrongPassword => "Incorrect password.",
            AuthError::EmailAlreadyInUse => "An account already exists for that email.",
            AuthError::WeakPassword => "Password should be at least 6 characters.",
            AuthError::InvalidToken => "The supplied sign-in token is not valid.",
            AuthError::Internal(_) => FALLBACK_AUTH_MESSAGE,
        }
    }
}

/// Session provider. All sign-in variants publish the resulting identity on
/// the session watch before returning.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SessionIdentity, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionIdentity, AuthError>;

    /// Redeems a pre-issued token, as used by the hosted bootstrap path.
    async fn sign_in_with_token(&self, token: &str) -> Result<SessionIdentity, AuthError>;

    async fn sign_in_anonymously(&self) -> Result<SessionIdentity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Current session plus every later transition. Yields `None` while
    /// signed out, mirroring the upstream auth-state callback.
    fn watch_session(&self) -> watch::Receiver<Option<SessionIdentity>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_vendor_shape() {
        assert_eq!(AuthError::InvalidEmail.code(), "auth/invalid-email");
        assert_eq!(AuthError::WeakPassword.code(), "auth/weak-password");
        assert_eq!(
            AuthError::Internal("boom".to_string()).code(),
            "auth/internal-error"
        );
    }

    #[test]
    fn human_messages_carry_no_codes() {
        for error in [
            AuthError::InvalidEmail,
            AuthError::UserNotFound,
            AuthError::WrongPassword,
            AuthError::EmailAlreadyInUse,
            AuthError::WeakPassword,
            AuthError::InvalidToken,
        ] {
            let message = error.human_message();
            assert!(!message.contains("auth/"), "{message}");
            assert!(!message.is_empty());
        }
    }

    #[test]
    fn internal_errors_fall_back_to_the_fixed_message() {
        let error = AuthError::Internal("backend exploded".to_string());
        assert_eq!(error.human_message(), FALLBACK_AUTH_MESSAGE);
    }
}
