//! Auth form state: transient fields, the visible error string and the
//! submit path into the auth service.

use crate::auth::AuthService;
use crate::model::SessionIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    SignIn,
    SignUp,
}

/// Headless form model. A renderer owns one of these per auth screen and
/// feeds keystrokes into `email`/`password`.
#[derive(Debug, Clone)]
pub struct AuthForm {
    mode: AuthMode,
    pub email: String,
    pub password: String,
    error: Option<String>,
    busy: bool,
}

impl AuthForm {
    pub fn new() -> Self {
        Self {
            mode: AuthMode::SignIn,
            email: String::new(),
            password: String::new(),
            error: None,
            busy: false,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Switching between sign-in and sign-up clears the transient fields and
    /// any error. Re-selecting the current mode changes nothing.
    pub fn set_mode(&mut self, mode: AuthMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.email.clear();
        self.password.clear();
        self.error = None;
    }

    /// Sends the current credentials to the auth service. On failure the
    /// form keeps its fields, shows the display message and re-enables
    /// itself; there is no automatic retry.
    pub async fn submit(&mut self, auth: &dyn AuthService) -> Option<SessionIdentity> {
        self.busy = true;
        self.error = None;

        let result = match self.mode {
            AuthMode::SignIn => auth.sign_in(&self.email, &self.password).await,
            AuthMode::SignUp => auth.sign_up(&self.email, &self.password).await,
        };
        self.busy = false;

        match result {
            Ok(identity) => Some(identity),
            Err(err) => {
                self.error = Some(err.human_message().to_string());
                None
            }
        }
    }
}

impl Default for AuthForm {
    fn default() -> Self {
        Self::new()
    }
}
