use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{watch, Mutex};

use super::{AuthError, AuthService};
use crate::model::SessionIdentity;

const UID_LENGTH: usize = 20;
const MIN_PASSWORD_LENGTH: usize = 6;

/// In-process auth service with an email/password directory, pre-issued
/// token redemption and anonymous sessions.
#[derive(Clone)]
pub struct MemoryAuth {
    inner: Arc<AuthState>,
}

struct AuthState {
    directory: Mutex<Directory>,
    session: watch::Sender<Option<SessionIdentity>>,
    rng: Mutex<StdRng>,
}

#[derive(Default)]
struct Directory {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, SessionIdentity>,
}

struct Account {
    uid: String,
    password: String,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic uids for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            inner: Arc::new(AuthState {
                directory: Mutex::new(Directory::default()),
                session,
                rng: Mutex::new(rng),
            }),
        }
    }

    /// Registers a token that redeems to a fresh non-anonymous identity.
    pub async fn issue_token(&self, token: impl Into<String>) -> SessionIdentity {
        let identity = SessionIdentity {
            uid: self.mint_uid().await,
            email: None,
            anonymous: false,
        };
        let mut directory = self.inner.directory.lock().await;
        directory.tokens.insert(token.into(), identity.clone());
        identity
    }

    async fn mint_uid(&self) -> String {
        let mut rng = self.inner.rng.lock().await;
        (0..UID_LENGTH)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect()
    }

    fn publish(&self, identity: SessionIdentity) -> SessionIdentity {
        self.inner.session.send_replace(Some(identity.clone()));
        identity
    }
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(AuthError::InvalidEmail),
    }
}

#[async_trait]
impl AuthService for MemoryAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SessionIdentity, AuthError> {
        validate_email(email)?;
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }

        let uid = self.mint_uid().await;
        {
            let mut directory = self.inner.directory.lock().await;
            if directory.accounts.contains_key(email) {
                return Err(AuthError::EmailAlreadyInUse);
            }
            directory.accounts.insert(
                email.to_string(),
                Account {
                    uid: uid.clone(),
                    password: password.to_string(),
                },
            );
        }

        Ok(self.publish(SessionIdentity {
            uid,
            email: Some(email.to_string()),
            anonymous: false,
        }))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionIdentity, AuthError> {
        validate_email(email)?;

        let uid = {
            let directory = self.inner.directory.lock().await;
            let account = directory
                .accounts
                .get(email)
                .ok_or(AuthError::UserNotFound)?;
            if account.password != password {
                return Err(AuthError::WrongPassword);
            }
            account.uid.clone()
        };

        Ok(self.publish(SessionIdentity {
            uid,
            email: Some(email.to_string()),
            anonymous: false,
        }))
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<SessionIdentity, AuthError> {
        let identity = {
            let directory = self.inner.directory.lock().await;
            directory
                .tokens
                .get(token)
                .cloned()
                .ok_or(AuthError::InvalidToken)?
        };
        Ok(self.publish(identity))
    }

    async fn sign_in_anonymously(&self) -> Result<SessionIdentity, AuthError> {
        let identity = SessionIdentity {
            uid: self.mint_uid().await,
            email: None,
            anonymous: true,
        };
        Ok(self.publish(identity))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.inner.session.send_replace(None);
        Ok(())
    }

    fn watch_session(&self) -> watch::Receiver<Option<SessionIdentity>> {
        self.inner.session.subscribe()
    }
}
