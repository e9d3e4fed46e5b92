//! Credential provider port
//!
//! Token acquisition and storage live outside the engine. The engine asks
//! for the current token on every request so a rotated token takes effect
//! immediately.

use std::sync::RwLock;

/// Supplies the bearer token for outbound requests
pub trait ICredentialProvider: Send + Sync {
    /// The current bearer token, or `None` when no user is signed in
    fn current_token(&self) -> Option<String>;
}

/// In-memory credential provider whose token can be replaced at runtime
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    /// Replace (or clear) the token
    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }
}

impl ICredentialProvider for StaticCredentials {
    fn current_token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
