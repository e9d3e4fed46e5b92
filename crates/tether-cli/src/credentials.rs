//! Bearer token lookup for the CLI
//!
//! Token acquisition (login flows) is handled by other tooling; the CLI only
//! reads whatever token is current. The source is consulted on every
//! request, so rewriting the token file rotates credentials for a running
//! agent without a restart.

use std::path::PathBuf;

use tracing::warn;

use tether_core::config::AuthConfig;
use tether_core::ports::ICredentialProvider;

/// Reads the token from a file, or from an environment variable
#[derive(Debug, Clone)]
pub struct TokenFileCredentials {
    token_file: Option<PathBuf>,
    token_env: String,
}

impl TokenFileCredentials {
    pub fn new(token_file: Option<PathBuf>, token_env: impl Into<String>) -> Self {
        Self {
            token_file,
            token_env: token_env.into(),
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(auth.token_file.clone(), auth.token_env.clone())
    }

    /// Where the token is read from, for display
    pub fn source(&self) -> String {
        match &self.token_file {
            Some(path) => format!("file {}", path.display()),
            None => format!("${}", self.token_env),
        }
    }
}

fn non_empty(raw: String) -> Option<String> {
    let token = raw.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl ICredentialProvider for TokenFileCredentials {
    fn current_token(&self) -> Option<String> {
        match &self.token_file {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(raw) => non_empty(raw),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read token file");
                    None
                }
            },
            None => std::env::var(&self.token_env).ok().and_then(non_empty),
        }
    }
}
