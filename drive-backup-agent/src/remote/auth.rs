//! Bearer tokens for the Drive API.
//!
//! A service account key is the normal source: `gcp_auth` signs the JWT
//! grant, caches the access token and mints a new one once it expires, so a
//! long pass never outlives its credentials. A fixed token can still be
//! supplied for short manual runs.

use crate::utils::{AgentError, Result};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Full Drive scope; pruning deletes files created by earlier passes.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

#[derive(Clone)]
pub enum Credentials {
    /// Token obtained outside the agent, used as-is
    Static(String),
    /// Service account key, optionally impersonating a user
    ServiceAccount(Arc<CustomServiceAccount>),
}

impl Credentials {
    /// Load a service account key file. With `subject` set, tokens are issued
    /// on behalf of that user through domain-wide delegation.
    pub fn service_account(key_file: &Path, subject: Option<&str>) -> Result<Self> {
        let account = CustomServiceAccount::from_file(key_file)
            .map_err(|e| AgentError::Auth(format!("{}: {}", key_file.display(), e)))?;

        let account = match subject {
            Some(subject) => {
                info!(subject = %subject, "Impersonating user");
                account.with_subject(subject.to_string())
            }
            None => account,
        };

        Ok(Self::ServiceAccount(Arc::new(account)))
    }

    /// Current bearer token, refreshed first when the cached one expired.
    pub async fn bearer(&self) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ServiceAccount(account) => {
                let token = account
                    .token(&[DRIVE_SCOPE])
                    .await
                    .map_err(|e| AgentError::Auth(e.to_string()))?;
                Ok(token.as_str().to_string())
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Credentials::Static(<redacted>)"),
            Self::ServiceAccount(_) => f.write_str("Credentials::ServiceAccount"),
        }
    }
}
