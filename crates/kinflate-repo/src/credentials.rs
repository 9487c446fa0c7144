//! Repository credentials
//!
//! Credentials are stored per repository and only ever sent to the origin of
//! the repository they belong to; redirects to another origin drop them.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RepoError, Result};

/// Credentials as persisted in `repositories.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    /// Basic authentication (username/password)
    Basic { username: String, password: String },

    /// Bearer token authentication
    Bearer { token: String },

    /// Basic authentication read from environment variables (CI/CD friendly)
    #[serde(rename_all = "camelCase")]
    Env {
        username_var: String,
        password_var: String,
    },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer {
            token: token.into(),
        }
    }

    /// Resolve to actual values
    pub fn resolve(&self) -> Result<ResolvedCredentials> {
        match self {
            Credentials::Basic { username, password } => Ok(ResolvedCredentials::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            Credentials::Bearer { token } => Ok(ResolvedCredentials::Bearer {
                token: token.clone(),
            }),
            Credentials::Env {
                username_var,
                password_var,
            } => {
                let var = |name: &str| {
                    std::env::var(name).map_err(|_| RepoError::AuthFailed {
                        message: format!("environment variable {} not set", name),
                    })
                };
                Ok(ResolvedCredentials::Basic {
                    username: var(username_var)?,
                    password: var(password_var)?,
                })
            }
        }
    }
}

/// Resolved credentials ready for use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl ResolvedCredentials {
    /// `Authorization` header value
    pub fn auth_header(&self) -> String {
        match self {
            ResolvedCredentials::Basic { username, password } => {
                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{}:{}", username, password),
                );
                format!("Basic {}", encoded)
            }
            ResolvedCredentials::Bearer { token } => format!("Bearer {}", token),
        }
    }
}

/// Check if two URLs are same-origin (scheme, host and port)
pub fn same_origin(url1: &str, url2: &str) -> bool {
    match (Url::parse(url1), Url::parse(url2)) {
        (Ok(u1), Ok(u2)) => {
            u1.scheme() == u2.scheme()
                && u1.host() == u2.host()
                && u1.port_or_known_default() == u2.port_or_known_default()
        }
        _ => false,
    }
}
