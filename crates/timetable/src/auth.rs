//! Typed sessions resolved once at the HTTP boundary.

use serde::{Deserialize, Serialize};

use crate::config::TokenConfig;

/// Role granted by a configured token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Starosta,
    Admin,
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Session {
    Guest,
    User { user_id: i64, name: String },
    /// Group representative; may act on behalf of their group
    Starosta {
        user_id: i64,
        name: String,
        group: Option<String>,
    },
    Admin { user_id: i64, name: String },
}

impl Session {
    pub fn is_admin(&self) -> bool {
        matches!(self, Session::Admin { .. })
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Session::Guest => None,
            Session::User { user_id, .. }
            | Session::Starosta { user_id, .. }
            | Session::Admin { user_id, .. } => Some(*user_id),
        }
    }
}

/// Resolves bearer tokens against the configured token list.
#[derive(Debug, Clone, Default)]
pub struct TokenIdentityProvider {
    tokens: Vec<TokenConfig>,
}

impl TokenIdentityProvider {
    pub fn new(tokens: Vec<TokenConfig>) -> Self {
        Self { tokens }
    }

    /// Maps an `Authorization` header value to a session. Anything that is
    /// not a known bearer token is a guest.
    pub fn resolve(&self, authorization: Option<&str>) -> Session {
        let Some(token) = authorization.and_then(|h| h.strip_prefix("Bearer ")) else {
            return Session::Guest;
        };
        let token = token.trim();

        match self.tokens.iter().find(|t| t.token == token) {
            Some(t) => match t.role {
                Role::User => Session::User {
                    user_id: t.user_id,
                    name: t.name.clone(),
                },
                Role::Starosta => Session::Starosta {
                    user_id: t.user_id,
                    name: t.name.clone(),
                    group: t.group.clone(),
                },
                Role::Admin => Session::Admin {
                    user_id: t.user_id,
                    name: t.name.clone(),
                },
            },
            None => Session::Guest,
        }
    }
}
