//! Storage-credential checks.
//!
//! Acquiring and refreshing credentials happens elsewhere; the pipeline only
//! asks whether a user currently has usable ones.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::error::AuthError;
use crate::job::UserId;

/// Source of truth for who may store media.
pub trait CredentialStore: Send + Sync {
    /// Fails if `user` has no credentials or they have expired.
    fn check(&self, user: UserId) -> Result<(), AuthError>;

    /// Operators may cancel any user's job.
    fn is_operator(&self, user: UserId) -> bool;
}

/// A stored credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory credential registry.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    users: RwLock<HashMap<UserId, Credential>>,
    operators: HashSet<UserId>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operator(mut self, user: UserId) -> Self {
        self.operators.insert(user);
        self
    }

    pub fn grant(&self, user: UserId, credential: Credential) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user, credential);
    }

    /// Returns whether the user had credentials.
    pub fn revoke(&self, user: UserId) -> bool {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user)
            .is_some()
    }
}

impl CredentialStore for StaticCredentials {
    fn check(&self, user: UserId) -> Result<(), AuthError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        match users.get(&user) {
            None => Err(AuthError::NotAuthorized(user)),
            Some(c) if c.is_expired(Utc::now()) => Err(AuthError::CredentialsExpired(user)),
            Some(_) => Ok(()),
        }
    }

    fn is_operator(&self, user: UserId) -> bool {
        self.operators.contains(&user)
    }
}
