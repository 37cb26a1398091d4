//! The control-plane seam every database host implements.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Username/password pair. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A privilege level bound to a single database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

/// A user creation request.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub credential: Credential,
    pub roles: Vec<RoleGrant>,
    /// SCRAM mechanisms; empty means the server default.
    pub mechanisms: Vec<String>,
}

/// What the host reports about an existing user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub user: String,
    pub db: String,
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
}

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("user '{user}' already exists in database '{database}'")]
    UserExists { user: String, database: String },

    #[error("collection '{database}.{collection}' already exists")]
    CollectionExists {
        database: String,
        collection: String,
    },

    #[error("authentication failed for '{user}' against database '{database}': {reason}")]
    AuthenticationFailed {
        user: String,
        database: String,
        reason: String,
    },

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("database host unavailable: {0}")]
    Unavailable(String),

    #[error("command failed with code {code}: {message}")]
    Command { code: i32, message: String },

    #[error("{0}")]
    Other(String),
}

pub type AdminResult<T> = Result<T, AdminError>;

/// Administrative operations against a document database host.
///
/// Implementations hold a single session. `authenticate` changes the principal
/// used by every later call on the same value.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Round-trip to the host without touching any database.
    async fn ping(&self) -> AdminResult<()>;

    /// Authenticate as `credential` against `database`.
    async fn authenticate(&self, database: &str, credential: &Credential) -> AdminResult<()>;

    async fn create_user(&self, database: &str, user: &NewUser) -> AdminResult<()>;

    async fn user_info(&self, database: &str, username: &str) -> AdminResult<Option<UserInfo>>;

    /// Create an empty collection with no options.
    async fn create_collection(&self, database: &str, name: &str) -> AdminResult<()>;

    async fn list_collections(&self, database: &str) -> AdminResult<Vec<String>>;

    async fn list_index_names(&self, database: &str, collection: &str) -> AdminResult<Vec<String>>;

    async fn count_documents(&self, database: &str, collection: &str) -> AdminResult<u64>;
}
