//! In-process host that follows MongoDB's admin semantics closely enough to
//! exercise provisioning without a server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use scheduledb_kernel::{
    AdminClient, AdminError, AdminResult, Credential, NewUser, RoleGrant, UserInfo,
};

const ID_INDEX: &str = "_id_";
const ADMIN_DATABASE: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Read,
    Write,
    UserAdmin,
}

#[derive(Debug, Clone)]
struct StoredUser {
    password: String,
    roles: Vec<RoleGrant>,
}

#[derive(Debug, Clone)]
struct CollectionState {
    indexes: Vec<String>,
    documents: u64,
}

impl CollectionState {
    fn empty() -> Self {
        Self {
            indexes: vec![ID_INDEX.to_string()],
            documents: 0,
        }
    }
}

#[derive(Debug, Default)]
struct DatabaseState {
    users: BTreeMap<String, StoredUser>,
    collections: BTreeMap<String, CollectionState>,
}

#[derive(Debug, Clone)]
struct Principal {
    username: String,
    database: String,
    roles: Vec<RoleGrant>,
}

impl Principal {
    fn allows(&self, database: &str, action: Action) -> bool {
        self.roles.iter().any(|grant| grant_allows(grant, database, action))
    }
}

fn grant_allows(grant: &RoleGrant, database: &str, action: Action) -> bool {
    let cluster_wide = grant.db == ADMIN_DATABASE;
    match grant.role.as_str() {
        "root" => cluster_wide,
        "dbOwner" => grant.db == database,
        "readWrite" => grant.db == database && action != Action::UserAdmin,
        "read" => grant.db == database && action == Action::Read,
        "userAdmin" => grant.db == database && action == Action::UserAdmin,
        "readWriteAnyDatabase" => cluster_wide && action != Action::UserAdmin,
        "userAdminAnyDatabase" => cluster_wide && action == Action::UserAdmin,
        _ => false,
    }
}

#[derive(Debug)]
struct HostState {
    databases: BTreeMap<String, DatabaseState>,
    enforce_auth: bool,
    available: bool,
    principal: Option<Principal>,
}

impl HostState {
    fn authorize(&self, database: &str, action: Action) -> AdminResult<()> {
        if !self.enforce_auth {
            return Ok(());
        }
        match &self.principal {
            Some(principal) if principal.allows(database, action) => Ok(()),
            Some(principal) => Err(AdminError::Unauthorized(format!(
                "{}@{} is not authorized for {:?} on {}",
                principal.username, principal.database, action, database
            ))),
            None => Err(AdminError::Unauthorized(format!(
                "command on {} requires authentication",
                database
            ))),
        }
    }

    fn ensure_available(&self) -> AdminResult<()> {
        if self.available {
            Ok(())
        } else {
            Err(AdminError::Unavailable("server selection timed out".to_string()))
        }
    }
}

/// In-memory document database host.
#[derive(Debug)]
pub struct MemoryAdmin {
    state: Mutex<HostState>,
}

impl MemoryAdmin {
    /// A host with authentication disabled, as a fresh `mongod` without `--auth`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                databases: BTreeMap::new(),
                enforce_auth: false,
                available: true,
                principal: None,
            }),
        }
    }

    /// A host with authentication enforced and a single `root` principal in `admin`.
    pub fn with_root(credential: Credential) -> Self {
        let mut admin_db = DatabaseState::default();
        admin_db.users.insert(
            credential.username,
            StoredUser {
                password: credential.password,
                roles: vec![RoleGrant::new("root", ADMIN_DATABASE)],
            },
        );

        let mut databases = BTreeMap::new();
        databases.insert(ADMIN_DATABASE.to_string(), admin_db);

        Self {
            state: Mutex::new(HostState {
                databases,
                enforce_auth: true,
                available: true,
                principal: None,
            }),
        }
    }

    /// Simulate the host going away or coming back.
    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.available = available;
    }

    /// Forget the authenticated principal, as a new connection would.
    pub async fn reset_session(&self) {
        self.state.lock().await.principal = None;
    }

    /// Insert one document, implicitly creating the collection like MongoDB does.
    pub async fn insert_document(&self, database: &str, collection: &str) -> AdminResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        state.authorize(database, Action::Write)?;

        state
            .databases
            .entry(database.to_string())
            .or_default()
            .collections
            .entry(collection.to_string())
            .or_insert_with(CollectionState::empty)
            .documents += 1;
        Ok(())
    }

    /// Add a secondary index to an existing collection.
    pub async fn create_index(&self, database: &str, collection: &str, index: &str) -> AdminResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        state.authorize(database, Action::Write)?;

        let entry = state
            .databases
            .entry(database.to_string())
            .or_default()
            .collections
            .entry(collection.to_string())
            .or_insert_with(CollectionState::empty);
        if !entry.indexes.iter().any(|name| name == index) {
            entry.indexes.push(index.to_string());
        }
        Ok(())
    }
}

impl Default for MemoryAdmin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdminClient for MemoryAdmin {
    async fn ping(&self) -> AdminResult<()> {
        self.state.lock().await.ensure_available()
    }

    async fn authenticate(&self, database: &str, credential: &Credential) -> AdminResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;

        let stored = state
            .databases
            .get(database)
            .and_then(|db| db.users.get(&credential.username))
            .filter(|user| user.password == credential.password)
            .cloned();

        match stored {
            Some(user) => {
                state.principal = Some(Principal {
                    username: credential.username.clone(),
                    database: database.to_string(),
                    roles: user.roles,
                });
                Ok(())
            }
            None => Err(AdminError::AuthenticationFailed {
                user: credential.username.clone(),
                database: database.to_string(),
                reason: "Authentication failed.".to_string(),
            }),
        }
    }

    async fn create_user(&self, database: &str, user: &NewUser) -> AdminResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        state.authorize(database, Action::UserAdmin)?;

        let users = &mut state.databases.entry(database.to_string()).or_default().users;
        if users.contains_key(&user.credential.username) {
            return Err(AdminError::UserExists {
                user: user.credential.username.clone(),
                database: database.to_string(),
            });
        }

        users.insert(
            user.credential.username.clone(),
            StoredUser {
                password: user.credential.password.clone(),
                roles: user.roles.clone(),
            },
        );
        Ok(())
    }

    async fn user_info(&self, database: &str, username: &str) -> AdminResult<Option<UserInfo>> {
        let state = self.state.lock().await;
        state.ensure_available()?;

        let own_user = state
            .principal
            .as_ref()
            .is_some_and(|p| p.username == username && p.database == database);
        if !own_user {
            state.authorize(database, Action::UserAdmin)?;
        }

        Ok(state
            .databases
            .get(database)
            .and_then(|db| db.users.get(username))
            .map(|stored| UserInfo {
                user: username.to_string(),
                db: database.to_string(),
                roles: stored.roles.clone(),
            }))
    }

    async fn create_collection(&self, database: &str, name: &str) -> AdminResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;
        state.authorize(database, Action::Write)?;

        let collections = &mut state
            .databases
            .entry(database.to_string())
            .or_default()
            .collections;
        if collections.contains_key(name) {
            return Err(AdminError::CollectionExists {
                database: database.to_string(),
                collection: name.to_string(),
            });
        }

        collections.insert(name.to_string(), CollectionState::empty());
        Ok(())
    }

    async fn list_collections(&self, database: &str) -> AdminResult<Vec<String>> {
        let state = self.state.lock().await;
        state.ensure_available()?;
        state.authorize(database, Action::Read)?;

        Ok(state
            .databases
            .get(database)
            .map(|db| db.collections.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_index_names(&self, database: &str, collection: &str) -> AdminResult<Vec<String>> {
        let state = self.state.lock().await;
        state.ensure_available()?;
        state.authorize(database, Action::Read)?;

        state
            .databases
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .map(|c| c.indexes.clone())
            .ok_or_else(|| AdminError::Command {
                code: 26,
                message: format!("ns does not exist: {}.{}", database, collection),
            })
    }

    async fn count_documents(&self, database: &str, collection: &str) -> AdminResult<u64> {
        let state = self.state.lock().await;
        state.ensure_available()?;
        state.authorize(database, Action::Read)?;

        Ok(state
            .databases
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .map(|c| c.documents)
            .unwrap_or(0))
    }
}
