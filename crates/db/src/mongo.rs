//! MongoDB control-plane client.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::error::{Error, ErrorKind};
use mongodb::options::{ClientOptions, Credential as MongoCredential};
use mongodb::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use scheduledb_kernel::settings::DatabaseSettings;
use scheduledb_kernel::{AdminClient, AdminError, AdminResult, Credential, NewUser, UserInfo};

const UNAUTHORIZED: i32 = 13;
const AUTHENTICATION_FAILED: i32 = 18;
const NAMESPACE_EXISTS: i32 = 48;
const DUPLICATE_KEY: i32 = 11000;
const USER_ALREADY_EXISTS: i32 = 51003;

#[derive(Deserialize)]
struct UsersInfoReply {
    #[serde(default)]
    users: Vec<UserInfo>,
}

/// Admin session against a MongoDB deployment.
///
/// The driver binds credentials at connection handshake, so `authenticate`
/// replaces the underlying client instead of issuing a command on it.
pub struct MongoAdmin {
    options: ClientOptions,
    client: RwLock<Client>,
}

impl MongoAdmin {
    /// Open an unauthenticated client (or one authenticated by credentials in the URI).
    pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let mut options = ClientOptions::parse(&settings.uri)
            .await
            .with_context(|| "failed to parse database.uri")?;
        options.app_name = Some(settings.app_name.clone());
        options.server_selection_timeout = Some(Duration::from_millis(settings.connect_timeout_ms));

        let client = Client::with_options(options.clone())
            .with_context(|| "failed to create MongoDB client")?;

        tracing::info!(
            target: "scheduledb-db",
            hosts = ?options.hosts,
            app_name = %settings.app_name,
            "MongoDB client created"
        );

        Ok(Self {
            options,
            client: RwLock::new(client),
        })
    }

    async fn client(&self) -> Client {
        self.client.read().await.clone()
    }
}

#[async_trait]
impl AdminClient for MongoAdmin {
    async fn ping(&self) -> AdminResult<()> {
        self.client()
            .await
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(into_admin_error)?;

        tracing::info!(target: "scheduledb-db", "successfully connected to MongoDB");
        Ok(())
    }

    async fn authenticate(&self, database: &str, credential: &Credential) -> AdminResult<()> {
        let mut options = self.options.clone();
        options.credential = Some(
            MongoCredential::builder()
                .username(credential.username.clone())
                .password(credential.password.clone())
                .source(database.to_string())
                .build(),
        );

        let client = Client::with_options(options).map_err(into_admin_error)?;

        // Handshake (and therefore SASL) happens on the first round-trip.
        client
            .database(database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|err| auth_error(err, database, credential))?;

        *self.client.write().await = client;

        tracing::info!(
            target: "scheduledb-db",
            user = %credential.username,
            database,
            "authenticated"
        );
        Ok(())
    }

    async fn create_user(&self, database: &str, user: &NewUser) -> AdminResult<()> {
        let roles: Vec<Document> = user
            .roles
            .iter()
            .map(|grant| doc! { "role": grant.role.as_str(), "db": grant.db.as_str() })
            .collect();

        let mut command = doc! {
            "createUser": user.credential.username.as_str(),
            "pwd": user.credential.password.as_str(),
            "roles": roles,
        };
        if !user.mechanisms.is_empty() {
            command.insert("mechanisms", user.mechanisms.clone());
        }

        self.client()
            .await
            .database(database)
            .run_command(command)
            .await
            .map_err(|err| match command_code(&err) {
                Some(USER_ALREADY_EXISTS) | Some(DUPLICATE_KEY) => AdminError::UserExists {
                    user: user.credential.username.clone(),
                    database: database.to_string(),
                },
                _ => into_admin_error(err),
            })?;

        Ok(())
    }

    async fn user_info(&self, database: &str, username: &str) -> AdminResult<Option<UserInfo>> {
        let reply = self
            .client()
            .await
            .database(database)
            .run_command(doc! { "usersInfo": { "user": username, "db": database } })
            .await
            .map_err(into_admin_error)?;

        let reply: UsersInfoReply = mongodb::bson::from_document(reply)
            .map_err(|err| AdminError::Other(format!("malformed usersInfo reply: {err}")))?;

        Ok(reply.users.into_iter().next())
    }

    async fn create_collection(&self, database: &str, name: &str) -> AdminResult<()> {
        self.client()
            .await
            .database(database)
            .create_collection(name)
            .await
            .map_err(|err| match command_code(&err) {
                Some(NAMESPACE_EXISTS) => AdminError::CollectionExists {
                    database: database.to_string(),
                    collection: name.to_string(),
                },
                _ => into_admin_error(err),
            })
    }

    async fn list_collections(&self, database: &str) -> AdminResult<Vec<String>> {
        self.client()
            .await
            .database(database)
            .list_collection_names()
            .await
            .map_err(into_admin_error)
    }

    async fn list_index_names(&self, database: &str, collection: &str) -> AdminResult<Vec<String>> {
        self.client()
            .await
            .database(database)
            .collection::<Document>(collection)
            .list_index_names()
            .await
            .map_err(into_admin_error)
    }

    async fn count_documents(&self, database: &str, collection: &str) -> AdminResult<u64> {
        self.client()
            .await
            .database(database)
            .collection::<Document>(collection)
            .count_documents(doc! {})
            .await
            .map_err(into_admin_error)
    }
}

fn command_code(err: &Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

fn auth_error(err: Error, database: &str, credential: &Credential) -> AdminError {
    let reason = match err.kind.as_ref() {
        ErrorKind::Authentication { message, .. } => message.clone(),
        ErrorKind::Command(command) if command.code == AUTHENTICATION_FAILED => {
            command.message.clone()
        }
        _ => return into_admin_error(err),
    };

    AdminError::AuthenticationFailed {
        user: credential.username.clone(),
        database: database.to_string(),
        reason,
    }
}

fn into_admin_error(err: Error) -> AdminError {
    match err.kind.as_ref() {
        ErrorKind::Command(command) if command.code == UNAUTHORIZED => {
            AdminError::Unauthorized(command.message.clone())
        }
        ErrorKind::Command(command) => AdminError::Command {
            code: command.code,
            message: command.message.clone(),
        },
        ErrorKind::ServerSelection { message, .. } => AdminError::Unavailable(message.clone()),
        ErrorKind::Io(io) => AdminError::Unavailable(io.to_string()),
        ErrorKind::Authentication { message, .. } => AdminError::Unauthorized(message.clone()),
        _ => AdminError::Other(err.to_string()),
    }
}
