use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Deserializer, Serialize};

use crate::admin::{Credential, RoleGrant};

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "SCHEDULEDB_ENV";
const CONFIG_DIR_ENV: &str = "SCHEDULEDB_CONFIG_DIR";
const ENV_PREFIX: &str = "SCHEDULEDB";

/// Characters MongoDB refuses in database names.
const ILLEGAL_DATABASE_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?', '\0'];

/// Deployment environment the initializer is running in.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, environment overlay, and env vars.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Same as [`Settings::load`], with an explicit config directory taking precedence
    /// over `SCHEDULEDB_CONFIG_DIR`.
    pub fn load_from(config_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => match std::env::var(CONFIG_DIR_ENV) {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => std::env::current_dir()
                    .map(|cwd| cwd.join("config"))
                    .with_context(|| "unable to resolve current directory")?,
            },
        };

        let base_path = config_dir.join("base.toml");
        let environment_filename = format!("{}.toml", environment);
        let environment_path = config_dir.join(environment_filename);

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("bootstrap.collections")
                    .with_list_parse_key("bootstrap.app_user.mechanisms"),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // Override environment field with parsed enum variant.
        settings.environment = match environment.as_str() {
            "local" => Environment::Local,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            other => {
                return Err(anyhow!(
                    "unsupported environment '{}'; expected local/staging/production",
                    other
                ));
            }
        };

        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "DatabaseSettings::default_uri")]
    pub uri: String,
    #[serde(default = "DatabaseSettings::default_app_name")]
    pub app_name: String,
    #[serde(default = "DatabaseSettings::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl DatabaseSettings {
    fn default_uri() -> String {
        "mongodb://localhost:27017".to_string()
    }

    fn default_app_name() -> String {
        "scheduledb-init".to_string()
    }

    fn default_connect_timeout_ms() -> u64 {
        10000
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            uri: Self::default_uri(),
            app_name: Self::default_app_name(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
        }
    }
}

/// Accept either a list or a comma-separated string, so env overrides stay
/// plain strings and are never coerced into numbers.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringList {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match StringList::deserialize(deserializer)? {
        StringList::List(items) => items,
        StringList::Csv(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect(),
    })
}

/// How create operations treat objects that already exist.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CreateMode {
    /// Existing users and collections are left alone and reported as skipped.
    #[default]
    Ensure,
    /// Existing users and collections fail the run.
    Strict,
}

/// Everything the provisioning routine needs to know about its target.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapSettings {
    #[serde(default = "BootstrapSettings::default_target_database")]
    pub target_database: String,
    #[serde(default)]
    pub admin: AdminSettings,
    #[serde(default)]
    pub app_user: AppUserSettings,
    #[serde(
        default = "BootstrapSettings::default_collections",
        deserialize_with = "string_list"
    )]
    pub collections: Vec<String>,
    #[serde(default)]
    pub mode: CreateMode,
}

impl BootstrapSettings {
    fn default_target_database() -> String {
        "schedule_db".to_string()
    }

    fn default_collections() -> Vec<String> {
        ["users", "classrooms", "courses", "schedules"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// The single grant given to the application user. Always scoped to the target database.
    pub fn app_role_grant(&self) -> RoleGrant {
        RoleGrant::new(&self.app_user.role, &self.target_database)
    }

    /// Reject settings the host would refuse half way through a run.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_database_name(&self.target_database)
            .with_context(|| "invalid bootstrap.target_database")?;

        if self.admin.authenticate {
            validate_database_name(&self.admin.database)
                .with_context(|| "invalid bootstrap.admin.database")?;
            if self.admin.username.is_empty() {
                bail!("bootstrap.admin.username must not be empty");
            }
        }

        if self.app_user.username.is_empty() {
            bail!("bootstrap.app_user.username must not be empty");
        }
        if self.app_user.role.is_empty() {
            bail!("bootstrap.app_user.role must not be empty");
        }

        let mut seen = HashSet::new();
        for name in &self.collections {
            validate_collection_name(name)?;
            if !seen.insert(name.as_str()) {
                bail!("collection '{}' is listed more than once", name);
            }
        }

        Ok(())
    }
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            target_database: Self::default_target_database(),
            admin: AdminSettings::default(),
            app_user: AppUserSettings::default(),
            collections: Self::default_collections(),
            mode: CreateMode::default(),
        }
    }
}

fn validate_database_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        bail!("database name must not be empty");
    }
    if let Some(c) = name.chars().find(|c| ILLEGAL_DATABASE_CHARS.contains(c)) {
        bail!("database name '{}' contains illegal character {:?}", name, c);
    }
    Ok(())
}

fn validate_collection_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        bail!("collection names must not be empty");
    }
    if name.contains('$') || name.contains('\0') {
        bail!("collection name '{}' contains an illegal character", name);
    }
    if name.starts_with("system.") {
        bail!("collection name '{}' uses the reserved system. prefix", name);
    }
    Ok(())
}

/// Administrative principal used before switching to the target database.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSettings {
    #[serde(default = "AdminSettings::default_authenticate")]
    pub authenticate: bool,
    #[serde(default = "AdminSettings::default_database")]
    pub database: String,
    #[serde(default = "AdminSettings::default_username")]
    pub username: String,
    #[serde(default = "AdminSettings::default_password")]
    pub password: String,
}

impl AdminSettings {
    fn default_authenticate() -> bool {
        true
    }

    fn default_database() -> String {
        "admin".to_string()
    }

    fn default_username() -> String {
        "admin".to_string()
    }

    fn default_password() -> String {
        "admin".to_string()
    }

    pub fn credential(&self) -> Credential {
        Credential::new(&self.username, &self.password)
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            authenticate: Self::default_authenticate(),
            database: Self::default_database(),
            username: Self::default_username(),
            password: Self::default_password(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppUserSettings {
    #[serde(default = "AppUserSettings::default_username")]
    pub username: String,
    #[serde(default = "AppUserSettings::default_password")]
    pub password: String,
    #[serde(default = "AppUserSettings::default_role")]
    pub role: String,
    /// SCRAM mechanisms to enable; empty leaves the server default.
    #[serde(default)]
    pub mechanisms: Vec<String>,
}

impl AppUserSettings {
    fn default_username() -> String {
        "user".to_string()
    }

    fn default_password() -> String {
        "user".to_string()
    }

    fn default_role() -> String {
        "readWrite".to_string()
    }

    pub fn credential(&self) -> Credential {
        Credential::new(&self.username, &self.password)
    }
}

impl Default for AppUserSettings {
    fn default() -> Self {
        Self {
            username: Self::default_username(),
            password: Self::default_password(),
            role: Self::default_role(),
            mechanisms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "TelemetrySettings::default_filter")]
    pub filter: String,
}

impl TelemetrySettings {
    fn default_filter() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            filter: Self::default_filter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
