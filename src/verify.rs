//! After-the-fact checks that a database matches what the bootstrap creates.

use std::collections::HashSet;

use anyhow::Context;
use serde::Serialize;

use scheduledb_kernel::settings::BootstrapSettings;
use scheduledb_kernel::AdminClient;

const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    MissingUser,
    UnexpectedRoles,
    MissingCollection,
    UnexpectedCollection,
    UnexpectedIndex,
    NonEmptyCollection,
    LoginFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Flag collections holding documents (only meaningful right after bootstrap).
    pub expect_empty: bool,
    /// Log in as the application user last. This changes the session principal.
    pub check_login: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub findings: Vec<Finding>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }

    fn push(&mut self, kind: FindingKind, detail: String) {
        tracing::warn!(kind = ?kind, %detail, "verification finding");
        self.findings.push(Finding { kind, detail });
    }
}

/// Inspect the target database. Host errors abort; mismatches become findings.
pub async fn verify(
    settings: &BootstrapSettings,
    admin: &dyn AdminClient,
    options: VerifyOptions,
) -> anyhow::Result<VerifyReport> {
    let database = settings.target_database.as_str();
    let mut report = VerifyReport::default();

    if settings.admin.authenticate {
        admin
            .authenticate(&settings.admin.database, &settings.admin.credential())
            .await
            .with_context(|| "administrative login failed")?;
    }

    let username = settings.app_user.username.as_str();
    match admin
        .user_info(database, username)
        .await
        .with_context(|| format!("failed to look up user '{}'", username))?
    {
        None => report.push(
            FindingKind::MissingUser,
            format!("user '{}' does not exist in '{}'", username, database),
        ),
        Some(info) => {
            let expected = vec![settings.app_role_grant()];
            if info.roles != expected {
                report.push(
                    FindingKind::UnexpectedRoles,
                    format!("user '{}' has roles {:?}, expected {:?}", username, info.roles, expected),
                );
            }
        }
    }

    let existing = admin
        .list_collections(database)
        .await
        .with_context(|| format!("failed to list collections in '{}'", database))?;
    let existing_set: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let expected_set: HashSet<&str> = settings.collections.iter().map(String::as_str).collect();

    for name in &settings.collections {
        if !existing_set.contains(name.as_str()) {
            report.push(
                FindingKind::MissingCollection,
                format!("collection '{}' does not exist", name),
            );
        }
    }

    let mut unexpected: Vec<&str> = existing_set
        .iter()
        .copied()
        .filter(|name| !expected_set.contains(name) && !name.starts_with("system."))
        .collect();
    unexpected.sort_unstable();
    for name in unexpected {
        report.push(
            FindingKind::UnexpectedCollection,
            format!("collection '{}' is not part of the layout", name),
        );
    }

    for name in settings
        .collections
        .iter()
        .filter(|name| existing_set.contains(name.as_str()))
    {
        let indexes = admin
            .list_index_names(database, name)
            .await
            .with_context(|| format!("failed to list indexes on '{}'", name))?;
        for index in indexes.iter().filter(|index| index.as_str() != ID_INDEX) {
            report.push(
                FindingKind::UnexpectedIndex,
                format!("collection '{}' has index '{}'", name, index),
            );
        }

        if options.expect_empty {
            let count = admin
                .count_documents(database, name)
                .await
                .with_context(|| format!("failed to count documents in '{}'", name))?;
            if count > 0 {
                report.push(
                    FindingKind::NonEmptyCollection,
                    format!("collection '{}' holds {} documents", name, count),
                );
            }
        }
    }

    if options.check_login {
        if let Err(err) = admin
            .authenticate(database, &settings.app_user.credential())
            .await
        {
            report.push(FindingKind::LoginFailed, err.to_string());
        }
    }

    tracing::info!(findings = report.findings.len(), "verification finished");
    Ok(report)
}
