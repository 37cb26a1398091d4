//! The provisioning routine: optional admin login, application user, empty collections.

use std::sync::Arc;

use anyhow::Context;

use scheduledb_kernel::settings::BootstrapSettings;
use scheduledb_kernel::{AdminClient, NewUser, RunReport, StepCtx, StepRegistry};

use crate::steps::{AuthenticateStep, CreateCollectionStep, CreateUserStep};

/// Register every step the settings call for.
pub fn build_registry(settings: &BootstrapSettings) -> StepRegistry {
    let mut registry = StepRegistry::new();

    if settings.admin.authenticate {
        registry.register(Arc::new(AuthenticateStep::new(
            &settings.admin.database,
            settings.admin.credential(),
        )));
    }

    let app_user = NewUser {
        credential: settings.app_user.credential(),
        roles: vec![settings.app_role_grant()],
        mechanisms: settings.app_user.mechanisms.clone(),
    };
    registry.register(Arc::new(CreateUserStep::new(
        &settings.target_database,
        app_user,
        settings.mode,
    )));

    for collection in &settings.collections {
        registry.register(Arc::new(CreateCollectionStep::new(
            &settings.target_database,
            collection,
            settings.mode,
        )));
    }

    registry
}

/// Validate, check the host is reachable, then run every step in order.
pub async fn run(settings: &BootstrapSettings, admin: &dyn AdminClient) -> anyhow::Result<RunReport> {
    settings
        .validate()
        .with_context(|| "invalid bootstrap settings")?;

    admin
        .ping()
        .await
        .with_context(|| "database host is not reachable")?;

    let registry = build_registry(settings);

    tracing::info!(
        target_database = %settings.target_database,
        mode = ?settings.mode,
        admin_auth = settings.admin.authenticate,
        steps = registry.len(),
        "provisioning target database"
    );

    let ctx = StepCtx { settings, admin };
    let report = registry.run(&ctx).await?;

    tracing::info!(
        applied = report.applied(),
        skipped = report.skipped(),
        "bootstrap complete"
    );
    Ok(report)
}
