use async_trait::async_trait;

use scheduledb_kernel::settings::CreateMode;
use scheduledb_kernel::{AdminError, NewUser, Phase, Step, StepCtx, StepOutcome};

/// Create the application user with its database-scoped role grants.
pub struct CreateUserStep {
    database: String,
    user: NewUser,
    mode: CreateMode,
}

impl CreateUserStep {
    pub fn new(database: impl Into<String>, user: NewUser, mode: CreateMode) -> Self {
        Self {
            database: database.into(),
            user,
            mode,
        }
    }

    /// Existing users are never updated; a grant mismatch is only reported.
    async fn report_existing(&self, ctx: &StepCtx<'_>) {
        match ctx
            .admin
            .user_info(&self.database, &self.user.credential.username)
            .await
        {
            Ok(Some(info)) if info.roles != self.user.roles => {
                tracing::warn!(
                    user = %info.user,
                    database = %self.database,
                    existing = ?info.roles,
                    expected = ?self.user.roles,
                    "existing user has different role grants; leaving it unchanged"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "could not inspect existing user");
            }
        }
    }
}

#[async_trait]
impl Step for CreateUserStep {
    fn name(&self) -> &str {
        "create_user"
    }

    fn phase(&self) -> Phase {
        Phase::User
    }

    fn describe(&self) -> String {
        let grants: Vec<String> = self
            .user
            .roles
            .iter()
            .map(|grant| format!("{}@{}", grant.role, grant.db))
            .collect();
        format!(
            "create user '{}' in database '{}' with roles [{}]",
            self.user.credential.username,
            self.database,
            grants.join(", ")
        )
    }

    async fn apply(&self, ctx: &StepCtx<'_>) -> anyhow::Result<StepOutcome> {
        match ctx.admin.create_user(&self.database, &self.user).await {
            Ok(()) => {
                tracing::info!(
                    user = %self.user.credential.username,
                    database = %self.database,
                    "user created"
                );
                Ok(StepOutcome::Applied)
            }
            Err(AdminError::UserExists { .. }) if self.mode == CreateMode::Ensure => {
                tracing::info!(
                    user = %self.user.credential.username,
                    database = %self.database,
                    "user already exists"
                );
                self.report_existing(ctx).await;
                Ok(StepOutcome::Skipped)
            }
            Err(err) => Err(err.into()),
        }
    }
}
