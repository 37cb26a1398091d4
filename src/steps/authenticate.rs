use async_trait::async_trait;

use scheduledb_kernel::{Credential, Phase, Step, StepCtx, StepOutcome};

/// Establish an administrative session before anything is created.
pub struct AuthenticateStep {
    database: String,
    credential: Credential,
}

impl AuthenticateStep {
    pub fn new(database: impl Into<String>, credential: Credential) -> Self {
        Self {
            database: database.into(),
            credential,
        }
    }
}

#[async_trait]
impl Step for AuthenticateStep {
    fn name(&self) -> &str {
        "authenticate"
    }

    fn phase(&self) -> Phase {
        Phase::Authenticate
    }

    fn describe(&self) -> String {
        format!(
            "authenticate as '{}' against database '{}'",
            self.credential.username, self.database
        )
    }

    async fn apply(&self, ctx: &StepCtx<'_>) -> anyhow::Result<StepOutcome> {
        ctx.admin.authenticate(&self.database, &self.credential).await?;

        tracing::info!(
            user = %self.credential.username,
            database = %self.database,
            "administrative session established"
        );
        Ok(StepOutcome::Applied)
    }
}
