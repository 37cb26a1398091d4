use async_trait::async_trait;

use scheduledb_kernel::settings::CreateMode;
use scheduledb_kernel::{AdminError, Phase, Step, StepCtx, StepOutcome};

/// Create one empty collection with no options.
pub struct CreateCollectionStep {
    name: String,
    database: String,
    collection: String,
    mode: CreateMode,
}

impl CreateCollectionStep {
    pub fn new(database: impl Into<String>, collection: impl Into<String>, mode: CreateMode) -> Self {
        let collection = collection.into();
        Self {
            name: format!("create_collection:{}", collection),
            database: database.into(),
            collection,
            mode,
        }
    }

    fn exists_error(&self) -> AdminError {
        AdminError::CollectionExists {
            database: self.database.clone(),
            collection: self.collection.clone(),
        }
    }
}

#[async_trait]
impl Step for CreateCollectionStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> Phase {
        Phase::Collections
    }

    fn describe(&self) -> String {
        format!(
            "create collection '{}' in database '{}'",
            self.collection, self.database
        )
    }

    async fn apply(&self, ctx: &StepCtx<'_>) -> anyhow::Result<StepOutcome> {
        // Checked up front: newer servers accept a duplicate `create` silently.
        let existing = ctx.admin.list_collections(&self.database).await?;
        if existing.iter().any(|name| name == &self.collection) {
            return match self.mode {
                CreateMode::Ensure => {
                    tracing::info!(collection = %self.collection, "collection already exists");
                    Ok(StepOutcome::Skipped)
                }
                CreateMode::Strict => Err(self.exists_error().into()),
            };
        }

        match ctx
            .admin
            .create_collection(&self.database, &self.collection)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    collection = %self.collection,
                    database = %self.database,
                    "collection created"
                );
                Ok(StepOutcome::Applied)
            }
            Err(AdminError::CollectionExists { .. }) if self.mode == CreateMode::Ensure => {
                Ok(StepOutcome::Skipped)
            }
            Err(err) => Err(err.into()),
        }
    }
}
