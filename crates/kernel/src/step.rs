use async_trait::async_trait;
use serde::Serialize;

use crate::admin::AdminClient;
use crate::settings::BootstrapSettings;

/// Context provided to steps while they run
pub struct StepCtx<'a> {
    pub settings: &'a BootstrapSettings,
    pub admin: &'a dyn AdminClient,
}

/// Coarse ordering bucket. Steps of an earlier phase always run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Authenticate,
    User,
    Collections,
}

/// What a step did to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    /// The step changed the host.
    Applied,
    /// The object already existed and was left alone.
    Skipped,
}

/// A single provisioning action
#[async_trait]
pub trait Step: Sync + Send {
    /// Unique name for this step, e.g. `create_collection:users`
    fn name(&self) -> &str;

    /// Phase this step belongs to
    fn phase(&self) -> Phase;

    /// Human-readable description used by `plan`
    fn describe(&self) -> String;

    /// Perform the step against the host in `ctx`
    async fn apply(&self, ctx: &StepCtx<'_>) -> anyhow::Result<StepOutcome>;
}
