use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

use crate::step::{Phase, Step, StepCtx, StepOutcome};

/// Phase execution order
const PHASE_ORDER: &[Phase] = &[
    Phase::Authenticate, // Principal must be established first
    Phase::User,         // Application credential
    Phase::Collections,  // Empty collections
];

/// A step as it would run, without touching the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub name: String,
    pub phase: Phase,
    pub description: String,
}

/// A step as it actually ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub phase: Phase,
    pub outcome: StepOutcome,
}

/// Result of a complete registry run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn applied(&self) -> usize {
        self.count(StepOutcome::Applied)
    }

    pub fn skipped(&self) -> usize {
        self.count(StepOutcome::Skipped)
    }

    pub fn outcome_of(&self, name: &str) -> Option<StepOutcome> {
        self.steps
            .iter()
            .find(|record| record.name == name)
            .map(|record| record.outcome)
    }

    fn count(&self, outcome: StepOutcome) -> usize {
        self.steps.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// Step registry that runs provisioning steps in phase order
pub struct StepRegistry {
    steps: Vec<Arc<dyn Step>>,
}

impl StepRegistry {
    /// Create a new step registry
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Register a step with the registry
    pub fn register(&mut self, step: Arc<dyn Step>) {
        self.steps.push(step);
    }

    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.iter().find(|step| step.name() == name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in execution order: by phase, then by registration order within a phase
    pub fn ordered(&self) -> Vec<&Arc<dyn Step>> {
        PHASE_ORDER
            .iter()
            .flat_map(|&phase| self.steps.iter().filter(move |s| s.phase() == phase))
            .collect()
    }

    /// Describe the steps in execution order
    pub fn describe(&self) -> Vec<PlannedStep> {
        self.ordered()
            .into_iter()
            .map(|step| PlannedStep {
                name: step.name().to_string(),
                phase: step.phase(),
                description: step.describe(),
            })
            .collect()
    }

    /// Run every step in order, stopping at the first failure
    pub async fn run(&self, ctx: &StepCtx<'_>) -> anyhow::Result<RunReport> {
        tracing::info!("running {} steps in phase order: {:?}", self.steps.len(), PHASE_ORDER);

        let mut report = RunReport::default();
        for step in self.ordered() {
            tracing::info!(step = step.name(), phase = ?step.phase(), "running step");

            let outcome = step
                .apply(ctx)
                .await
                .with_context(|| format!("step '{}' failed", step.name()))?;

            tracing::info!(step = step.name(), outcome = ?outcome, "step finished");
            report.steps.push(StepRecord {
                name: step.name().to_string(),
                phase: step.phase(),
                outcome,
            });
        }

        Ok(report)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
