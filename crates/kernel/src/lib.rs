pub mod admin;
pub mod registry;
pub mod settings;
pub mod step;

pub use admin::{AdminClient, AdminError, AdminResult, Credential, NewUser, RoleGrant, UserInfo};
pub use registry::{PlannedStep, RunReport, StepRecord, StepRegistry};
pub use step::{Phase, Step, StepCtx, StepOutcome};
