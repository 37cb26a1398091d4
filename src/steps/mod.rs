//! Provisioning steps registered by the bootstrap routine.

mod authenticate;
mod collection;
mod user;

pub use authenticate::AuthenticateStep;
pub use collection::CreateCollectionStep;
pub use user::CreateUserStep;
