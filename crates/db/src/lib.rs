//! Database hosts implementing the kernel's `AdminClient` seam.

pub mod memory;
pub mod mongo;

pub use memory::MemoryAdmin;
pub use mongo::MongoAdmin;
