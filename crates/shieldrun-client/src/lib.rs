pub mod descriptor;
pub mod error;
pub mod manifest;
pub mod parser;
pub mod patcher;
pub mod resources;
pub mod scheduler;

pub use descriptor::JobDescriptor;
pub use error::{ClientError, Result};
pub use patcher::ScriptPatcher;
pub use resources::SbatchDirectives;
pub use scheduler::{Scheduler, SlurmScheduler};
