pub mod orchestrator;
pub mod report;
pub mod scheduler;

pub use orchestrator::BackupJob;
pub use report::{BackupReporter, TracingReporter};
pub use scheduler::Trigger;
