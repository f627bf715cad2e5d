pub mod outcome;

pub use outcome::{BackupOutcome, RunSummary};
