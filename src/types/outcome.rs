use crate::error::BackupError;

/// Result of backing up one database.
#[derive(Debug)]
pub enum BackupOutcome {
    Succeeded { database: String, blob: String },
    Failed { database: String, error: BackupError },
}

impl BackupOutcome {
    pub fn database(&self) -> &str {
        match self {
            Self::Succeeded { database, .. } | Self::Failed { database, .. } => database,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Outcomes of one run, in processing order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<BackupOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
