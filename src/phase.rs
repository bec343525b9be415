use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution phase a loss sample was produced under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Training iteration; drives the stop evaluation cadence
    #[serde(alias = "training")]
    Train,
    /// Validation iteration; feeds the persisted window
    #[serde(alias = "validation", alias = "test")]
    Validate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Validate => write!(f, "validate"),
        }
    }
}
