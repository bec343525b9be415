use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::trend::Evaluation;

/// Mutable lifetime state of one controller.
///
/// Created with `stopped == false` and every counter at zero; mutated by each
/// observed sample. Serializable so a host can checkpoint and resume it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    /// Terminal stop flag
    pub stopped: bool,
    /// Host iteration index at which the stop fired
    pub stopped_at: Option<u64>,
    /// Count of observed training-phase samples
    pub iteration_index: u64,
    /// First training loss of each epoch (informational, read by the legacy rule)
    pub train_loss_history: Vec<f64>,
    /// Validation losses of the epoch in progress
    pub raw_validation_losses: Vec<f64>,
    /// Completed training epochs
    pub train_epoch: u64,
    /// Position of the next training sample within its epoch
    pub train_step_in_epoch: usize,
    /// Whether the current training epoch already has its history entry
    #[serde(default)]
    pub train_epoch_recorded: bool,
    /// Completed validation epochs
    pub validation_epoch: u64,
    /// Lowest validation-epoch mean ever produced; never evicted by the window
    #[serde(default)]
    pub best_validation_mean: Option<f64>,
    /// Most recent trend evaluation
    pub last_evaluation: Option<Evaluation>,
}

impl ControllerState {
    /// Fresh state: running, with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Save state as JSON.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or the file write fails
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load state saved by [`ControllerState::save`].
    ///
    /// # Errors
    /// Returns error if the file doesn't exist or is not a valid state
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let state: ControllerState = serde_json::from_str(&json)?;
        Ok(state)
    }
}
