//! Per-phase accumulation of raw losses into per-epoch summaries.
//!
//! Epoch boundaries come from explicit counters kept in [`ControllerState`]
//! rather than a modulo on the running iteration count: the first finite
//! training sample of every epoch is recorded, and every
//! `validation_steps_per_epoch` validation samples close one validation epoch.

use crate::config::ControllerConfig;
use crate::state::ControllerState;

/// Outcome of routing one training sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainStep {
    /// Training epoch the sample belongs to
    pub epoch: u64,
    /// Whether the sample was appended to the training history
    pub recorded: bool,
    /// Whether a stop evaluation is due at this sample
    pub evaluation_due: bool,
}

/// Routes raw per-iteration losses into a [`ControllerState`].
///
/// Holds only the epoch geometry from the config; all accumulated data lives
/// in the state so it can be checkpointed with the rest of the controller.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    train_steps_per_epoch: usize,
    validation_steps_per_epoch: usize,
    window_capacity: usize,
}

impl Aggregator {
    /// Creates an aggregator for the given configuration.
    ///
    /// # Arguments
    /// * `config` - Controller configuration (epoch lengths and window capacity)
    ///
    /// # Returns
    /// An `Aggregator` that can be applied to any `ControllerState`
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            train_steps_per_epoch: config.train_steps_per_epoch,
            validation_steps_per_epoch: config.validation_steps_per_epoch,
            window_capacity: config.window_capacity,
        }
    }

    /// Route a training loss.
    ///
    /// Every call advances `iteration_index`. The first finite sample of an
    /// epoch is recorded (a non-finite opener defers recording to the next
    /// finite sample of the same epoch), and an evaluation is due on that
    /// sample once more than `window_capacity` epochs have been recorded.
    ///
    /// # Returns
    /// A `TrainStep` describing what happened to the sample
    pub fn observe_train(&self, state: &mut ControllerState, value: f64) -> TrainStep {
        let epoch = state.train_epoch;
        let recorded = !state.train_epoch_recorded && value.is_finite();
        if recorded {
            state.train_loss_history.push(value);
            state.train_epoch_recorded = true;
        }

        state.iteration_index += 1;
        state.train_step_in_epoch += 1;
        if state.train_step_in_epoch >= self.train_steps_per_epoch {
            state.train_step_in_epoch = 0;
            state.train_epoch += 1;
            state.train_epoch_recorded = false;
        }

        TrainStep {
            epoch,
            recorded,
            evaluation_due: recorded && state.train_loss_history.len() > self.window_capacity,
        }
    }

    /// Route a validation loss.
    ///
    /// Returns the epoch mean once `validation_steps_per_epoch` samples have
    /// accumulated; the raw buffer is then cleared for the next epoch.
    /// Non-finite samples must be filtered by the caller.
    ///
    /// # Returns
    /// `Some(mean)` when the sample closes a validation epoch, `None` otherwise
    pub fn observe_validation(&self, state: &mut ControllerState, value: f64) -> Option<f64> {
        state.raw_validation_losses.push(value);
        if state.raw_validation_losses.len() < self.validation_steps_per_epoch {
            return None;
        }

        let n = state.raw_validation_losses.len();
        let tail = &state.raw_validation_losses[n - self.validation_steps_per_epoch..];
        let mean = tail.iter().sum::<f64>() / self.validation_steps_per_epoch as f64;

        state.raw_validation_losses.clear();
        state.validation_epoch += 1;
        Some(mean)
    }
}
