//! Stop/continue state machine.
//!
//! `RUNNING -> STOPPED` is the only transition and `STOPPED` is absorbing.
//! Every [`Controller::observe`] call returns a [`Decision`]; no error ever
//! crosses back to the host.

use crate::aggregator::Aggregator;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::phase::Phase;
use crate::state::ControllerState;
use crate::state_store::StateStore;
use crate::trend::{Evaluation, TrendEvaluator, TrendRule};
use crate::window::ValidationWindow;

/// Gate emitted once, on the call where the stop transition fires.
pub const JUST_STOPPED_GATE: f64 = 1.5;

const RUNNING_GATE: f64 = 1.0;
const STOPPED_GATE: f64 = 0.0;

/// Per-call answer to the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Terminal stop flag
    pub stopped: bool,
    /// 1.0 while running, [`JUST_STOPPED_GATE`] on the transition, 0.0 afterwards
    pub gate: f64,
    /// Observed loss, echoed unchanged to the forward output
    pub loss: f64,
}

impl Decision {
    /// True only on the call where the controller stopped.
    pub fn is_stop_event(&self) -> bool {
        self.gate == JUST_STOPPED_GATE
    }

    /// Multiplier for the backward pass: zero from the stop onwards.
    pub fn gradient_scale(&self) -> f64 {
        if self.stopped {
            STOPPED_GATE
        } else {
            RUNNING_GATE
        }
    }
}

/// Reject loss inputs that are not a single scalar.
pub fn ensure_scalar(element_count: usize) -> Result<()> {
    if element_count != 1 {
        return Err(Error::Config(format!(
            "The input must be a single loss value, got {element_count} elements"
        )));
    }
    Ok(())
}

/// Early-stopping controller driven by one scalar loss per host iteration.
///
/// A validation-side controller closes epochs and writes the window file; a
/// training-side controller reads that file at each evaluation point. One
/// instance may play both roles, or two processes may share the file.
#[derive(Debug)]
pub struct Controller {
    config: ControllerConfig,
    aggregator: Aggregator,
    evaluator: TrendEvaluator,
    store: StateStore,
    window: ValidationWindow,
    state: ControllerState,
}

impl Controller {
    /// Creates a running controller with fresh state.
    ///
    /// # Arguments
    /// * `config` - Controller configuration; validated before use
    ///
    /// # Returns
    /// A `Controller` in the running state with an empty window
    ///
    /// # Errors
    /// Returns `Error::Config` if the configuration is invalid
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let window = ValidationWindow::new(config.window_capacity);
        Ok(Self::assemble(config, window, ControllerState::new()))
    }

    /// Resumes a controller from a saved state.
    ///
    /// The validation window is seeded from the state file so a resumed
    /// validation driver keeps sliding the same window.
    ///
    /// # Arguments
    /// * `config` - Controller configuration; validated before use
    /// * `state` - Checkpoint from [`Controller::into_state`] or `ControllerState::load`
    ///
    /// # Returns
    /// A `Controller` continuing from `state`
    ///
    /// # Errors
    /// Returns `Error::Config` if the configuration is invalid, or
    /// `Error::InvalidInput` if the state's in-epoch positions do not fit the
    /// configured epoch lengths
    pub fn with_state(config: ControllerConfig, state: ControllerState) -> Result<Self> {
        config.validate()?;
        if state.train_step_in_epoch >= config.train_steps_per_epoch {
            return Err(Error::InvalidInput(format!(
                "state is at training step {} of an epoch but train_steps_per_epoch is {}",
                state.train_step_in_epoch, config.train_steps_per_epoch
            )));
        }
        if state.raw_validation_losses.len() >= config.validation_steps_per_epoch {
            return Err(Error::InvalidInput(format!(
                "state buffers {} validation losses but validation_steps_per_epoch is {}",
                state.raw_validation_losses.len(),
                config.validation_steps_per_epoch
            )));
        }
        let store = Self::store_for(&config);
        let window = store.load().unwrap_or_else(|err| {
            tracing::warn!(
                "Failed to read state file {}: {err}; starting with an empty window",
                store.path().display()
            );
            ValidationWindow::new(config.window_capacity)
        });
        Ok(Self::assemble(config, window, state))
    }

    fn store_for(config: &ControllerConfig) -> StateStore {
        StateStore::new(
            config.state_path.clone(),
            config.window_capacity,
            config.precision,
        )
    }

    fn assemble(config: ControllerConfig, window: ValidationWindow, state: ControllerState) -> Self {
        Self {
            aggregator: Aggregator::new(&config),
            evaluator: TrendEvaluator::from_config(&config),
            store: Self::store_for(&config),
            window,
            state,
            config,
        }
    }

    /// Feed one scalar loss observed under `phase` at host iteration `iteration`.
    pub fn observe(&mut self, value: f64, phase: Phase, iteration: u64) -> Decision {
        if !value.is_finite() {
            tracing::warn!("Dropping non-finite {phase} loss {value} at iteration {iteration}");
        }
        match phase {
            Phase::Validate => self.observe_validation(value),
            Phase::Train => self.observe_train(value, iteration),
        }
    }

    fn observe_validation(&mut self, value: f64) -> Decision {
        if !value.is_finite() {
            return self.steady(value);
        }
        if let Some(mean) = self.aggregator.observe_validation(&mut self.state, value) {
            self.window.push(mean);
            let best = self.state.best_validation_mean.map_or(mean, |best| best.min(mean));
            self.state.best_validation_mean = Some(best);
            tracing::debug!(
                "Validation epoch {} mean loss {:.6} (window {}/{})",
                self.state.validation_epoch,
                mean,
                self.window.len(),
                self.window.capacity()
            );
            if let Err(err) = self.store.save(&self.window) {
                tracing::warn!(
                    "Failed to persist validation window to {}: {err}; update for epoch {} lost",
                    self.store.path().display(),
                    self.state.validation_epoch
                );
            }
            if self.config.trend_rule == TrendRule::MinSumRatio {
                if let Err(err) = self.store.save_best(best) {
                    tracing::warn!(
                        "Failed to persist best validation mean to {}: {err}",
                        self.store.best_path().display()
                    );
                }
            }
        }
        self.steady(value)
    }

    fn observe_train(&mut self, value: f64, iteration: u64) -> Decision {
        let step = self.aggregator.observe_train(&mut self.state, value);
        if self.state.stopped || !step.evaluation_due {
            return self.steady(value);
        }

        tracing::debug!("Start checking at iteration {iteration} (epoch {})", step.epoch);
        let window = match self.store.load() {
            Ok(window) => window,
            Err(err) => {
                tracing::warn!(
                    "Failed to read state file {}: {err}; skipping evaluation",
                    self.store.path().display()
                );
                return self.steady(value);
            }
        };

        let best = self.best_validation_mean();
        let Some(evaluation) = self.evaluator.evaluate_with_best(
            &window.values(),
            &self.state.train_loss_history,
            best,
        ) else {
            tracing::debug!(
                "Not enough data to score ({} validation epochs persisted); continuing",
                window.len()
            );
            return self.steady(value);
        };
        self.state.last_evaluation = Some(evaluation);
        tracing::debug!(
            "The value for comparison is {:.6} (threshold {})",
            evaluation.score,
            evaluation.threshold
        );

        if !evaluation.stalled {
            tracing::info!("Training should continue (score {:.6})", evaluation.score);
            return self.steady(value);
        }

        self.state.stopped = true;
        self.state.stopped_at = Some(iteration);
        tracing::info!(
            "Training should be terminated at iteration {iteration}: score {:.6} vs threshold {}",
            evaluation.score,
            evaluation.threshold
        );
        Decision {
            stopped: true,
            gate: JUST_STOPPED_GATE,
            loss: value,
        }
    }

    /// Lowest validation mean known to this process or persisted by a peer.
    fn best_validation_mean(&self) -> Option<f64> {
        if self.config.trend_rule != TrendRule::MinSumRatio {
            return None;
        }
        let persisted = self.store.load_best().unwrap_or_else(|err| {
            tracing::warn!(
                "Failed to read best validation mean from {}: {err}",
                self.store.best_path().display()
            );
            None
        });
        match (self.state.best_validation_mean, persisted) {
            (Some(own), Some(peer)) => Some(own.min(peer)),
            (own, peer) => own.or(peer),
        }
    }

    fn steady(&self, loss: f64) -> Decision {
        let stopped = self.state.stopped;
        Decision {
            stopped,
            gate: if stopped { STOPPED_GATE } else { RUNNING_GATE },
            loss,
        }
    }

    /// Whether the terminal stop has fired.
    pub fn is_stopped(&self) -> bool {
        self.state.stopped
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current mutable state, suitable for checkpointing.
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Consume the controller, keeping its state for a later [`Controller::with_state`].
    pub fn into_state(self) -> ControllerState {
        self.state
    }

    /// Validation window as built by this process.
    pub fn window(&self) -> &ValidationWindow {
        &self.window
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Most recent scored evaluation, if any evaluation produced a score.
    pub fn last_evaluation(&self) -> Option<&Evaluation> {
        self.state.last_evaluation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> ControllerConfig {
        ControllerConfig {
            threshold: 0.05,
            scale_factor: 1.0,
            window_capacity: 2,
            train_steps_per_epoch: 1,
            validation_steps_per_epoch: 1,
            state_path: dir.path().join("state.bin"),
            ..Default::default()
        }
    }

    #[test]
    fn test_ensure_scalar() {
        assert!(ensure_scalar(1).is_ok());
        assert!(matches!(ensure_scalar(0), Err(Error::Config(_))));
        assert!(matches!(ensure_scalar(4), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_config_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = ControllerConfig {
            window_capacity: 0,
            ..config(&temp_dir)
        };
        assert!(Controller::new(cfg).is_err());
    }

    #[test]
    fn test_decision_gates() {
        let running = Decision { stopped: false, gate: 1.0, loss: 0.3 };
        let event = Decision { stopped: true, gate: JUST_STOPPED_GATE, loss: 0.3 };
        let frozen = Decision { stopped: true, gate: 0.0, loss: 0.3 };

        assert!(!running.is_stop_event());
        assert!(event.is_stop_event());
        assert!(!frozen.is_stop_event());
        assert_eq!(running.gradient_scale(), 1.0);
        assert_eq!(event.gradient_scale(), 0.0);
        assert_eq!(frozen.gradient_scale(), 0.0);
    }

    #[test]
    fn test_forward_echoes_loss() {
        let temp_dir = TempDir::new().unwrap();
        let mut controller = Controller::new(config(&temp_dir)).unwrap();
        let decision = controller.observe(0.731, Phase::Train, 0);
        assert_eq!(decision.loss, 0.731);
        assert_eq!(decision.gate, 1.0);
        assert!(!decision.stopped);
    }

    #[test]
    fn test_non_finite_validation_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let mut controller = Controller::new(config(&temp_dir)).unwrap();
        controller.observe(f64::NAN, Phase::Validate, 0);
        assert!(controller.window().is_empty());
        assert!(controller.state().raw_validation_losses.is_empty());
        assert!(!controller.store().path().exists());
    }

    #[test]
    fn test_resume_rejects_out_of_range_positions() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = ControllerConfig {
            train_steps_per_epoch: 10,
            validation_steps_per_epoch: 3,
            ..config(&temp_dir)
        };

        let past_epoch_end = ControllerState {
            train_step_in_epoch: 50,
            ..Default::default()
        };
        assert!(matches!(
            Controller::with_state(cfg.clone(), past_epoch_end),
            Err(Error::InvalidInput(_))
        ));

        let full_buffer = ControllerState {
            raw_validation_losses: vec![1.0, 1.0, 1.0],
            ..Default::default()
        };
        assert!(matches!(
            Controller::with_state(cfg.clone(), full_buffer),
            Err(Error::InvalidInput(_))
        ));

        let mid_epoch = ControllerState {
            train_step_in_epoch: 9,
            raw_validation_losses: vec![1.0, 1.0],
            ..Default::default()
        };
        assert!(Controller::with_state(cfg, mid_epoch).is_ok());
    }

    #[test]
    fn test_best_validation_mean_tracks_minimum() {
        let temp_dir = TempDir::new().unwrap();
        let mut controller = Controller::new(config(&temp_dir)).unwrap();
        for loss in [0.4, 0.5, 0.6] {
            controller.observe(loss, Phase::Validate, 0);
        }
        assert_eq!(controller.state().best_validation_mean, Some(0.4));
        assert_eq!(controller.window().values(), vec![0.5, 0.6]);
        // relative-improvement controllers leave no best file behind
        assert!(!controller.store().best_path().exists());
    }
}
