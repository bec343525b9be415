//! Gating a candle loss tensor.
//!
//! The host computes a scalar loss tensor, hands it to [`GatedLoss::step`]
//! and runs its backward pass on the returned tensor. After the stop the
//! returned tensor is scaled by zero, so the optimizer step becomes a no-op.

use candle_core::{DType, Tensor};

use crate::config::ControllerConfig;
use crate::controller::{ensure_scalar, Controller, Decision};
use crate::error::Result;
use crate::phase::Phase;

/// Read the value of a single-element loss tensor.
///
/// # Errors
/// Returns `Error::Config` if the tensor holds more than one element
pub fn scalar_loss(loss: &Tensor) -> Result<f64> {
    ensure_scalar(loss.elem_count())?;
    let value = loss
        .flatten_all()?
        .to_dtype(DType::F64)?
        .to_vec1::<f64>()?
        .first()
        .copied()
        .unwrap_or(f64::NAN);
    Ok(value)
}

/// A [`Controller`] that gates the loss tensor it observes.
pub struct GatedLoss {
    controller: Controller,
}

impl GatedLoss {
    /// Creates a gate around a fresh controller.
    ///
    /// # Arguments
    /// * `config` - Controller configuration
    ///
    /// # Returns
    /// A `GatedLoss` whose controller starts running
    ///
    /// # Errors
    /// Returns `Error::Config` if the configuration is invalid
    pub fn new(config: ControllerConfig) -> Result<Self> {
        Ok(Self {
            controller: Controller::new(config)?,
        })
    }

    /// Wraps an existing, possibly resumed, controller.
    pub fn from_controller(controller: Controller) -> Self {
        Self { controller }
    }

    /// Observe `loss` and return it scaled by the backward gate.
    pub fn step(&mut self, loss: &Tensor, phase: Phase, iteration: u64) -> Result<(Tensor, Decision)> {
        let value = scalar_loss(loss)?;
        let decision = self.controller.observe(value, phase, iteration);
        let gated = loss.affine(decision.gradient_scale(), 0.0)?;
        Ok((gated, decision))
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use tempfile::TempDir;

    #[test]
    fn test_scalar_loss_rejects_vectors() {
        let loss = Tensor::new(&[0.5f32, 0.25], &Device::Cpu).unwrap();
        assert!(scalar_loss(&loss).is_err());
    }

    #[test]
    fn test_scalar_loss_reads_value() {
        let loss = Tensor::new(0.5f32, &Device::Cpu).unwrap();
        assert!((scalar_loss(&loss).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_step_passes_loss_through_while_running() {
        let temp_dir = TempDir::new().unwrap();
        let mut gated = GatedLoss::new(ControllerConfig {
            state_path: temp_dir.path().join("state.bin"),
            ..Default::default()
        })
        .unwrap();

        let loss = Tensor::new(2.0f32, &Device::Cpu).unwrap();
        let (out, decision) = gated.step(&loss, Phase::Train, 0).unwrap();
        assert!(!decision.stopped);
        assert!((out.to_scalar::<f32>().unwrap() - 2.0).abs() < 1e-6);
    }
}
