//! # earlystop-gate
//!
//! Early-stopping controller for an iterative optimization loop.
//!
//! The host feeds one scalar loss per iteration together with the phase it was
//! produced under. Validation losses are reduced to per-epoch means and kept in
//! a bounded window that is persisted to a flat binary file; on a training-side
//! cadence the controller reloads that window, scores recent progress and,
//! once progress has stalled, latches a terminal stop decision.
//!
//! Optional features:
//! - `candle`: gate a `candle_core::Tensor` loss directly
//! - `cuda`: GPU tensors for the candle adapter

pub mod aggregator;
pub mod config;
pub mod controller;
pub mod error;
pub mod phase;
pub mod state;
pub mod state_store;
pub mod trend;
pub mod window;

#[cfg(feature = "candle")]
pub mod host;

pub use config::{ControllerConfig, Precision};
pub use controller::{ensure_scalar, Controller, Decision, JUST_STOPPED_GATE};
pub use error::{Error, Result};
pub use phase::Phase;
pub use state::ControllerState;
pub use state_store::StateStore;
pub use trend::{Evaluation, TrendEvaluator, TrendRule};
pub use window::ValidationWindow;
