//! Alert tiers for scored points.
//!
//! Submodules:
//! - `thresholds`: fixed-breakpoint classification of a risk score into an
//!   ordinal alert tier.

pub mod thresholds;

pub use thresholds::{AlertClassifier, AlertThresholds, AlertTier};
