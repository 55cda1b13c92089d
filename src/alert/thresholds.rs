//! Risk score → alert tier classification.
//!
//! The model produces a continuous score in [0, 100]; operators work with
//! four ordinal tiers. Breakpoints are inclusive at the lower bound of each
//! tier:
//!
//! | score          | tier   | risk code |
//! |----------------|--------|-----------|
//! | ≥ red (70)     | RED    | R4        |
//! | ≥ orange (50)  | ORANGE | R3        |
//! | ≥ yellow (30)  | YELLOW | R2        |
//! | below          | GREEN  | R1        |
//!
//! Breakpoints are configurable; the defaults above apply when the caller
//! supplies nothing.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Alert tiers, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertTier {
    Green,
    Yellow,
    Orange,
    Red,
}

impl AlertTier {
    pub const ALL: [AlertTier; 4] = [
        AlertTier::Green,
        AlertTier::Yellow,
        AlertTier::Orange,
        AlertTier::Red,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertTier::Green => "GREEN",
            AlertTier::Yellow => "YELLOW",
            AlertTier::Orange => "ORANGE",
            AlertTier::Red => "RED",
        }
    }

    /// Four-level risk code carried alongside the tier in published records.
    pub fn risk_level(&self) -> &'static str {
        match self {
            AlertTier::Green => "R1",
            AlertTier::Yellow => "R2",
            AlertTier::Orange => "R3",
            AlertTier::Red => "R4",
        }
    }
}

impl std::fmt::Display for AlertTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GREEN" => Ok(AlertTier::Green),
            "YELLOW" => Ok(AlertTier::Yellow),
            "ORANGE" => Ok(AlertTier::Orange),
            "RED" => Ok(AlertTier::Red),
            other => Err(format!("unknown alert tier '{}'", other)),
        }
    }
}

/// Lower bounds of the YELLOW, ORANGE and RED tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    yellow: f64,
    orange: f64,
    red: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            yellow: 30.0,
            orange: 50.0,
            red: 70.0,
        }
    }
}

impl AlertThresholds {
    /// Builds a breakpoint set. Breakpoints must be finite and strictly
    /// ascending (yellow < orange < red).
    pub fn new(yellow: f64, orange: f64, red: f64) -> Result<Self, String> {
        if !(yellow.is_finite() && orange.is_finite() && red.is_finite()) {
            return Err("alert breakpoints must be finite".to_string());
        }
        if !(yellow < orange && orange < red) {
            return Err(format!(
                "alert breakpoints must ascend: yellow {} < orange {} < red {}",
                yellow, orange, red
            ));
        }
        Ok(Self { yellow, orange, red })
    }

    pub fn yellow(&self) -> f64 {
        self.yellow
    }

    pub fn orange(&self) -> f64 {
        self.orange
    }

    pub fn red(&self) -> f64 {
        self.red
    }
}

/// Maps risk scores to alert tiers.
#[derive(Debug, Clone, Default)]
pub struct AlertClassifier {
    thresholds: AlertThresholds,
}

impl AlertClassifier {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Classifies any `f64`. Scores outside [0, 100] still land in a tier;
    /// `NaN` compares false against every breakpoint and lands in GREEN.
    pub fn classify(&self, score: f64) -> AlertTier {
        // Check breakpoints in descending order of severity
        if score >= self.thresholds.red {
            AlertTier::Red
        } else if score >= self.thresholds.orange {
            AlertTier::Orange
        } else if score >= self.thresholds.yellow {
            AlertTier::Yellow
        } else {
            AlertTier::Green
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
