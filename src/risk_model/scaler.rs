/// Per-column standardization: `(x - mean) / scale`.
///
/// Fitted on training rows only; non-finite values are ignored when fitting.
/// Columns with zero variance (or no finite values) get scale 1 so they pass
/// through centred instead of dividing by zero.
use serde::{Deserialize, Serialize};

use super::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, ModelError> {
        let width = rows
            .first()
            .map(|r| r.len())
            .ok_or_else(|| ModelError::InsufficientData("cannot fit scaler on zero rows".to_string()))?;
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(ModelError::InvalidInput(format!(
                "ragged feature matrix: expected {} columns, found {}",
                width,
                bad.len()
            )));
        }

        let mut mean = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);
        for col in 0..width {
            let values: Vec<f64> = rows.iter().map(|r| r[col]).filter(|v| v.is_finite()).collect();
            if values.is_empty() {
                mean.push(0.0);
                scale.push(1.0);
                continue;
            }
            let n = values.len() as f64;
            let m = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std > 0.0 { std } else { 1.0 });
        }

        Ok(Self { mean, scale })
    }

    /// Pass-through scaler of the given width.
    pub fn identity(width: usize) -> Self {
        Self {
            mean: vec![0.0; width],
            scale: vec![1.0; width],
        }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Scales one row. `NaN` inputs stay `NaN`.
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}
