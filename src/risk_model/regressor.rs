//! Gradient-boosted tree regressor.
//!
//! Wraps `gbdt::gradient_boost::GBDT` with squared-error loss. The gbdt crate
//! works in `f32` internally; rows are converted at the boundary and
//! predictions widened back to `f64`.

use gbdt::config::Config;
use gbdt::decision_tree::Data;
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};

use super::ModelError;

/// Anything that maps scaled feature rows to raw scores.
pub trait Regressor {
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64>;

    /// Row width the regressor was fitted on.
    fn feature_count(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Boosting rounds.
    pub n_estimators: usize,
    pub max_depth: u32,
    /// Shrinkage applied to each tree's contribution.
    pub learning_rate: f64,
    pub min_leaf_size: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 5,
            learning_rate: 0.1,
            min_leaf_size: 1,
        }
    }
}

fn to_f32(row: &[f64]) -> Vec<f32> {
    row.iter().map(|&v| v as f32).collect()
}

#[derive(Serialize, Deserialize)]
pub struct GbdtRegressor {
    model: GBDT,
    feature_count: usize,
}

impl GbdtRegressor {
    /// Trains on `rows` (already scaled) against `labels`.
    pub fn fit(rows: &[Vec<f64>], labels: &[f64], params: &Hyperparameters) -> Result<Self, ModelError> {
        if rows.is_empty() {
            return Err(ModelError::InsufficientData("no training rows".to_string()));
        }
        if rows.len() != labels.len() {
            return Err(ModelError::InvalidInput(format!(
                "row count ({}) does not match label count ({})",
                rows.len(),
                labels.len()
            )));
        }
        if params.n_estimators == 0 || params.max_depth == 0 {
            return Err(ModelError::InvalidInput(
                "n_estimators and max_depth must be positive".to_string(),
            ));
        }

        let feature_count = rows[0].len();

        let mut cfg = Config::new();
        cfg.set_feature_size(feature_count);
        cfg.set_max_depth(params.max_depth);
        cfg.set_iterations(params.n_estimators);
        cfg.set_shrinkage(params.learning_rate as f32);
        cfg.set_loss("SquaredError");
        cfg.set_debug(false);
        cfg.set_training_optimization_level(2);
        cfg.set_min_leaf_size(params.min_leaf_size.max(1));

        let mut model = GBDT::new(&cfg);
        let mut training_data: Vec<Data> = rows
            .iter()
            .zip(labels)
            .map(|(row, &label)| Data::new_training_data(to_f32(row), 1.0_f32, label as f32, None))
            .collect();
        model.fit(&mut training_data);

        Ok(Self { model, feature_count })
    }
}

impl Regressor for GbdtRegressor {
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        if rows.is_empty() {
            return Vec::new();
        }
        let data: Vec<Data> = rows
            .iter()
            .map(|row| Data::new_test_data(to_f32(row), None))
            .collect();
        self.model.predict(&data).into_iter().map(f64::from).collect()
    }

    fn feature_count(&self) -> usize {
        self.feature_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> Hyperparameters {
        Hyperparameters {
            n_estimators: 30,
            max_depth: 3,
            learning_rate: 0.3,
            min_leaf_size: 1,
        }
    }

    #[test]
    fn test_fit_separates_two_clusters() {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            rows.push(vec![-1.0 - i as f64 * 0.01, 0.5]);
            labels.push(10.0);
            rows.push(vec![1.0 + i as f64 * 0.01, 0.5]);
            labels.push(80.0);
        }
        let model = GbdtRegressor::fit(&rows, &labels, &small_params()).expect("training should succeed");
        let preds = model.predict(&[vec![-1.05, 0.5], vec![1.05, 0.5]]);
        assert_eq!(preds.len(), 2);
        assert!(preds[1] > preds[0] + 30.0, "predictions {:?}", preds);
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        assert!(GbdtRegressor::fit(&[], &[], &small_params()).is_err());
        assert!(GbdtRegressor::fit(&[vec![1.0]], &[1.0, 2.0], &small_params()).is_err());
    }

    #[test]
    fn test_predict_empty_batch() {
        let model = GbdtRegressor::fit(&[vec![0.0], vec![1.0]], &[0.0, 1.0], &small_params()).unwrap();
        assert!(model.predict(&[]).is_empty());
    }
}
