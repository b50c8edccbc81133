//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\*_d = \operatorname{Optimize}(\hat\mu_d, \hat\Sigma_d, \mathcal C),\qquad d = 1,\dots,D
//! $$
//!
//! Per-rebalance orchestration: one configured objective applied to one or many
//! return windows.

use rayon::prelude::*;

use super::data::ReturnSample;
use super::error::OptimizeResult;
use super::moments::MomentEstimates;
use super::optimizers::OptimizerConfig;
use super::optimizers::optimize;
use super::projection::project_onto_budget;
use super::types::ObjectiveKind;
use super::types::PortfolioResult;
use super::types::WeightVector;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngineConfig {
  /// Objective used by every call.
  pub objective: ObjectiveKind,
  /// Risk-free rate, bounds and solver settings.
  pub optimizer: OptimizerConfig,
}

/// Single entry point invoked once per rebalancing date.
#[derive(Clone, Debug)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct an engine for one objective and optimizer configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow the engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Optimize one return window.
  pub fn optimize(&self, sample: &ReturnSample) -> OptimizeResult<PortfolioResult> {
    optimize(sample, self.config.objective, &self.config.optimizer)
  }

  /// Optimize independent windows in parallel; results keep the input order.
  pub fn optimize_batch(&self, samples: &[ReturnSample]) -> Vec<OptimizeResult<PortfolioResult>> {
    samples
      .par_iter()
      .map(|sample| self.optimize(sample))
      .collect()
  }

  /// Like [`Self::optimize`], but answers recoverable failures with the
  /// equal-weight portfolio (projected onto the configured bounds).
  pub fn optimize_or_equal_weight(&self, sample: &ReturnSample) -> OptimizeResult<PortfolioResult> {
    match self.optimize(sample) {
      Ok(result) => Ok(result),
      Err(err) if err.is_recoverable() => {
        tracing::warn!(
          objective = %self.config.objective,
          n_assets = sample.n_assets(),
          error = %err,
          "falling back to equal weights"
        );
        self.equal_weight(sample)
      }
      Err(err) => Err(err),
    }
  }

  /// Equal-weight portfolio (projected onto the configured bounds) with its statistics.
  pub fn equal_weight(&self, sample: &ReturnSample) -> OptimizeResult<PortfolioResult> {
    let moments = MomentEstimates::estimate(sample)?;
    let equal = WeightVector::equal(sample.assets());
    let weights = match &self.config.optimizer.bounds {
      Some(bounds) => project_onto_budget(equal.weights(), bounds),
      None => equal.weights().to_vec(),
    };

    let rf = self.config.optimizer.risk_free_rate;
    let expected_return = moments.portfolio_return(&weights);
    let volatility = moments.portfolio_variance(&weights).max(0.0).sqrt();
    let sharpe = moments.sharpe_ratio(&weights, rf);

    Ok(PortfolioResult {
      objective: self.config.objective,
      weights: WeightVector::from_parts(sample.assets().to_vec(), weights),
      expected_return,
      volatility,
      sharpe,
      iterations: 0,
      retried: false,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;
  use crate::quant::portfolio::error::OptimizeError;
  use crate::quant::portfolio::types::Bounds;

  fn sample(returns: Array2<f64>) -> ReturnSample {
    let assets = (0..returns.ncols()).map(|i| format!("A{i}")).collect();
    ReturnSample::new(assets, returns).unwrap()
  }

  fn engine(objective: ObjectiveKind) -> PortfolioEngine {
    PortfolioEngine::new(PortfolioEngineConfig {
      objective,
      ..PortfolioEngineConfig::default()
    })
  }

  #[test]
  fn default_engine_maximizes_sharpe() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig::default());
    assert_eq!(engine.config().objective, ObjectiveKind::MaxSharpe);
    assert_eq!(engine.config().optimizer.risk_free_rate, 0.0);
  }

  #[test]
  fn batch_keeps_input_order() {
    let windows = vec![
      sample(array![[0.02, 0.01], [0.04, 0.01]]),
      sample(array![[0.01, 0.03], [0.01, 0.05]]),
      sample(array![[0.01]]),
    ];
    let results = engine(ObjectiveKind::MaxReturn).optimize_batch(&windows);

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().weights.weights(), &[1.0, 0.0]);
    assert_eq!(results[1].as_ref().unwrap().weights.weights(), &[0.0, 1.0]);
    assert!(matches!(
      results[2],
      Err(OptimizeError::InsufficientData { n_periods: 1, .. })
    ));
  }

  #[test]
  fn batch_matches_sequential_calls() {
    let windows: Vec<ReturnSample> = (0..4)
      .map(|k| {
        sample(Array2::from_shape_fn((8, 3), |(t, i)| {
          0.002 * (((t + 1) * (i + 2) + k) % 7) as f64 - 0.005 + 0.001 * i as f64
        }))
      })
      .collect();
    let engine = engine(ObjectiveKind::MinVariance);

    let batch = engine.optimize_batch(&windows);
    for (window, parallel) in windows.iter().zip(batch) {
      assert_eq!(engine.optimize(window), parallel);
    }
  }

  #[test]
  #[traced_test]
  fn singular_window_falls_back_to_equal_weights() {
    let s = sample(array![[0.01, 0.01, 0.0], [0.02, 0.02, 0.01], [-0.01, -0.01, 0.02]]);
    let engine = engine(ObjectiveKind::MinVariance);

    assert!(matches!(
      engine.optimize(&s),
      Err(OptimizeError::SingularCovariance { .. })
    ));
    let result = engine.optimize_or_equal_weight(&s).unwrap();
    for &w in result.weights.weights() {
      assert_abs_diff_eq!(w, 1.0 / 3.0, epsilon = 1e-12);
    }
    assert_eq!(result.iterations, 0);
    assert!(logs_contain("falling back to equal weights"));
  }

  #[test]
  fn fallback_respects_bounds() {
    let s = sample(array![[0.01, 0.01, 0.0], [0.02, 0.02, 0.01], [-0.01, -0.01, 0.02]]);
    let bounds = Bounds::new(vec![0.0, 0.0, 0.5], vec![1.0, 1.0, 1.0]);
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      objective: ObjectiveKind::MinVariance,
      optimizer: OptimizerConfig::default().with_bounds(bounds),
    });

    let result = engine.optimize_or_equal_weight(&s).unwrap();
    let w = result.weights.weights();
    assert_abs_diff_eq!(w[2], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(w[0], 0.25, epsilon = 1e-12);
    assert_abs_diff_eq!(w[1], 0.25, epsilon = 1e-12);
  }

  #[test]
  fn equal_weight_reports_statistics() {
    let s = sample(array![[0.02, 0.0], [0.0, 0.02]]);
    let result = engine(ObjectiveKind::MaxSharpe).equal_weight(&s).unwrap();
    assert_eq!(result.weights.weights(), &[0.5, 0.5]);
    assert_abs_diff_eq!(result.expected_return, 0.01, epsilon = 1e-12);
    // perfectly anti-correlated pair: the even mix carries no risk
    assert_abs_diff_eq!(result.volatility, 0.0, epsilon = 1e-12);
    assert_eq!(result.sharpe, 0.0);
    assert!(!result.retried);
  }

  #[test]
  fn unrecoverable_errors_pass_through() {
    let s = sample(array![[0.01, 0.02]]);
    let err = engine(ObjectiveKind::MinVariance)
      .optimize_or_equal_weight(&s)
      .unwrap_err();
    assert!(!err.is_recoverable());
  }
}
