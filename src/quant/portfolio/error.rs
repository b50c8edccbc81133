//! # Portfolio Errors
//!
//! $$
//! \kappa(\Sigma) = \frac{\lambda_{\max}}{\lambda_{\min}}
//! $$
//!
//! Failure modes surfaced by the optimizers, each carrying enough context for
//! the caller to pick a fallback allocation.

use thiserror::Error;

use super::types::ObjectiveKind;

/// Errors returned by [`crate::quant::portfolio::optimize`] and friends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
  /// Too few observations to estimate a variance, or an empty universe.
  #[error("insufficient data: {n_periods} periods x {n_assets} assets (need at least 2 periods and 1 asset)")]
  InsufficientData {
    n_periods: usize,
    n_assets: usize,
  },

  /// Malformed input that is not a data-size or bounds problem.
  #[error("invalid input: {reason}")]
  InvalidInput { reason: String },

  /// Bounds are inconsistent or leave no fully-invested portfolio.
  #[error("invalid bounds for {n_assets} assets: {reason}")]
  InvalidBounds { n_assets: usize, reason: String },

  /// Covariance is not safely invertible for the requested objective.
  #[error("{objective}: covariance of {n_assets} assets is numerically singular (condition number {condition_number:e}, threshold {threshold:e})")]
  SingularCovariance {
    objective: ObjectiveKind,
    n_assets: usize,
    condition_number: f64,
    threshold: f64,
  },

  /// The Sharpe ratio cannot be formed: flat excess return or near-zero volatility.
  #[error("{objective}: degenerate objective over {n_assets} assets ({reason}, statistic {statistic:e})")]
  DegenerateObjective {
    objective: ObjectiveKind,
    n_assets: usize,
    reason: String,
    statistic: f64,
  },

  /// The solver exhausted its iteration budget twice.
  #[error("{objective}: no convergence for {n_assets} assets after {iterations} iterations and one retry")]
  NonConvergence {
    objective: ObjectiveKind,
    n_assets: usize,
    iterations: u64,
  },

  /// The configured wall-clock budget ran out.
  #[error("{objective}: time budget of {budget_ms} ms exceeded for {n_assets} assets")]
  Timeout {
    objective: ObjectiveKind,
    n_assets: usize,
    budget_ms: u128,
  },

  /// Error raised by the solver framework itself.
  #[error("{objective}: solver failure: {message}")]
  Solver {
    objective: ObjectiveKind,
    message: String,
  },
}

impl OptimizeError {
  /// Whether the caller can reasonably fall back to an equal-weight allocation.
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      OptimizeError::SingularCovariance { .. } | OptimizeError::DegenerateObjective { .. }
    )
  }
}

pub type OptimizeResult<T> = Result<T, OptimizeError>;
