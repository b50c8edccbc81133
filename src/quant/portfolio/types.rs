//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbb E[R_p]-r_f}{\sigma_p},\quad \mathbf 1^\top\mathbf w = 1,\ \ \ell\le\mathbf w\le u
//! $$
//!
//! Shared enums, bounds and result containers for portfolio optimization.

use std::fmt::Display;
use std::str::FromStr;

use impl_new_derive::ImplNew;

use super::error::OptimizeError;
use super::error::OptimizeResult;

/// Absolute slack allowed when checking that bounds admit a fully-invested portfolio.
const BOUNDS_SUM_TOL: f64 = 1e-12;

/// Supported optimization objectives.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectiveKind {
  /// Maximize `(mu'w - r_f) / sqrt(w' Sigma w)`.
  #[default]
  MaxSharpe,
  /// Minimize `w' Sigma w`.
  MinVariance,
  /// Maximize `mu'w`.
  MaxReturn,
}

impl ObjectiveKind {
  pub const ALL: [ObjectiveKind; 3] = [
    ObjectiveKind::MaxSharpe,
    ObjectiveKind::MinVariance,
    ObjectiveKind::MaxReturn,
  ];

  /// Objectives whose solution depends on a well-conditioned covariance.
  pub fn needs_covariance(&self) -> bool {
    matches!(self, ObjectiveKind::MaxSharpe | ObjectiveKind::MinVariance)
  }
}

impl Display for ObjectiveKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ObjectiveKind::MaxSharpe => write!(f, "max_sharpe"),
      ObjectiveKind::MinVariance => write!(f, "min_variance"),
      ObjectiveKind::MaxReturn => write!(f, "max_return"),
    }
  }
}

impl FromStr for ObjectiveKind {
  type Err = OptimizeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "max_sharpe" | "max-sharpe" | "maxsharpe" | "sharpe" => Ok(Self::MaxSharpe),
      "min_variance" | "min-variance" | "minvariance" | "min-var" | "minvar" => {
        Ok(Self::MinVariance)
      }
      "max_return" | "max-return" | "maxreturn" => Ok(Self::MaxReturn),
      other => Err(OptimizeError::InvalidInput {
        reason: format!("unknown objective '{other}'"),
      }),
    }
  }
}

/// Per-asset weight bounds.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct Bounds {
  /// Lower bound per asset.
  pub lower: Vec<f64>,
  /// Upper bound per asset.
  pub upper: Vec<f64>,
}

impl Bounds {
  /// `[0, 1]` for every asset: long-only, fully invested.
  pub fn long_only(n: usize) -> Self {
    Self::uniform(n, 0.0, 1.0)
  }

  /// Same `[lower, upper]` box for every asset.
  pub fn uniform(n: usize, lower: f64, upper: f64) -> Self {
    Self {
      lower: vec![lower; n],
      upper: vec![upper; n],
    }
  }

  /// Number of assets covered.
  pub fn len(&self) -> usize {
    self.lower.len()
  }

  /// Whether no asset is covered.
  pub fn is_empty(&self) -> bool {
    self.lower.is_empty()
  }

  /// True when no lower bound is negative.
  pub fn is_long_only(&self) -> bool {
    self.lower.iter().all(|&l| l >= 0.0)
  }

  /// Check that the bounds describe a non-empty feasible region for `n` assets.
  pub fn validate(&self, n: usize) -> OptimizeResult<()> {
    let invalid = |reason: String| OptimizeError::InvalidBounds {
      n_assets: n,
      reason,
    };

    if self.lower.len() != n || self.upper.len() != n {
      return Err(invalid(format!(
        "expected {n} lower and upper bounds, got {} and {}",
        self.lower.len(),
        self.upper.len()
      )));
    }

    for (i, (&lo, &hi)) in self.lower.iter().zip(self.upper.iter()).enumerate() {
      if !lo.is_finite() || !hi.is_finite() {
        return Err(invalid(format!("bounds for asset {i} are not finite")));
      }
      if lo > hi {
        return Err(invalid(format!(
          "lower bound {lo} exceeds upper bound {hi} for asset {i}"
        )));
      }
    }

    let lo_sum: f64 = self.lower.iter().sum();
    if lo_sum > 1.0 + BOUNDS_SUM_TOL {
      return Err(invalid(format!("sum of lower bounds {lo_sum} exceeds 1")));
    }

    let hi_sum: f64 = self.upper.iter().sum();
    if hi_sum < 1.0 - BOUNDS_SUM_TOL {
      return Err(invalid(format!("sum of upper bounds {hi_sum} is below 1")));
    }

    Ok(())
  }
}

/// Target weights keyed by asset identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightVector {
  assets: Vec<String>,
  weights: Vec<f64>,
}

impl WeightVector {
  /// Pair weights with their asset identifiers.
  pub(crate) fn from_parts(assets: Vec<String>, weights: Vec<f64>) -> Self {
    debug_assert_eq!(assets.len(), weights.len());
    Self { assets, weights }
  }

  /// Equal-weight allocation, the usual fallback for recoverable failures.
  pub fn equal(assets: &[String]) -> Self {
    let n = assets.len();
    let w = if n == 0 { 0.0 } else { 1.0 / n as f64 };
    Self {
      assets: assets.to_vec(),
      weights: vec![w; n],
    }
  }

  /// Asset identifiers, in weight order.
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// Raw weights.
  pub fn weights(&self) -> &[f64] {
    &self.weights
  }

  /// Weight of `asset`, if it belongs to the universe.
  pub fn get(&self, asset: &str) -> Option<f64> {
    self
      .assets
      .iter()
      .position(|a| a == asset)
      .map(|i| self.weights[i])
  }

  /// Iterate over `(asset, weight)` pairs.
  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .assets
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }

  /// Number of assets.
  pub fn len(&self) -> usize {
    self.weights.len()
  }

  /// Whether the universe is empty.
  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  /// Sum of weights.
  pub fn sum(&self) -> f64 {
    self.weights.iter().sum()
  }
}

/// Output of a portfolio optimization run.
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioResult {
  /// Objective that produced the weights.
  pub objective: ObjectiveKind,
  /// Final portfolio weights.
  pub weights: WeightVector,
  /// Model expected portfolio return, in the units of the input returns.
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`, 0 when volatility vanishes.
  pub sharpe: f64,
  /// Solver iterations spent, summed over the retry when one happened.
  pub iterations: u64,
  /// Whether the jittered retry path was taken.
  pub retried: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn objective_parses_ui_identifiers() {
    assert_eq!(
      "max_sharpe".parse::<ObjectiveKind>(),
      Ok(ObjectiveKind::MaxSharpe)
    );
    assert_eq!(
      "Min-Variance".parse::<ObjectiveKind>(),
      Ok(ObjectiveKind::MinVariance)
    );
    assert_eq!(
      " maxreturn ".parse::<ObjectiveKind>(),
      Ok(ObjectiveKind::MaxReturn)
    );
    assert!("first_two_moments".parse::<ObjectiveKind>().is_err());

    for kind in ObjectiveKind::ALL {
      assert_eq!(kind.to_string().parse::<ObjectiveKind>(), Ok(kind));
    }
  }

  #[test]
  fn upper_bounds_too_tight_are_rejected() {
    let bounds = Bounds::uniform(5, 0.0, 0.1);
    let err = bounds.validate(5).unwrap_err();
    assert!(matches!(err, OptimizeError::InvalidBounds { n_assets: 5, .. }));
  }

  #[test]
  fn lower_bounds_too_large_are_rejected() {
    let bounds = Bounds::new(vec![0.6, 0.6], vec![1.0, 1.0]);
    assert!(bounds.validate(2).is_err());
  }

  #[test]
  fn crossed_and_mismatched_bounds_are_rejected() {
    let crossed = Bounds::new(vec![0.5, 0.0], vec![0.2, 1.0]);
    assert!(crossed.validate(2).is_err());
    assert!(Bounds::long_only(3).validate(2).is_err());
    assert!(Bounds::new(vec![f64::NAN], vec![1.0]).validate(1).is_err());
  }

  #[test]
  fn short_bounds_are_accepted() {
    let bounds = Bounds::uniform(3, -0.5, 1.5);
    assert!(bounds.validate(3).is_ok());
    assert!(!bounds.is_long_only());
    assert!(Bounds::long_only(3).is_long_only());
  }

  #[test]
  fn equal_weight_vector_lookup() {
    let assets = vec!["BAC".to_string(), "JPM".to_string(), "GS".to_string()];
    let w = WeightVector::equal(&assets);
    assert_eq!(w.len(), 3);
    assert!((w.sum() - 1.0).abs() < 1e-12);
    assert_eq!(w.get("JPM"), Some(1.0 / 3.0));
    assert_eq!(w.get("C"), None);
    assert_eq!(w.iter().next(), Some(("BAC", 1.0 / 3.0)));
  }
}
