//! # Portfolio Objectives
//!
//! $$
//! f_{\mathrm{mv}}(\mathbf w)=\mathbf w^\top\Sigma\mathbf w,\qquad
//! f_{\mathrm{sr}}(\mathbf w)=-\frac{\mu^\top\mathbf w-r_f}{\sqrt{\mathbf w^\top\Sigma\mathbf w}},\qquad
//! f_{\mathrm{mr}}(\mathbf w)=-\mu^\top\mathbf w
//! $$
//!
//! Cost functions (with analytic gradients) for the iterative objectives and a
//! closed-form allocation for the linear one.

use argmin::core::CostFunction;
use argmin::core::Gradient;

use super::moments::MomentEstimates;
use super::types::Bounds;

fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Portfolio variance `w' Sigma w`.
#[derive(Clone, Copy, Debug)]
pub struct MinVarianceCost<'a> {
  moments: &'a MomentEstimates,
}

impl<'a> MinVarianceCost<'a> {
  /// Variance objective over `moments`.
  pub fn new(moments: &'a MomentEstimates) -> Self {
    Self { moments }
  }
}

impl CostFunction for MinVarianceCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let sigma_w = self.moments.covariance_times(w);
    Ok(dot(w, &sigma_w))
  }
}

impl Gradient for MinVarianceCost<'_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    Ok(
      self
        .moments
        .covariance_times(w)
        .into_iter()
        .map(|v| 2.0 * v)
        .collect(),
    )
  }
}

/// Negated Sharpe ratio, so that the solver can minimize it.
#[derive(Clone, Copy, Debug)]
pub struct MaxSharpeCost<'a> {
  moments: &'a MomentEstimates,
  risk_free: f64,
}

impl<'a> MaxSharpeCost<'a> {
  /// Negated Sharpe objective over `moments` with risk-free rate `risk_free`.
  pub fn new(moments: &'a MomentEstimates, risk_free: f64) -> Self {
    Self { moments, risk_free }
  }
}

impl CostFunction for MaxSharpeCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let sigma_w = self.moments.covariance_times(w);
    let var = dot(w, &sigma_w);
    if !(var > f64::MIN_POSITIVE) {
      // acts as a barrier for the line search
      return Ok(f64::INFINITY);
    }
    let excess = self.moments.portfolio_return(w) - self.risk_free;
    Ok(-excess / var.sqrt())
  }
}

impl Gradient for MaxSharpeCost<'_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    let sigma_w = self.moments.covariance_times(w);
    let var = dot(w, &sigma_w);
    if !(var > f64::MIN_POSITIVE) {
      return Ok(vec![0.0; w.len()]);
    }

    let vol = var.sqrt();
    let excess = self.moments.portfolio_return(w) - self.risk_free;
    let grad = self
      .moments
      .mean()
      .iter()
      .zip(sigma_w.iter())
      .map(|(&mu_i, &sw_i)| -(mu_i / vol - excess * sw_i / (var * vol)))
      .collect();

    Ok(grad)
  }
}

/// Linear program `max mu'w` over the fully-invested box, solved greedily.
///
/// Every asset starts at its lower bound; the remaining budget goes to the
/// highest-mean group first. Assets whose means lie within `tie_tol` of the
/// group leader share that group's allocation equally (capped by their upper
/// bounds), so the result does not depend on asset order.
pub fn max_return_weights(mean: &[f64], bounds: &Bounds, tie_tol: f64) -> Vec<f64> {
  let n = mean.len();
  let mut w = bounds.lower.clone();
  let mut budget = 1.0 - w.iter().sum::<f64>();

  let mut order: Vec<usize> = (0..n).collect();
  order.sort_by(|&a, &b| {
    mean[b]
      .partial_cmp(&mean[a])
      .unwrap_or(std::cmp::Ordering::Equal)
  });

  let mut start = 0;
  while start < n && budget > 0.0 {
    let head = mean[order[start]];
    let mut end = start + 1;
    while end < n && (head - mean[order[end]]).abs() <= tie_tol {
      end += 1;
    }

    let group = &order[start..end];
    let capacity: f64 = group.iter().map(|&i| bounds.upper[i] - bounds.lower[i]).sum();

    if capacity <= budget {
      for &i in group {
        w[i] = bounds.upper[i];
      }
      budget -= capacity;
    } else {
      for (i, share) in water_fill(group, bounds, budget) {
        w[i] += share;
      }
      budget = 0.0;
    }

    start = end;
  }

  w
}

/// Split `budget` equally across `group`, redistributing what capped members cannot take.
fn water_fill(group: &[usize], bounds: &Bounds, budget: f64) -> Vec<(usize, f64)> {
  let mut by_capacity: Vec<(usize, f64)> = group
    .iter()
    .map(|&i| (i, bounds.upper[i] - bounds.lower[i]))
    .collect();
  by_capacity.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

  let mut remaining = budget;
  let mut left = by_capacity.len();
  let mut out = Vec::with_capacity(left);

  for (i, cap) in by_capacity {
    let share = remaining / left as f64;
    let take = cap.min(share);
    out.push((i, take));
    remaining -= take;
    left -= 1;
  }

  out
}
