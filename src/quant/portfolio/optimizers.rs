//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf w}\ f(\mathbf w)\quad\text{s.t.}\quad \mathbf 1^\top\mathbf w = 1,\ \ \ell\le\mathbf w\le u
//! $$
//!
//! Entry points turning a return sample (or precomputed moments) and an
//! objective into a normalized weight vector.

use std::time::Duration;

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::State;
use argmin::core::TerminationReason;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::data::ReturnSample;
use super::error::OptimizeError;
use super::error::OptimizeResult;
use super::moments::MomentEstimates;
use super::objectives::MaxSharpeCost;
use super::objectives::MinVarianceCost;
use super::objectives::max_return_weights;
use super::projection::project_onto_budget;
use super::solver::ProjectedGradient;
use super::solver::TIME_BUDGET_EXIT;
use super::types::Bounds;
use super::types::ObjectiveKind;
use super::types::PortfolioResult;
use super::types::WeightVector;

/// Numerical knobs of the optimizers.
#[derive(Clone, Debug)]
pub struct SolverSettings {
  /// Iteration budget of a single solver run.
  pub max_iters: u64,
  /// Convergence threshold on the largest per-asset move of a full projected step.
  pub tolerance: f64,
  /// Covariance condition number above which inversion-type objectives fail.
  pub max_condition_number: f64,
  /// Excess return spread / volatility below which the Sharpe ratio is degenerate.
  pub degenerate_epsilon: f64,
  /// Absolute distance under which two mean returns count as tied.
  pub tie_tolerance: f64,
  /// Sum drift beyond which final weights are divided by their sum.
  pub renormalize_tolerance: f64,
  /// Half-width of the uniform jitter added before the retry.
  pub jitter_scale: f64,
  /// Seed of the retry jitter.
  pub jitter_seed: u64,
  /// Optional wall-clock budget per solver run.
  pub time_budget: Option<Duration>,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      max_iters: 10_000,
      tolerance: 1e-10,
      max_condition_number: 1e10,
      degenerate_epsilon: 1e-12,
      tie_tolerance: 1e-12,
      renormalize_tolerance: 1e-6,
      jitter_scale: 1e-3,
      jitter_seed: 42,
      time_budget: None,
    }
  }
}

/// Per-call optimizer configuration.
#[derive(Clone, Debug, Default)]
pub struct OptimizerConfig {
  /// Risk-free rate, used by [`ObjectiveKind::MaxSharpe`] only.
  pub risk_free_rate: f64,
  /// Weight bounds; `None` means long-only `[0, 1]` for every asset.
  pub bounds: Option<Bounds>,
  /// Starting point of the iterative solvers; `None` means equal weights.
  pub initial_guess: Option<Vec<f64>>,
  /// Numerical settings.
  pub solver: SolverSettings,
}

impl OptimizerConfig {
  /// Set the risk-free rate.
  pub fn with_risk_free_rate(mut self, risk_free_rate: f64) -> Self {
    self.risk_free_rate = risk_free_rate;
    self
  }

  /// Set explicit per-asset bounds.
  pub fn with_bounds(mut self, bounds: Bounds) -> Self {
    self.bounds = Some(bounds);
    self
  }

  /// Start the iterative solvers from `guess`.
  pub fn with_initial_guess(mut self, guess: Vec<f64>) -> Self {
    self.initial_guess = Some(guess);
    self
  }

  /// Replace the numerical settings.
  pub fn with_solver(mut self, solver: SolverSettings) -> Self {
    self.solver = solver;
    self
  }
}

/// Raw weights produced by one objective, before post-processing.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveOutcome {
  pub weights: Vec<f64>,
  pub iterations: u64,
  pub retried: bool,
}

struct RunOutcome {
  param: Vec<f64>,
  iterations: u64,
  converged: bool,
}

/// Estimate moments from `sample` and optimize.
pub fn optimize(
  sample: &ReturnSample,
  objective: ObjectiveKind,
  config: &OptimizerConfig,
) -> OptimizeResult<PortfolioResult> {
  let moments = MomentEstimates::estimate(sample)?;
  optimize_moments(sample.assets(), &moments, objective, config)
}

/// Optimize from precomputed moments.
pub fn optimize_moments(
  assets: &[String],
  moments: &MomentEstimates,
  objective: ObjectiveKind,
  config: &OptimizerConfig,
) -> OptimizeResult<PortfolioResult> {
  let n = moments.n_assets();
  if n == 0 {
    return Err(OptimizeError::InsufficientData {
      n_periods: 0,
      n_assets: 0,
    });
  }
  if assets.len() != n {
    return Err(OptimizeError::InvalidInput {
      reason: format!("{} asset identifiers for {n} estimated assets", assets.len()),
    });
  }

  let bounds = match &config.bounds {
    Some(bounds) => bounds.clone(),
    None => Bounds::long_only(n),
  };
  bounds.validate(n)?;

  let settings = &config.solver;
  let rf = config.risk_free_rate;

  if objective.needs_covariance() {
    let condition_number = match objective {
      ObjectiveKind::MinVariance => moments.budget_condition_number(),
      _ => moments.condition_number(),
    };
    tracing::debug!(%objective, n_assets = n, condition_number, "covariance conditioning");
    if !(condition_number <= settings.max_condition_number) {
      return Err(OptimizeError::SingularCovariance {
        objective,
        n_assets: n,
        condition_number,
        threshold: settings.max_condition_number,
      });
    }
  }

  if objective == ObjectiveKind::MaxSharpe {
    let spread = moments
      .mean()
      .iter()
      .fold(0.0_f64, |m, mu| m.max((mu - rf).abs()));
    if spread <= settings.degenerate_epsilon {
      return Err(OptimizeError::DegenerateObjective {
        objective,
        n_assets: n,
        reason: "every asset's mean return equals the risk-free rate".to_string(),
        statistic: spread,
      });
    }
  }

  let outcome = objective.compute_weights(moments, &bounds, config)?;
  let weights = finalize_weights(outcome.weights, &bounds, settings.renormalize_tolerance);

  let expected_return = moments.portfolio_return(&weights);
  let volatility = moments.portfolio_variance(&weights).max(0.0).sqrt();

  if objective == ObjectiveKind::MaxSharpe && volatility <= settings.degenerate_epsilon {
    return Err(OptimizeError::DegenerateObjective {
      objective,
      n_assets: n,
      reason: "portfolio volatility is numerically zero".to_string(),
      statistic: volatility,
    });
  }

  let sharpe = if volatility > 1e-15 {
    (expected_return - rf) / volatility
  } else {
    0.0
  };

  tracing::debug!(
    %objective,
    n_assets = n,
    iterations = outcome.iterations,
    retried = outcome.retried,
    expected_return,
    volatility,
    "portfolio optimized"
  );

  Ok(PortfolioResult {
    objective,
    weights: WeightVector::from_parts(assets.to_vec(), weights),
    expected_return,
    volatility,
    sharpe,
    iterations: outcome.iterations,
    retried: outcome.retried,
  })
}

impl ObjectiveKind {
  /// Solve this objective over `bounds`, which must fit the estimated universe.
  pub fn compute_weights(
    &self,
    moments: &MomentEstimates,
    bounds: &Bounds,
    config: &OptimizerConfig,
  ) -> OptimizeResult<SolveOutcome> {
    bounds.validate(moments.n_assets())?;

    match self {
      ObjectiveKind::MaxReturn => {
        let mean = moments.mean().to_vec();
        Ok(SolveOutcome {
          weights: max_return_weights(&mean, bounds, config.solver.tie_tolerance),
          iterations: 0,
          retried: false,
        })
      }
      ObjectiveKind::MinVariance => {
        // 1 / L for the variance gradient 2 Sigma w
        let step = 1.0 / (2.0 * moments.largest_eigenvalue()).max(f64::MIN_POSITIVE);
        solve_with_retry(MinVarianceCost::new(moments), *self, bounds, config, step)
      }
      ObjectiveKind::MaxSharpe => solve_with_retry(
        MaxSharpeCost::new(moments, config.risk_free_rate),
        *self,
        bounds,
        config,
        1.0,
      ),
    }
  }
}

fn solve_with_retry<O>(
  problem: O,
  objective: ObjectiveKind,
  bounds: &Bounds,
  config: &OptimizerConfig,
  initial_step: f64,
) -> OptimizeResult<SolveOutcome>
where
  O: CostFunction<Param = Vec<f64>, Output = f64>
    + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>
    + Clone,
{
  let n = bounds.len();
  let settings = &config.solver;

  let x0 = match &config.initial_guess {
    Some(guess) => {
      if guess.len() != n || guess.iter().any(|g| !g.is_finite()) {
        return Err(OptimizeError::InvalidInput {
          reason: format!("initial guess must hold {n} finite weights"),
        });
      }
      guess.clone()
    }
    None => vec![1.0 / n as f64; n],
  };

  let first = run_solver(problem.clone(), x0, objective, bounds, config, initial_step)?;
  if first.converged {
    return Ok(SolveOutcome {
      weights: first.param,
      iterations: first.iterations,
      retried: false,
    });
  }

  tracing::warn!(
    %objective,
    n_assets = n,
    iterations = first.iterations,
    "solver did not converge, retrying from a jittered start"
  );

  let mut rng = StdRng::seed_from_u64(settings.jitter_seed);
  let jittered: Vec<f64> = first
    .param
    .iter()
    .map(|w| w + rng.random_range(-settings.jitter_scale..=settings.jitter_scale))
    .collect();
  let x1 = project_onto_budget(&jittered, bounds);

  let second = run_solver(problem, x1, objective, bounds, config, initial_step)?;
  let iterations = first.iterations + second.iterations;
  if second.converged {
    return Ok(SolveOutcome {
      weights: second.param,
      iterations,
      retried: true,
    });
  }

  Err(OptimizeError::NonConvergence {
    objective,
    n_assets: n,
    iterations,
  })
}

fn run_solver<O>(
  problem: O,
  x0: Vec<f64>,
  objective: ObjectiveKind,
  bounds: &Bounds,
  config: &OptimizerConfig,
  initial_step: f64,
) -> OptimizeResult<RunOutcome>
where
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  let settings = &config.solver;
  let solver = ProjectedGradient::new(bounds.clone(), initial_step, settings.tolerance)
    .with_time_budget(settings.time_budget);

  let res = Executor::new(problem, solver)
    .configure(|state| state.param(x0).max_iters(settings.max_iters))
    .run()
    .map_err(|err| OptimizeError::Solver {
      objective,
      message: err.to_string(),
    })?;

  let state = res.state();
  let iterations = state.get_iter();
  let converged = match state.get_termination_reason() {
    Some(TerminationReason::SolverConverged) => true,
    Some(TerminationReason::SolverExit(msg)) if msg == TIME_BUDGET_EXIT => {
      return Err(OptimizeError::Timeout {
        objective,
        n_assets: bounds.len(),
        budget_ms: settings.time_budget.map(|b| b.as_millis()).unwrap_or(0),
      });
    }
    _ => false,
  };

  let param = state
    .get_best_param()
    .or_else(|| state.get_param())
    .cloned()
    .ok_or_else(|| OptimizeError::Solver {
      objective,
      message: "solver returned no parameters".to_string(),
    })?;

  Ok(RunOutcome {
    param,
    iterations,
    converged,
  })
}

/// Clip to `bounds`, then divide by the achieved sum when it drifts from 1 by more than `tol`.
fn finalize_weights(mut weights: Vec<f64>, bounds: &Bounds, tol: f64) -> Vec<f64> {
  for ((w, lo), hi) in weights.iter_mut().zip(&bounds.lower).zip(&bounds.upper) {
    *w = w.clamp(*lo, *hi);
  }
  let sum: f64 = weights.iter().sum();
  if (sum - 1.0).abs() > tol && sum.abs() > f64::MIN_POSITIVE {
    for w in &mut weights {
      *w /= sum;
    }
  }
  weights
}
