//! # portfolio-rs
//!
//! Portfolio weight optimization for periodic rebalancing: given a window of
//! historical asset returns, compute a fully-invested target weight vector
//! under a maximum-Sharpe, minimum-variance or maximum-return objective.
//!
//! ```ignore
//! use portfolio_rs::prelude::*;
//!
//! let sample = ReturnSample::new(assets, returns)?;
//! let result = optimize(&sample, ObjectiveKind::MinVariance, &OptimizerConfig::default())?;
//! ```

pub mod quant;

pub mod prelude {
  pub use crate::quant::portfolio::Bounds;
  pub use crate::quant::portfolio::ObjectiveKind;
  pub use crate::quant::portfolio::OptimizeError;
  pub use crate::quant::portfolio::OptimizerConfig;
  pub use crate::quant::portfolio::PortfolioEngine;
  pub use crate::quant::portfolio::PortfolioEngineConfig;
  pub use crate::quant::portfolio::PortfolioResult;
  pub use crate::quant::portfolio::ReturnSample;
  pub use crate::quant::portfolio::optimize;
}
