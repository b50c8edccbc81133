//! Quantitative finance building blocks.

pub mod portfolio;
