use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use ndarray::Array2;
use portfolio_rs::quant::portfolio::ObjectiveKind;
use portfolio_rs::quant::portfolio::OptimizerConfig;
use portfolio_rs::quant::portfolio::PortfolioEngine;
use portfolio_rs::quant::portfolio::PortfolioEngineConfig;
use portfolio_rs::quant::portfolio::ReturnKind;
use portfolio_rs::quant::portfolio::ReturnSample;

const USAGE: &str = "usage: portfolio-rs <prices.csv> [objective] [risk-free] [lookback]";

/// Optimize one rebalance from a price table whose first line holds the
/// asset identifiers and every following line one date's prices.
fn main() -> Result<()> {
  let args: Vec<String> = std::env::args().collect();
  let Some(path) = args.get(1) else {
    bail!(USAGE);
  };

  let objective: ObjectiveKind = match args.get(2) {
    Some(raw) => raw.parse::<ObjectiveKind>().context("unknown objective")?,
    None => ObjectiveKind::default(),
  };
  let risk_free: f64 = match args.get(3) {
    Some(raw) => raw.parse::<f64>().with_context(|| format!("invalid risk-free rate '{raw}'"))?,
    None => 0.0,
  };
  let lookback: Option<usize> = args
    .get(4)
    .map(|raw| raw.parse::<usize>().with_context(|| format!("invalid lookback '{raw}'")))
    .transpose()?;

  let (assets, prices) = read_price_table(path)?;
  let mut sample = ReturnSample::from_prices(assets, prices.view(), ReturnKind::Simple)
    .with_context(|| format!("building returns from {path}"))?;
  if let Some(periods) = lookback {
    sample = sample.tail(periods);
  }

  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    objective,
    optimizer: OptimizerConfig::default().with_risk_free_rate(risk_free),
  });
  let result = match engine.optimize(&sample) {
    Ok(result) => {
      println!("{objective} over {} periods", sample.n_periods());
      result
    }
    Err(err) if err.is_recoverable() => {
      println!("{objective} failed ({err}); falling back to equal weights");
      engine.equal_weight(&sample)?
    }
    Err(err) => {
      return Err(err)
        .with_context(|| format!("optimizing {objective} over {} periods", sample.n_periods()));
    }
  };

  for (asset, weight) in result.weights.iter() {
    println!("  {asset:<12} {weight:>9.4}");
  }
  println!("  expected return {:.6}", result.expected_return);
  println!("  volatility      {:.6}", result.volatility);
  println!("  sharpe          {:.4}", result.sharpe);

  Ok(())
}

fn read_price_table(path: &str) -> Result<(Vec<String>, Array2<f64>)> {
  let file = File::open(path).with_context(|| format!("opening {path}"))?;
  let mut lines = BufReader::new(file).lines();

  let header = match lines.next() {
    Some(line) => line?,
    None => bail!("{path} is empty"),
  };
  let assets: Vec<String> = split_fields(&header).map(str::to_string).collect();

  let mut values = Vec::new();
  let mut rows = 0;
  for (lineno, line) in lines.enumerate() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    let before = values.len();
    for field in split_fields(&line) {
      let price: f64 = field
        .parse()
        .with_context(|| format!("line {}: bad price '{field}'", lineno + 2))?;
      values.push(price);
    }
    if values.len() - before != assets.len() {
      bail!(
        "line {}: expected {} prices, found {}",
        lineno + 2,
        assets.len(),
        values.len() - before
      );
    }
    rows += 1;
  }

  let prices = Array2::from_shape_vec((rows, assets.len()), values)?;
  Ok((assets, prices))
}

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
  line
    .split(|c: char| c == ',' || c.is_whitespace())
    .filter(|f| !f.is_empty())
}
