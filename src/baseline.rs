use crate::config::BaselineConfig;

pub fn median(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    return None;
  }
  let mut sorted = values.to_vec();
  sorted.sort_by(|a, b| a.total_cmp(b));
  let mid = sorted.len() / 2;
  if sorted.len() % 2 == 1 {
    Some(sorted[mid])
  } else {
    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
  pub value: f64,
  /// True when no comparison videos qualified and the video's own estimate was used.
  pub bootstrapped: bool,
}

pub fn aggregate_baseline(
  comparison_estimates: &[f64],
  own_estimate: f64,
  cfg: &BaselineConfig,
) -> Baseline {
  let finite: Vec<f64> = comparison_estimates
    .iter()
    .copied()
    .filter(|v| v.is_finite())
    .collect();

  let (raw, bootstrapped) = match median(&finite) {
    Some(m) => (m, false),
    None => (own_estimate, true),
  };

  let value = if raw.is_finite() {
    raw.max(cfg.baseline_floor)
  } else {
    cfg.baseline_floor
  };

  Baseline { value, bootstrapped }
}
