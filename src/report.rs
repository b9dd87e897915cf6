use std::collections::BTreeMap;

use serde::Serialize;

use crate::baseline::median;
use crate::history_window::Confidence;
use crate::models::BaselineResult;
use crate::score::PerformanceTier;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierDistribution {
  pub videos: usize,
  pub by_tier: BTreeMap<PerformanceTier, usize>,
  pub median_score: Option<f64>,
  pub low_confidence: usize,
  pub bootstrapped: usize,
}

impl TierDistribution {
  pub fn from_results(results: &[BaselineResult]) -> Self {
    let mut by_tier = BTreeMap::new();
    let mut low_confidence = 0usize;
    let mut bootstrapped = 0usize;
    for r in results {
      *by_tier.entry(r.tier).or_insert(0usize) += 1;
      match r.confidence {
        Confidence::Low => low_confidence += 1,
        Confidence::Bootstrap => bootstrapped += 1,
        Confidence::Normal => {}
      }
    }

    let scores: Vec<f64> = results.iter().map(|r| r.score).collect();

    Self {
      videos: results.len(),
      by_tier,
      median_score: median(&scores),
      low_confidence,
      bootstrapped,
    }
  }

  pub fn count(&self, tier: PerformanceTier) -> usize {
    self.by_tier.get(&tier).copied().unwrap_or(0)
  }

  pub fn share(&self, tier: PerformanceTier) -> f64 {
    if self.videos == 0 {
      return 0.0;
    }
    (self.count(tier) as f64) / (self.videos as f64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::day30::EstimateSource;

  fn result(score: f64, confidence: Confidence) -> BaselineResult {
    BaselineResult {
      video_id: format!("v{score}"),
      channel_id: "c".to_string(),
      day30_estimate: score * 100.0,
      estimate_source: EstimateSource::Projected,
      baseline: 100.0,
      score,
      tier: PerformanceTier::classify(score),
      comparison_count: 5,
      confidence,
    }
  }

  #[test]
  fn counts_tiers_and_confidence() {
    let results = vec![
      result(1.0, Confidence::Bootstrap),
      result(4.0, Confidence::Low),
      result(0.1, Confidence::Normal),
      result(1.2, Confidence::Normal),
    ];
    let dist = TierDistribution::from_results(&results);
    assert_eq!(dist.videos, 4);
    assert_eq!(dist.count(PerformanceTier::OnTrack), 2);
    assert_eq!(dist.count(PerformanceTier::Viral), 1);
    assert_eq!(dist.count(PerformanceTier::Outperforming), 0);
    assert_eq!(dist.share(PerformanceTier::OnTrack), 0.5);
    assert!((dist.median_score.unwrap() - 1.1).abs() < 1e-12);
    assert_eq!(dist.low_confidence, 1);
    assert_eq!(dist.bootstrapped, 1);
  }

  #[test]
  fn empty_channel_has_no_median() {
    let dist = TierDistribution::from_results(&[]);
    assert_eq!(dist.median_score, None);
    assert_eq!(dist.share(PerformanceTier::Poor), 0.0);
  }
}
