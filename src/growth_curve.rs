use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::models::GrowthCurveEntry;

fn usable(value: f64) -> bool {
  value.is_finite() && value > 0.0
}

/// Global median views by age, used only as a ratio scale between ages.
#[derive(Debug, Clone)]
pub struct GrowthCurve {
  by_age: BTreeMap<u32, f64>,
  reference_value: f64,
  max_age: u32,
}

impl GrowthCurve {
  pub fn from_entries(
    entries: &[GrowthCurveEntry],
    reference_age: u32,
    max_supported_age: u32,
  ) -> Result<Self, ConfigError> {
    if entries.is_empty() {
      return Err(ConfigError::EmptyGrowthCurve);
    }

    let by_age: BTreeMap<u32, f64> = entries
      .iter()
      .map(|e| (e.age_days, e.median_views))
      .collect();

    let reference_value = by_age
      .get(&reference_age)
      .copied()
      .filter(|v| usable(*v))
      .ok_or(ConfigError::MissingReferenceAge(reference_age))?;

    let table_max = by_age.keys().next_back().copied().unwrap_or(reference_age);
    let max_age = table_max.min(max_supported_age);

    Ok(Self {
      by_age,
      reference_value,
      max_age,
    })
  }

  /// Ages past the table (or the supported maximum) reuse the last entry;
  /// missing or non-positive entries fall back to the reference-age value.
  pub fn curve_value(&self, age_days: u32) -> f64 {
    let age = self.clamp_age(age_days);
    self
      .by_age
      .get(&age)
      .copied()
      .filter(|v| usable(*v))
      .unwrap_or(self.reference_value)
  }

  pub fn clamp_age(&self, age_days: u32) -> u32 {
    age_days.min(self.max_age)
  }

  pub fn max_age(&self) -> u32 {
    self.max_age
  }

  pub fn entry_count(&self) -> usize {
    self.by_age.len()
  }
}
