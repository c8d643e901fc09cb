//! Engine configuration.

use tracing::warn;

/// Default upper bound on step tasks running at once.
pub const DEFAULT_MAX_CONCURRENT_STEPS: usize = 8;

/// Environment variable overriding [`EngineConfig::max_concurrent_steps`].
pub const MAX_CONCURRENT_STEPS_ENV: &str = "RETINA_MAX_CONCURRENT_STEPS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Maximum number of steps executing concurrently. Values below 1 act as 1.
  pub max_concurrent_steps: usize,
}

impl EngineConfig {
  pub fn with_max_concurrent_steps(max_concurrent_steps: usize) -> Self {
    Self {
      max_concurrent_steps: max_concurrent_steps.max(1),
    }
  }

  /// Defaults overridden by `RETINA_MAX_CONCURRENT_STEPS` when set to a positive integer.
  pub fn from_env() -> Self {
    match std::env::var(MAX_CONCURRENT_STEPS_ENV) {
      Ok(raw) => match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Self::with_max_concurrent_steps(value),
        _ => {
          warn!(
            variable = MAX_CONCURRENT_STEPS_ENV,
            value = %raw,
            "ignoring invalid concurrency override"
          );
          Self::default()
        }
      },
      Err(_) => Self::default(),
    }
  }

  pub(crate) fn concurrency_limit(&self) -> usize {
    self.max_concurrent_steps.max(1)
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_concurrent_steps: DEFAULT_MAX_CONCURRENT_STEPS,
    }
  }
}
