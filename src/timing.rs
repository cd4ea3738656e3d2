use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::JitterBounds;
use crate::surface::{DocumentSurface, Locator};

/// Randomized delays around a base value so consecutive interactions are not
/// mechanically uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    bounds: JitterBounds,
}

impl Jitter {
    pub fn new(bounds: JitterBounds) -> Self {
        Self { bounds }
    }

    pub fn typing() -> Self {
        Self::new(JitterBounds::TYPING)
    }

    pub fn pacing() -> Self {
        Self::new(JitterBounds::PACING)
    }

    /// Inclusive millisecond range sampled for `base_ms`.
    pub fn range(&self, base_ms: u64) -> (u64, u64) {
        (
            base_ms.saturating_sub(self.bounds.below),
            base_ms.saturating_add(self.bounds.above),
        )
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, base_ms: u64, rng: &mut R) -> Duration {
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let (lo, hi) = self.range(base_ms);
        Duration::from_millis(rng.gen_range(lo..=hi))
    }

    pub fn sample(&self, base_ms: u64) -> Duration {
        self.sample_with(base_ms, &mut rand::thread_rng())
    }
}

/// Scroll the first match into view. Failures and timeouts are logged, never returned.
pub async fn scroll_into_view(
    surface: &dyn DocumentSurface,
    locator: &Locator,
    timeout: Duration,
    field: &str,
) {
    let first = locator.first();
    match tokio::time::timeout(timeout, surface.scroll_into_view(&first, timeout)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Could not scroll to {field}: {e}"),
        Err(_) => warn!("Could not scroll to {field}: timed out after {timeout:?}"),
    }
}
