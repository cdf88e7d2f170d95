//! Result-readiness wait.

use crate::driver::BrowsingDriver;
use crate::locator::{ElementKind, ElementQuery, InteractionTarget, Locator};
use crate::result::{PriceWatchError, PriceWatchResult};
use crate::wait::{WaitOptions, DEFAULT_POLL_INTERVAL_MS};

/// Default time to wait for results to render (60 seconds)
pub const DEFAULT_RESULTS_TIMEOUT_MS: u64 = 60_000;

/// Waits for the element signalling that results have rendered
#[derive(Debug, Clone)]
pub struct ReadinessWait {
    indicator: ElementQuery,
    options: WaitOptions,
}

impl Default for ReadinessWait {
    fn default() -> Self {
        Self::new(
            ElementQuery::new(ElementKind::Any)
                .attribute_contains("class", "result")
                .attribute_contains("data-testid", "result"),
        )
    }
}

impl ReadinessWait {
    /// Wait for `indicator`
    #[must_use]
    pub const fn new(indicator: ElementQuery) -> Self {
        Self {
            indicator,
            options: WaitOptions {
                timeout_ms: DEFAULT_RESULTS_TIMEOUT_MS,
                poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            },
        }
    }

    /// Set the timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = timeout_ms;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.options.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Indicator query
    #[must_use]
    pub const fn indicator(&self) -> &ElementQuery {
        &self.indicator
    }

    /// Poll until the indicator exists; no retries of earlier stages
    pub async fn wait<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> PriceWatchResult<InteractionTarget> {
        Locator::new(self.indicator.clone())
            .with_options(self.options)
            .resolve(driver)
            .await
            .map_err(|e| match e {
                PriceWatchError::ElementNotFound { last_error, .. } => {
                    PriceWatchError::ResultsNotReady {
                        descriptor: self.indicator.to_string(),
                        timeout_ms: self.options.timeout_ms,
                        last_error,
                    }
                }
                other => other,
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::{MockDocument, MockDriver, MockNode};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_indicator_present() {
        let driver = MockDriver::new(
            MockDocument::new().with(MockNode::new("section").attr("class", "results-list")),
        );
        assert!(ReadinessWait::default().wait(&driver).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_never_renders() {
        let driver = MockDriver::new(MockDocument::new().with(MockNode::new("div")));
        let start = tokio::time::Instant::now();
        let err = ReadinessWait::default()
            .with_timeout(100)
            .wait(&driver)
            .await
            .unwrap_err();
        assert!(matches!(err, PriceWatchError::ResultsNotReady { timeout_ms: 100, .. }));
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_last_driver_error() {
        let driver = MockDriver::new(MockDocument::new()).fail_queries(u32::MAX);
        let err = ReadinessWait::default()
            .with_timeout(300)
            .wait(&driver)
            .await
            .unwrap_err();
        let PriceWatchError::ResultsNotReady { last_error, .. } = &err else {
            panic!("expected ResultsNotReady, got {err}");
        };
        assert!(last_error.is_some());
        assert!(err.to_string().contains("(last error: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_rendered_late() {
        let driver = MockDriver::new(MockDocument::new().with(
            MockNode::new("ul")
                .attr("data-testid", "result-grid")
                .appears_after(Duration::from_secs(20)),
        ));
        assert!(ReadinessWait::default().wait(&driver).await.is_ok());
    }
}
