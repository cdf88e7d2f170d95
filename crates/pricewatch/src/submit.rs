//! Submission trigger: locate, wait for enablement, activate exactly once.

use tracing::info;

use crate::driver::{ActivateOptions, BrowsingDriver};
use crate::locator::{ElementKind, ElementQuery, InteractionTarget, Locator, DEFAULT_LOCATE_TIMEOUT_MS};
use crate::result::{PriceWatchError, PriceWatchResult};
use crate::wait::{poll_until, Polled, WaitOptions};

/// Default time a located submit control may stay disabled (10 seconds)
pub const DEFAULT_SUBMIT_ENABLE_TIMEOUT_MS: u64 = 10_000;

/// Finds and fires the form's submit control
#[derive(Debug, Clone)]
pub struct SubmissionTrigger {
    candidates: Vec<ElementQuery>,
    locate: WaitOptions,
    enable: WaitOptions,
}

impl Default for SubmissionTrigger {
    fn default() -> Self {
        Self::new(Self::default_candidates())
    }
}

impl SubmissionTrigger {
    /// Trigger trying `candidates` in order
    #[must_use]
    pub fn new(candidates: Vec<ElementQuery>) -> Self {
        Self {
            candidates,
            locate: WaitOptions::new().with_timeout(DEFAULT_LOCATE_TIMEOUT_MS),
            enable: WaitOptions::new().with_timeout(DEFAULT_SUBMIT_ENABLE_TIMEOUT_MS),
        }
    }

    /// Text-labelled buttons first, then any semantic submit control
    #[must_use]
    pub fn default_candidates() -> Vec<ElementQuery> {
        vec![
            ElementQuery::new(ElementKind::Button)
                .text_contains("compare")
                .text_contains("search")
                .text_contains("find"),
            ElementQuery::new(ElementKind::Any).attribute_equals("type", "submit"),
        ]
    }

    /// Set the locate timeout
    #[must_use]
    pub const fn with_locate_timeout(mut self, timeout_ms: u64) -> Self {
        self.locate.timeout_ms = timeout_ms;
        self
    }

    /// Set the enablement timeout
    #[must_use]
    pub const fn with_enable_timeout(mut self, timeout_ms: u64) -> Self {
        self.enable.timeout_ms = timeout_ms;
        self
    }

    /// Set the polling interval for both waits
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.locate.poll_interval_ms = poll_interval_ms;
        self.enable.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Configured candidates
    #[must_use]
    pub fn candidates(&self) -> &[ElementQuery] {
        &self.candidates
    }

    /// Locate the control, wait until it is enabled, then force-activate it.
    ///
    /// A control that never enables is never activated.
    pub async fn trigger<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> PriceWatchResult<InteractionTarget> {
        let target = Locator::any_of(self.candidates.clone())
            .with_options(self.locate)
            .resolve(driver)
            .await?;

        let element = &target.element;
        let enabled = poll_until(&self.enable, move || async move {
            Ok(driver.is_enabled(element).await?.then_some(()))
        })
        .await;

        if let Polled::TimedOut { .. } = enabled {
            return Err(PriceWatchError::SubmissionNotReady {
                descriptor: target.descriptor,
                timeout_ms: self.enable.timeout_ms,
            });
        }

        driver.activate(element, ActivateOptions::forced()).await?;
        info!(
            target = %target,
            waited_ms = enabled.elapsed().as_millis() as u64,
            "submission triggered"
        );
        Ok(target)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::{MockDocument, MockDriver, MockNode};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_control_enabled_later_is_triggered_once() {
        let driver = MockDriver::new(MockDocument::new().with(
            MockNode::new("button")
                .key("compare")
                .text("Compare")
                .enabled_after(Duration::from_secs(2)),
        ));
        let start = tokio::time::Instant::now();
        SubmissionTrigger::default()
            .with_enable_timeout(5_000)
            .trigger(&driver)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(driver.activation_count("compare"), 1);
        assert_eq!(driver.count_calls("activate"), 1);
        assert!(driver.was_called("activate:node-0:force=true"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_control_is_never_activated() {
        let driver = MockDriver::new(
            MockDocument::new().with(MockNode::new("button").key("go").text("Search").disabled()),
        );
        let err = SubmissionTrigger::default()
            .with_enable_timeout(300)
            .trigger(&driver)
            .await
            .unwrap_err();

        match err {
            PriceWatchError::SubmissionNotReady { timeout_ms, .. } => assert_eq!(timeout_ms, 300),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!driver.was_called("activate"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_semantic_submit() {
        let driver = MockDriver::new(
            MockDocument::new().with(MockNode::new("input").key("go").attr("type", "submit")),
        );
        let target = SubmissionTrigger::default().trigger(&driver).await.unwrap();
        assert!(target.descriptor.contains("type=\"submit\""));
        assert_eq!(driver.activation_count("go"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_control_is_element_not_found() {
        let driver = MockDriver::new(MockDocument::new());
        let err = SubmissionTrigger::default()
            .with_locate_timeout(250)
            .trigger(&driver)
            .await
            .unwrap_err();
        assert!(matches!(err, PriceWatchError::ElementNotFound { timeout_ms: 250, .. }));
    }
}
