//! The extraction run: a strictly sequential state machine.
//!
//! ```text
//! Init → Navigated → OverlayHandled → TargetLocated → ValueInjected
//!      → Submitted → ResultsReady → Extracted
//! ```
//!
//! Any stage may fail. The failure is tagged with the stage being attempted,
//! one diagnostic snapshot is taken, and the run ends. There are no retries
//! within a run.
//!
//! Every driver call runs under a deadline: navigation and session open under
//! `timeouts.navigation_ms`, everything else under `timeouts.action_ms`.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::diagnostics::{DiagnosticCapture, SavedDiagnostic};
use crate::dismiss::{DismissalOutcome, OverlayDismisser};
use crate::driver::{BoundedDriver, BrowsingDriver, SessionFactory};
use crate::extract::{ExtractionBatch, ResultExtractor};
use crate::inject::{FieldValue, InjectionStrategy, StrategyChain};
use crate::locator::Locator;
use crate::readiness::ReadinessWait;
use crate::result::{PriceWatchError, PriceWatchResult};
use crate::submit::SubmissionTrigger;
use crate::wait::{LoadState, WaitOptions};

// =============================================================================
// STAGES
// =============================================================================

/// Run states, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunStage {
    /// Session open, nothing done yet
    Init,
    /// Page loaded
    Navigated,
    /// Overlay dismissed or absent
    OverlayHandled,
    /// Input field found
    TargetLocated,
    /// Value verified in the field
    ValueInjected,
    /// Submit control activated
    Submitted,
    /// Result indicator present
    ResultsReady,
    /// Batch read (terminal)
    Extracted,
}

impl RunStage {
    /// State after this one
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Navigated),
            Self::Navigated => Some(Self::OverlayHandled),
            Self::OverlayHandled => Some(Self::TargetLocated),
            Self::TargetLocated => Some(Self::ValueInjected),
            Self::ValueInjected => Some(Self::Submitted),
            Self::Submitted => Some(Self::ResultsReady),
            Self::ResultsReady => Some(Self::Extracted),
            Self::Extracted => None,
        }
    }

    /// Name of the step that reaches this state, used to tag failures
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Init => "open-session",
            Self::Navigated => "navigate",
            Self::OverlayHandled => "dismiss-overlay",
            Self::TargetLocated => "locate-target",
            Self::ValueInjected => "inject-value",
            Self::Submitted => "submit",
            Self::ResultsReady => "await-results",
            Self::Extracted => "extract",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A run that ended in a failed state
#[derive(Debug, Error)]
#[error("Run failed at stage {stage}: {error}")]
pub struct RunFailure {
    /// Stage being attempted
    pub stage: RunStage,
    /// Cause
    #[source]
    pub error: PriceWatchError,
    /// Snapshot written for the failure, if capture worked
    pub diagnostic: Option<SavedDiagnostic>,
}

/// A run that reached `Extracted`
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Records read from the result page (may be empty)
    pub batch: ExtractionBatch,
    /// Strategy that got the value to stick
    pub injected_with: InjectionStrategy,
    /// Whether an overlay was dismissed
    pub overlay: DismissalOutcome,
    /// Wall time of the run
    pub elapsed: Duration,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Drives one page from navigation to extraction
#[derive(Debug, Clone)]
pub struct Engine {
    target_url: String,
    field_value: FieldValue,
    wait_until: LoadState,
    navigation_timeout: Duration,
    action_timeout: Duration,
    dismisser: OverlayDismisser,
    target: Locator,
    chain: StrategyChain,
    submit: SubmissionTrigger,
    readiness: ReadinessWait,
    extractor: ResultExtractor,
    diagnostics: DiagnosticCapture,
}

impl Engine {
    /// Build every stage from a validated configuration
    pub fn from_config(config: &RunConfig) -> PriceWatchResult<Self> {
        config.validate()?;
        let poll = config.poll_interval_ms;
        let timeouts = &config.timeouts;

        Ok(Self {
            target_url: config.target_url.clone(),
            field_value: FieldValue::new(config.field_value.clone()),
            wait_until: config.wait_until,
            navigation_timeout: Duration::from_millis(timeouts.navigation_ms),
            action_timeout: Duration::from_millis(timeouts.action_ms),
            dismisser: OverlayDismisser::new(config.selectors.overlay.clone())
                .with_attempt_timeout(config.dismiss_attempt_ms)
                .with_poll_interval(poll),
            target: Locator::any_of(config.selectors.target.clone()).with_options(
                WaitOptions::new()
                    .with_timeout(timeouts.locate_ms)
                    .with_poll_interval(poll),
            ),
            chain: StrategyChain::new(config.injection.strategies.clone())
                .with_settle_delay(Duration::from_millis(config.injection.settle_ms))
                .with_keystroke_delay(Duration::from_millis(config.injection.keystroke_ms)),
            submit: SubmissionTrigger::new(config.selectors.submit.clone())
                .with_locate_timeout(timeouts.locate_ms)
                .with_enable_timeout(timeouts.submit_enable_ms)
                .with_poll_interval(poll),
            readiness: ReadinessWait::new(config.selectors.results_ready.clone())
                .with_timeout(timeouts.results_ready_ms)
                .with_poll_interval(poll),
            extractor: ResultExtractor::new(config.selectors.extract.clone()),
            diagnostics: config
                .diagnostics_dir
                .clone()
                .map_or_else(DiagnosticCapture::disabled, DiagnosticCapture::new),
        })
    }

    /// Replace the diagnostic capture
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticCapture) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Target URL
    #[must_use]
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// Open a session, run, and dispose the session on every path
    pub async fn run_in_session<F: SessionFactory>(
        &self,
        factory: &F,
    ) -> Result<RunReport, RunFailure> {
        let opened = tokio::time::timeout(self.navigation_timeout, factory.open())
            .await
            .unwrap_or_else(|_| {
                Err(PriceWatchError::driver(format!(
                    "session did not open within {}ms",
                    self.navigation_timeout.as_millis()
                )))
            });
        let driver = opened.map_err(|error| {
            warn!(error = %error, "could not open browsing session");
            RunFailure {
                stage: RunStage::Init,
                error,
                diagnostic: None,
            }
        })?;

        let outcome = self.run(&driver).await;

        if let Err(e) = BoundedDriver::new(&driver, self.action_timeout).dispose().await {
            warn!(error = %e, "session dispose failed");
        }
        outcome
    }

    /// Run every stage against an open session
    pub async fn run<D: BrowsingDriver + ?Sized>(&self, driver: &D) -> Result<RunReport, RunFailure> {
        let driver = &BoundedDriver::new(driver, self.action_timeout);
        let started = tokio::time::Instant::now();
        let mut reached = RunStage::Init;

        match self.drive(driver, &mut reached).await {
            Ok((batch, injected_with, overlay)) => {
                let elapsed = started.elapsed();
                info!(
                    records = batch.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "run complete"
                );
                Ok(RunReport {
                    batch,
                    injected_with,
                    overlay,
                    elapsed,
                })
            }
            Err(error) => {
                let stage = reached.next().unwrap_or(reached);
                warn!(stage = %stage, error = %error, "run failed");
                let diagnostic = self.diagnostics.capture(driver, stage.label()).await;
                Err(RunFailure {
                    stage,
                    error,
                    diagnostic,
                })
            }
        }
    }

    async fn drive<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
        reached: &mut RunStage,
    ) -> PriceWatchResult<(ExtractionBatch, InjectionStrategy, DismissalOutcome)> {
        self.navigate(driver).await?;
        *reached = RunStage::Navigated;

        let overlay = self.dismisser.dismiss(driver).await;
        *reached = RunStage::OverlayHandled;

        let target = self.target.resolve(driver).await?;
        *reached = RunStage::TargetLocated;

        let injected_with = self.chain.inject(driver, &target, &self.field_value).await?;
        *reached = RunStage::ValueInjected;

        self.submit.trigger(driver).await?;
        *reached = RunStage::Submitted;

        self.readiness.wait(driver).await?;
        *reached = RunStage::ResultsReady;

        let batch = self.extractor.extract(driver).await?;
        *reached = RunStage::Extracted;

        Ok((batch, injected_with, overlay))
    }

    async fn navigate<D: BrowsingDriver + ?Sized>(&self, driver: &D) -> PriceWatchResult<()> {
        let url = self.target_url.as_str();
        info!(url, wait_until = %self.wait_until, "navigating");

        match tokio::time::timeout(self.navigation_timeout, driver.navigate(url, self.wait_until)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ PriceWatchError::NavigationFailed { .. })) => Err(e),
            Ok(Err(e)) => Err(PriceWatchError::NavigationFailed {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(PriceWatchError::NavigationFailed {
                url: url.to_string(),
                message: format!(
                    "page did not reach {} within {}ms",
                    self.wait_until,
                    self.navigation_timeout.as_millis()
                ),
            }),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::{MockDocument, MockDriver, MockNode, MockSessionFactory};
    use tempfile::TempDir;

    fn config() -> RunConfig {
        RunConfig::default()
            .with_target_url("https://compare.example.test/")
            .with_field_value("3000")
            .with_diagnostics_dir(None)
    }

    fn engine() -> Engine {
        Engine::from_config(&config()).unwrap()
    }

    mod stage_tests {
        use super::*;

        #[test]
        fn test_stage_order() {
            let mut stage = RunStage::Init;
            let mut seen = vec![stage];
            while let Some(next) = stage.next() {
                assert!(next > stage);
                seen.push(next);
                stage = next;
            }
            assert_eq!(seen.len(), 8);
            assert_eq!(stage, RunStage::Extracted);
        }

        #[test]
        fn test_stage_labels() {
            assert_eq!(RunStage::Navigated.to_string(), "navigate");
            assert_eq!(RunStage::ResultsReady.label(), "await-results");
        }

        #[test]
        fn test_invalid_config_rejected() {
            let err = Engine::from_config(&config().with_field_value("")).unwrap_err();
            assert!(matches!(err, PriceWatchError::Config { .. }));
        }
    }

    mod run_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_full_run_against_comparison_page() {
            let driver = MockDriver::new(MockDocument::comparison_page(&[
                ("Alpha Energy", "$1,234.56 /yr"),
                ("Beta Power", "$999"),
            ]));
            let report = engine().run(&driver).await.unwrap();

            assert!(report.overlay.is_dismissed());
            assert_eq!(report.injected_with, InjectionStrategy::NativeSetter);
            assert_eq!(report.batch.len(), 2);
            assert_eq!(report.batch.records()[0].brand, "Alpha Energy");
            assert_eq!(report.batch.records()[0].price, 1234.56);
            assert_eq!(driver.activation_count("compare"), 1);
            assert_eq!(driver.value_of("postcode").as_deref(), Some("3000"));
            assert_eq!(driver.current_url().as_deref(), Some("https://compare.example.test/"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_empty_results_are_success() {
            let driver = MockDriver::new(MockDocument::comparison_page(&[]));
            let report = engine().run(&driver).await.unwrap();
            assert!(report.batch.is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn test_navigation_failure_tagged() {
            let driver = MockDriver::new(MockDocument::comparison_page(&[]))
                .fail_navigation("net::ERR_CONNECTION_REFUSED");
            let failure = engine().run(&driver).await.unwrap_err();
            assert_eq!(failure.stage, RunStage::Navigated);
            assert!(matches!(failure.error, PriceWatchError::NavigationFailed { .. }));
            assert!(failure.error.to_string().contains("ERR_CONNECTION_REFUSED"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_missing_field_tagged_locate() {
            let driver = MockDriver::new(MockDocument::new().with(MockNode::new("main")));
            let failure = engine().run(&driver).await.unwrap_err();
            assert_eq!(failure.stage, RunStage::TargetLocated);
            assert!(matches!(failure.error, PriceWatchError::ElementNotFound { .. }));
            assert!(!driver.was_called("fill"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_injection_failure_stops_before_submit() {
            let driver = MockDriver::new(
                MockDocument::new()
                    .with(
                        MockNode::new("input")
                            .attr("name", "postcode")
                            .behavior(crate::mock::ControlBehavior::ReadOnly),
                    )
                    .with(MockNode::new("button").key("go").text("Compare")),
            );
            let failure = engine().run(&driver).await.unwrap_err();
            assert_eq!(failure.stage, RunStage::ValueInjected);
            assert_eq!(driver.activation_count("go"), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_results_timeout_captures_once() {
            let dir = TempDir::new().unwrap();
            let mut config = config();
            config.timeouts.results_ready_ms = 100;
            config.diagnostics_dir = Some(dir.path().to_path_buf());
            let engine = Engine::from_config(&config).unwrap();

            let driver = MockDriver::new(
                MockDocument::new()
                    .with(MockNode::new("input").attr("placeholder", "Postcode"))
                    .with(MockNode::new("button").text("Search")),
            );
            let failure = engine.run(&driver).await.unwrap_err();

            assert_eq!(failure.stage, RunStage::ResultsReady);
            assert!(matches!(failure.error, PriceWatchError::ResultsNotReady { .. }));
            assert_eq!(driver.count_calls("snapshot"), 1);
            let saved = failure.diagnostic.expect("snapshot should be saved");
            assert!(saved
                .screenshot
                .unwrap()
                .to_string_lossy()
                .ends_with("-await-results.png"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_capture_failure_keeps_original_error() {
            let dir = TempDir::new().unwrap();
            let engine = engine().with_diagnostics(DiagnosticCapture::new(dir.path()));
            let driver = MockDriver::new(MockDocument::new()).fail_snapshot("renderer gone");

            let failure = engine.run(&driver).await.unwrap_err();
            assert!(matches!(failure.error, PriceWatchError::ElementNotFound { .. }));
            assert!(failure.diagnostic.is_none());
        }

        #[tokio::test(start_paused = true)]
        async fn test_slow_navigation_times_out() {
            let mut config = config();
            config.timeouts.navigation_ms = 500;
            let engine = Engine::from_config(&config).unwrap();
            let driver = MockDriver::new(MockDocument::new()).stall_navigation();

            let failure = engine.run(&driver).await.unwrap_err();
            assert_eq!(failure.stage, RunStage::Navigated);
            assert!(failure.error.to_string().contains("within 500ms"));
        }

        fn search_form() -> MockDocument {
            MockDocument::new()
                .with(MockNode::new("input").attr("placeholder", "Postcode"))
                .with(MockNode::new("button").text("Search"))
        }

        #[tokio::test(start_paused = true)]
        async fn test_hung_submit_tagged_submit() {
            let mut config = config();
            config.timeouts.action_ms = 200;
            let engine = Engine::from_config(&config).unwrap();
            let driver = MockDriver::new(search_form()).stall("activate");

            let failure = engine.run(&driver).await.unwrap_err();
            assert_eq!(failure.stage, RunStage::Submitted);
            assert!(matches!(failure.error, PriceWatchError::Driver { .. }));
            assert!(failure.error.to_string().contains("activate did not complete within 200ms"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_hung_snapshot_keeps_original_error() {
            let dir = TempDir::new().unwrap();
            let mut config = config();
            config.timeouts.locate_ms = 100;
            config.diagnostics_dir = Some(dir.path().to_path_buf());
            let engine = Engine::from_config(&config).unwrap();
            let driver = MockDriver::new(MockDocument::new()).stall("snapshot");

            let failure = tokio::time::timeout(Duration::from_secs(3600), engine.run(&driver))
                .await
                .expect("run should not hang on the snapshot")
                .unwrap_err();

            assert_eq!(failure.stage, RunStage::TargetLocated);
            assert!(matches!(failure.error, PriceWatchError::ElementNotFound { .. }));
            assert!(failure.diagnostic.is_none());
            assert_eq!(driver.count_calls("snapshot"), 1);
            assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        }
    }

    mod session_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_session_disposed_after_success() {
            let factory = MockSessionFactory::new(MockDriver::new(MockDocument::comparison_page(&[
                ("Alpha", "$1"),
            ])));
            engine().run_in_session(&factory).await.unwrap();
            assert!(factory.driver().is_disposed());
        }

        #[tokio::test(start_paused = true)]
        async fn test_session_disposed_after_failure() {
            let factory = MockSessionFactory::new(MockDriver::new(MockDocument::new()));
            let failure = engine().run_in_session(&factory).await.unwrap_err();
            assert_eq!(failure.stage, RunStage::TargetLocated);
            assert!(factory.driver().is_disposed());
        }

        #[tokio::test(start_paused = true)]
        async fn test_hung_dispose_does_not_hang_run() {
            let factory = MockSessionFactory::new(
                MockDriver::new(MockDocument::comparison_page(&[("Alpha", "$1")])).stall("dispose"),
            );
            let report = tokio::time::timeout(Duration::from_secs(3600), engine().run_in_session(&factory))
                .await
                .expect("dispose should be bounded")
                .unwrap();
            assert_eq!(report.batch.len(), 1);
            assert!(factory.driver().was_called("dispose"));
            assert!(!factory.driver().is_disposed());
        }

        #[tokio::test(start_paused = true)]
        async fn test_session_open_failure() {
            let factory = MockSessionFactory::failing("chromium not found");
            let failure = engine().run_in_session(&factory).await.unwrap_err();
            assert_eq!(failure.stage, RunStage::Init);
            assert!(failure.diagnostic.is_none());
        }
    }
}
