//! Overlay and consent dismissal.
//!
//! Tries a short, ordered list of "accept"-style controls, each with its own
//! small locate budget. Absence is the normal case and never an error.

use tracing::{debug, info, warn};

use crate::driver::{ActivateOptions, BrowsingDriver};
use crate::locator::{ElementKind, ElementQuery, Locator};
use crate::wait::{WaitOptions, DEFAULT_POLL_INTERVAL_MS};

/// Default locate budget per dismissal action (1 second)
pub const DEFAULT_DISMISS_ATTEMPT_MS: u64 = 1_000;

/// Result of a dismissal attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DismissalOutcome {
    /// A control was found and activated
    Dismissed {
        /// Query of the control that was activated
        descriptor: String,
    },
    /// Nothing to dismiss, or activation failed
    NotPresent,
}

impl DismissalOutcome {
    /// Whether an overlay was dismissed
    #[must_use]
    pub const fn is_dismissed(&self) -> bool {
        matches!(self, Self::Dismissed { .. })
    }
}

/// Ordered list of dismissal actions
#[derive(Debug, Clone)]
pub struct OverlayDismisser {
    actions: Vec<ElementQuery>,
    options: WaitOptions,
}

impl Default for OverlayDismisser {
    fn default() -> Self {
        Self::new(Self::default_actions())
    }
}

impl OverlayDismisser {
    /// Dismisser trying `actions` in order
    #[must_use]
    pub const fn new(actions: Vec<ElementQuery>) -> Self {
        Self {
            actions,
            options: WaitOptions {
                timeout_ms: DEFAULT_DISMISS_ATTEMPT_MS,
                poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            },
        }
    }

    /// Commonly labelled consent and close controls
    #[must_use]
    pub fn default_actions() -> Vec<ElementQuery> {
        vec![
            ElementQuery::new(ElementKind::Button).text_contains("accept"),
            ElementQuery::new(ElementKind::Button).text_contains("allow"),
            ElementQuery::new(ElementKind::Button).text_contains("agree"),
            ElementQuery::new(ElementKind::Button).text_contains("got it"),
            ElementQuery::new(ElementKind::Button).attribute_contains("aria-label", "close"),
        ]
    }

    /// Set the locate budget per action
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = timeout_ms;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.options.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Configured actions
    #[must_use]
    pub fn actions(&self) -> &[ElementQuery] {
        &self.actions
    }

    /// Locate and activate one control within the attempt budget
    pub async fn attempt<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
        action: &ElementQuery,
    ) -> DismissalOutcome {
        let target = match Locator::new(action.clone())
            .with_options(self.options)
            .resolve(driver)
            .await
        {
            Ok(target) => target,
            Err(e) => {
                debug!(action = %action, error = %e, "no overlay control");
                return DismissalOutcome::NotPresent;
            }
        };

        match driver.activate(&target.element, ActivateOptions::default()).await {
            Ok(()) => DismissalOutcome::Dismissed {
                descriptor: target.descriptor,
            },
            Err(e) => {
                warn!(target = %target, error = %e, "overlay control could not be activated");
                DismissalOutcome::NotPresent
            }
        }
    }

    /// Try each action in order, stopping at the first dismissal
    pub async fn dismiss<D: BrowsingDriver + ?Sized>(&self, driver: &D) -> DismissalOutcome {
        for action in &self.actions {
            let outcome = self.attempt(driver, action).await;
            if let DismissalOutcome::Dismissed { descriptor } = &outcome {
                info!(control = %descriptor, "overlay dismissed");
                return outcome;
            }
        }
        debug!("no overlay present");
        DismissalOutcome::NotPresent
    }
}
