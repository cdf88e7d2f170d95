//! Value-injection strategy chain.
//!
//! Reactive front-ends often ignore a plain value write because their own
//! state never hears about it. The chain tries progressively more
//! "human-like" strategies and verifies each one by reading the control
//! back after a settle delay.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::driver::{BrowsingDriver, DomEvent, ElementHandle};
use crate::locator::InteractionTarget;
use crate::result::{PriceWatchError, PriceWatchResult};
use crate::wait::settle;

/// Default pause between a write and its read-back (250ms)
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 250;

/// Default pause between simulated key presses (60ms)
pub const DEFAULT_KEYSTROKE_DELAY_MS: u64 = 60;

const NATIVE_SETTER_EVENTS: [DomEvent; 3] = [DomEvent::Input, DomEvent::Change, DomEvent::Blur];

/// Value to place in a form control
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValue(String);

impl FieldValue {
    /// Wrap a value
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One way of writing a value into a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InjectionStrategy {
    /// Standard fill primitive
    DirectFill,
    /// Platform value setter followed by `input`, `change`, `blur`
    NativeSetter,
    /// Focus, select all, then type character by character
    Keyboard,
}

impl InjectionStrategy {
    /// Every strategy in default priority order
    pub const ALL: [Self; 3] = [Self::DirectFill, Self::NativeSetter, Self::Keyboard];

    /// Stable name used in logs and configuration
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DirectFill => "direct-fill",
            Self::NativeSetter => "native-setter",
            Self::Keyboard => "keyboard",
        }
    }
}

impl fmt::Display for InjectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one strategy attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Strategy that was applied
    pub strategy: InjectionStrategy,
    /// Whether the read-back matched
    pub succeeded: bool,
    /// Value read back after settling, if the read worked
    pub observed_value: Option<String>,
    /// Driver error, if the strategy or the read-back failed
    pub error: Option<String>,
}

impl AttemptRecord {
    /// The read-back matched
    #[must_use]
    pub fn success(strategy: InjectionStrategy, observed: impl Into<String>) -> Self {
        Self {
            strategy,
            succeeded: true,
            observed_value: Some(observed.into()),
            error: None,
        }
    }

    /// The strategy ran but the control holds something else
    #[must_use]
    pub fn mismatch(strategy: InjectionStrategy, observed: impl Into<String>) -> Self {
        Self {
            strategy,
            succeeded: false,
            observed_value: Some(observed.into()),
            error: None,
        }
    }

    /// The strategy or its read-back errored
    #[must_use]
    pub fn errored(strategy: InjectionStrategy, error: impl Into<String>) -> Self {
        Self {
            strategy,
            succeeded: false,
            observed_value: None,
            error: Some(error.into()),
        }
    }
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, &self.observed_value) {
            (Some(error), _) => write!(f, "{} failed ({error})", self.strategy),
            (None, Some(observed)) if self.succeeded => {
                write!(f, "{} ok ({observed:?})", self.strategy)
            }
            (None, Some(observed)) => write!(f, "{} read back {observed:?}", self.strategy),
            (None, None) => write!(f, "{} gave no result", self.strategy),
        }
    }
}

/// Ordered list of injection strategies with shared timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyChain {
    strategies: Vec<InjectionStrategy>,
    settle_delay: Duration,
    keystroke_delay: Duration,
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::new(InjectionStrategy::ALL.to_vec())
    }
}

impl StrategyChain {
    /// Chain trying `strategies` in order; repeated entries are dropped
    #[must_use]
    pub fn new(strategies: Vec<InjectionStrategy>) -> Self {
        let mut unique = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            if !unique.contains(&strategy) {
                unique.push(strategy);
            }
        }
        Self {
            strategies: unique,
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            keystroke_delay: Duration::from_millis(DEFAULT_KEYSTROKE_DELAY_MS),
        }
    }

    /// Set the read-back settle delay
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the inter-character delay for keyboard simulation
    #[must_use]
    pub const fn with_keystroke_delay(mut self, delay: Duration) -> Self {
        self.keystroke_delay = delay;
        self
    }

    /// Configured strategies
    #[must_use]
    pub fn strategies(&self) -> &[InjectionStrategy] {
        &self.strategies
    }

    /// Write `value` into the target, returning the strategy that stuck.
    ///
    /// Each strategy runs at most once. Fails with `ValueInjectionFailed`
    /// carrying every attempt when none of them leaves the control holding
    /// exactly `value`.
    pub async fn inject<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
        target: &InteractionTarget,
        value: &FieldValue,
    ) -> PriceWatchResult<InjectionStrategy> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for &strategy in &self.strategies {
            let record = self.attempt(driver, &target.element, strategy, value).await;
            if record.succeeded {
                info!(strategy = %strategy, target = %target, "value injected");
                return Ok(strategy);
            }
            warn!(strategy = %strategy, attempt = %record, "injection strategy did not stick");
            attempts.push(record);
        }

        Err(PriceWatchError::ValueInjectionFailed {
            descriptor: target.descriptor.clone(),
            attempts,
        })
    }

    async fn attempt<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
        element: &ElementHandle,
        strategy: InjectionStrategy,
        value: &FieldValue,
    ) -> AttemptRecord {
        debug!(strategy = %strategy, element = %element, "applying injection strategy");
        if let Err(e) = self.apply(driver, element, strategy, value).await {
            return AttemptRecord::errored(strategy, e.to_string());
        }

        settle(self.settle_delay).await;

        match driver.element_value(element).await {
            Ok(observed) if observed == value.as_str() => AttemptRecord::success(strategy, observed),
            Ok(observed) => AttemptRecord::mismatch(strategy, observed),
            Err(e) => AttemptRecord::errored(strategy, e.to_string()),
        }
    }

    async fn apply<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
        element: &ElementHandle,
        strategy: InjectionStrategy,
        value: &FieldValue,
    ) -> PriceWatchResult<()> {
        match strategy {
            InjectionStrategy::DirectFill => driver.fill(element, value.as_str()).await,
            InjectionStrategy::NativeSetter => {
                driver.set_native_value(element, value.as_str()).await?;
                for event in NATIVE_SETTER_EVENTS {
                    driver.dispatch_event(element, event).await?;
                }
                Ok(())
            }
            InjectionStrategy::Keyboard => {
                driver.focus(element).await?;
                driver.select_all(element).await?;
                for (i, ch) in value.as_str().chars().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(self.keystroke_delay).await;
                    }
                    driver.type_char(element, ch).await?;
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
