//! Run configuration.
//!
//! Every section is `#[serde(default)]`, so a YAML file only needs the keys
//! it changes:
//!
//! ```yaml
//! target_url: https://www.energymadeeasy.gov.au/
//! field_value: "3000"
//! timeouts:
//!   results_ready_ms: 90000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::browser::BrowserSettings;
use crate::driver::DEFAULT_ACTION_TIMEOUT_MS;
use crate::dismiss::{OverlayDismisser, DEFAULT_DISMISS_ATTEMPT_MS};
use crate::extract::ExtractorConfig;
use crate::inject::{InjectionStrategy, DEFAULT_KEYSTROKE_DELAY_MS, DEFAULT_SETTLE_DELAY_MS};
use crate::locator::{ElementKind, ElementQuery, DEFAULT_LOCATE_TIMEOUT_MS};
use crate::readiness::{ReadinessWait, DEFAULT_RESULTS_TIMEOUT_MS};
use crate::result::{PriceWatchError, PriceWatchResult};
use crate::submit::{SubmissionTrigger, DEFAULT_SUBMIT_ENABLE_TIMEOUT_MS};
use crate::wait::{LoadState, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};

/// Default comparison page
pub const DEFAULT_TARGET_URL: &str = "https://www.energymadeeasy.gov.au/";

/// Default postcode
pub const DEFAULT_FIELD_VALUE: &str = "3000";

/// Default CSV log
pub const DEFAULT_OUTPUT: &str = "data.csv";

/// Default snapshot directory
pub const DEFAULT_DIAGNOSTICS_DIR: &str = "diagnostics";

/// Stage timeouts in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Page load
    pub navigation_ms: u64,
    /// Finding the input field and submit control
    pub locate_ms: u64,
    /// Submit control becoming enabled
    pub submit_enable_ms: u64,
    /// Result indicator rendering
    pub results_ready_ms: u64,
    /// Any single driver call other than navigation, including the failure
    /// snapshot and session dispose
    pub action_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: DEFAULT_WAIT_TIMEOUT_MS,
            locate_ms: DEFAULT_LOCATE_TIMEOUT_MS,
            submit_enable_ms: DEFAULT_SUBMIT_ENABLE_TIMEOUT_MS,
            results_ready_ms: DEFAULT_RESULTS_TIMEOUT_MS,
            action_ms: DEFAULT_ACTION_TIMEOUT_MS,
        }
    }
}

/// Element queries for every stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Input field candidates, tried in order
    pub target: Vec<ElementQuery>,
    /// Overlay dismissal actions, tried in order
    pub overlay: Vec<ElementQuery>,
    /// Submit control candidates, tried in order
    pub submit: Vec<ElementQuery>,
    /// Element whose presence means results have rendered
    pub results_ready: ElementQuery,
    /// Result item, brand and price selectors
    pub extract: ExtractorConfig,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            target: vec![ElementQuery::keyword_in(
                ElementKind::Input,
                &["placeholder", "name", "id", "aria-label"],
                "post",
            )],
            overlay: OverlayDismisser::default_actions(),
            submit: SubmissionTrigger::default_candidates(),
            results_ready: ReadinessWait::default().indicator().clone(),
            extract: ExtractorConfig::default(),
        }
    }
}

/// Value injection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    /// Strategies in priority order
    pub strategies: Vec<InjectionStrategy>,
    /// Pause before reading the value back
    pub settle_ms: u64,
    /// Pause between simulated key presses
    pub keystroke_ms: u64,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            strategies: InjectionStrategy::ALL.to_vec(),
            settle_ms: DEFAULT_SETTLE_DELAY_MS,
            keystroke_ms: DEFAULT_KEYSTROKE_DELAY_MS,
        }
    }
}

/// Complete configuration for one extraction run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Comparison page URL
    pub target_url: String,
    /// Value typed into the input field (e.g. a postcode)
    pub field_value: String,
    /// Load state navigation waits for
    pub wait_until: LoadState,
    /// Polling interval for every wait
    pub poll_interval_ms: u64,
    /// Locate budget per overlay dismissal action
    pub dismiss_attempt_ms: u64,
    /// Stage timeouts
    pub timeouts: Timeouts,
    /// Element queries
    pub selectors: SelectorConfig,
    /// Injection strategy chain
    pub injection: InjectionConfig,
    /// Browser launch settings
    pub browser: BrowserSettings,
    /// Where failure snapshots go (None disables capture)
    pub diagnostics_dir: Option<PathBuf>,
    /// CSV log path
    pub output: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            field_value: DEFAULT_FIELD_VALUE.to_string(),
            wait_until: LoadState::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            dismiss_attempt_ms: DEFAULT_DISMISS_ATTEMPT_MS,
            timeouts: Timeouts::default(),
            selectors: SelectorConfig::default(),
            injection: InjectionConfig::default(),
            browser: BrowserSettings::default(),
            diagnostics_dir: Some(PathBuf::from(DEFAULT_DIAGNOSTICS_DIR)),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

impl RunConfig {
    /// Load from a YAML file
    pub fn load(path: &Path) -> PriceWatchResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Parse YAML
    pub fn from_yaml_str(yaml: &str) -> PriceWatchResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> PriceWatchResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Set the target URL
    #[must_use]
    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = url.into();
        self
    }

    /// Set the field value
    #[must_use]
    pub fn with_field_value(mut self, value: impl Into<String>) -> Self {
        self.field_value = value.into();
        self
    }

    /// Set the output path
    #[must_use]
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    /// Set or clear the diagnostics directory
    #[must_use]
    pub fn with_diagnostics_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.diagnostics_dir = dir;
        self
    }

    /// Replace the stage timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> PriceWatchResult<()> {
        if self.target_url.trim().is_empty() {
            return Err(PriceWatchError::config("target_url must not be empty"));
        }
        if self.field_value.is_empty() {
            return Err(PriceWatchError::config("field_value must not be empty"));
        }
        let timeouts = [
            ("timeouts.navigation_ms", self.timeouts.navigation_ms),
            ("timeouts.locate_ms", self.timeouts.locate_ms),
            ("timeouts.submit_enable_ms", self.timeouts.submit_enable_ms),
            ("timeouts.results_ready_ms", self.timeouts.results_ready_ms),
            ("timeouts.action_ms", self.timeouts.action_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(PriceWatchError::config(format!("{name} must be positive")));
        }
        if self.selectors.target.is_empty() {
            return Err(PriceWatchError::config("selectors.target needs at least one query"));
        }
        if self.selectors.submit.is_empty() {
            return Err(PriceWatchError::config("selectors.submit needs at least one query"));
        }
        let strategies = &self.injection.strategies;
        if strategies.is_empty() {
            return Err(PriceWatchError::config(
                "injection.strategies needs at least one strategy",
            ));
        }
        if let Some((i, repeated)) = strategies
            .iter()
            .enumerate()
            .find(|&(i, s)| strategies[..i].contains(s))
        {
            return Err(PriceWatchError::config(format!(
                "injection.strategies lists {} more than once (entry {})",
                repeated.name(),
                i + 1
            )));
        }
        if self.selectors.extract.brand_attributes.is_empty() {
            return Err(PriceWatchError::config(
                "selectors.extract.brand_attributes must name at least one attribute",
            ));
        }
        Ok(())
    }

    /// Commented YAML written by `pricewatch init`
    pub fn template() -> PriceWatchResult<String> {
        let body = Self::default().to_yaml()?;
        Ok(format!(
            "# pricewatch run configuration\n\
             # Every key is optional; missing keys use the values shown here.\n\
             {body}"
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod defaults_tests {
        use super::*;

        #[test]
        fn test_default_is_valid() {
            RunConfig::default().validate().unwrap();
        }

        #[test]
        fn test_default_timeouts() {
            let t = Timeouts::default();
            assert_eq!(t.results_ready_ms, 60_000);
            assert_eq!(t.submit_enable_ms, 10_000);
            assert_eq!(t.action_ms, DEFAULT_ACTION_TIMEOUT_MS);
        }

        #[test]
        fn test_default_target_matches_postcode_keyword() {
            let config = RunConfig::default();
            let query = &config.selectors.target[0];
            assert_eq!(query.kind, ElementKind::Input);
            assert_eq!(query.any_of.len(), 4);
        }
    }

    mod yaml_tests {
        use super::*;

        #[test]
        fn test_partial_yaml_keeps_defaults() {
            let config = RunConfig::from_yaml_str(
                "field_value: \"2000\"\ntimeouts:\n  results_ready_ms: 5000\n",
            )
            .unwrap();
            assert_eq!(config.field_value, "2000");
            assert_eq!(config.timeouts.results_ready_ms, 5_000);
            assert_eq!(config.timeouts.locate_ms, DEFAULT_LOCATE_TIMEOUT_MS);
            assert_eq!(config.target_url, DEFAULT_TARGET_URL);
        }

        #[test]
        fn test_yaml_round_trip_of_defaults() {
            let yaml = RunConfig::default().to_yaml().unwrap();
            assert_eq!(RunConfig::from_yaml_str(&yaml).unwrap(), RunConfig::default());
        }

        #[test]
        fn test_template_parses() {
            let template = RunConfig::template().unwrap();
            assert!(template.starts_with("# pricewatch"));
            assert_eq!(RunConfig::from_yaml_str(&template).unwrap(), RunConfig::default());
        }

        #[test]
        fn test_injection_strategies_from_yaml() {
            let config =
                RunConfig::from_yaml_str("injection:\n  strategies: [keyboard]\n").unwrap();
            assert_eq!(config.injection.strategies, vec![InjectionStrategy::Keyboard]);
            assert_eq!(config.injection.settle_ms, DEFAULT_SETTLE_DELAY_MS);
        }

        #[test]
        fn test_invalid_yaml_is_error() {
            let err = RunConfig::from_yaml_str("timeouts: [1, 2]").unwrap_err();
            assert!(matches!(err, PriceWatchError::Yaml(_)));
        }

        #[test]
        fn test_load_from_file() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("pricewatch.yaml");
            std::fs::write(&path, "target_url: https://example.test/\n").unwrap();
            assert_eq!(RunConfig::load(&path).unwrap().target_url, "https://example.test/");
        }

        #[test]
        fn test_missing_file_is_io_error() {
            let err = RunConfig::load(Path::new("/nonexistent/pricewatch.yaml")).unwrap_err();
            assert!(matches!(err, PriceWatchError::Io(_)));
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn test_rejects_empty_url() {
            let err = RunConfig::default().with_target_url("  ").validate().unwrap_err();
            assert!(err.to_string().contains("target_url"));
        }

        #[test]
        fn test_rejects_empty_value() {
            let err = RunConfig::default().with_field_value("").validate().unwrap_err();
            assert!(err.to_string().contains("field_value"));
        }

        #[test]
        fn test_rejects_zero_timeout() {
            let config = RunConfig::default().with_timeouts(Timeouts {
                submit_enable_ms: 0,
                ..Timeouts::default()
            });
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("timeouts.submit_enable_ms"));

            let config = RunConfig::default().with_timeouts(Timeouts {
                action_ms: 0,
                ..Timeouts::default()
            });
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("timeouts.action_ms"));
        }

        #[test]
        fn test_rejects_empty_strategy_list() {
            let mut config = RunConfig::default();
            config.injection.strategies.clear();
            let err = config.validate().unwrap_err();
            assert!(matches!(err, PriceWatchError::Config { .. }));
            assert!(err.to_string().contains("injection.strategies"));
        }

        #[test]
        fn test_rejects_repeated_strategy() {
            let config = RunConfig::from_yaml_str(
                "injection:\n  strategies: [direct-fill, direct-fill]\n",
            )
            .unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("direct-fill more than once"));
        }

        #[test]
        fn test_rejects_empty_target_queries() {
            let mut config = RunConfig::default();
            config.selectors.target.clear();
            assert!(config.validate().is_err());
        }
    }
}
