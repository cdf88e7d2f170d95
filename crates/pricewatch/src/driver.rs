//! BrowsingDriver - Abstract Browser Automation Trait
//!
//! The engine depends only on this capability set, never on a specific
//! automation product.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  BrowsingDriver (Abstract Trait)                                  │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────┐      ┌─────────────────────────┐     │
//! │  │  ChromiumDriver         │      │  MockDriver             │     │
//! │  │  (feature = "browser")  │      │  (tests, dry runs)      │     │
//! │  │  CDP via chromiumoxide  │      │  in-memory document     │     │
//! │  └─────────────────────────┘      └─────────────────────────┘     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

use crate::locator::ElementQuery;
use crate::result::{PriceWatchError, PriceWatchResult};
use crate::wait::LoadState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Default budget for one driver call other than navigation (10 seconds)
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 10_000;

/// Handle to one rendered element, valid for the life of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-assigned identifier
    pub id: String,
    /// Lowercase element tag name
    pub tag_name: String,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: tag_name.into(),
        }
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}#{}>", self.tag_name, self.id)
    }
}

/// Synthetic DOM events the engine replays after a native value write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEvent {
    /// `input`
    Input,
    /// `change`
    Change,
    /// `blur`
    Blur,
}

impl DomEvent {
    /// DOM event type name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Change => "change",
            Self::Blur => "blur",
        }
    }

    /// Whether the event bubbles when dispatched
    #[must_use]
    pub const fn bubbles(&self) -> bool {
        !matches!(self, Self::Blur)
    }
}

impl std::fmt::Display for DomEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for activating (clicking) an element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivateOptions {
    /// Skip pointer-occlusion checks and activate the element directly
    pub force: bool,
}

impl ActivateOptions {
    /// Forced activation
    #[must_use]
    pub const fn forced() -> Self {
        Self { force: true }
    }
}

/// Visual and DOM snapshot taken for post-mortem inspection
#[derive(Debug, Clone)]
pub struct DiagnosticArtifact {
    /// Raw PNG data
    pub screenshot: Option<Vec<u8>>,
    /// Serialized document HTML
    pub dom_html: Option<String>,
    /// URL at capture time
    pub url: Option<String>,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl DiagnosticArtifact {
    /// Create an empty artifact stamped now
    #[must_use]
    pub fn new() -> Self {
        Self {
            screenshot: None,
            dom_html: None,
            url: None,
            captured_at: Utc::now(),
        }
    }

    /// Attach a screenshot
    #[must_use]
    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot = Some(png);
        self
    }

    /// Attach document HTML
    #[must_use]
    pub fn with_dom(mut self, html: impl Into<String>) -> Self {
        self.dom_html = Some(html.into());
        self
    }

    /// Attach the page URL
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Whether the artifact carries anything worth writing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.screenshot.as_ref().map_or(true, Vec::is_empty)
            && self.dom_html.as_ref().map_or(true, String::is_empty)
    }
}

impl Default for DiagnosticArtifact {
    fn default() -> Self {
        Self::new()
    }
}

/// Abstract driver trait for browser automation
///
/// # Implementations
///
/// - `ChromiumDriver` - uses chromiumoxide over CDP (feature `browser`)
/// - `MockDriver` - in-memory document for unit testing
#[async_trait]
pub trait BrowsingDriver: Send + Sync {
    /// Navigate to URL and wait for the given load state
    async fn navigate(&self, url: &str, wait_until: LoadState) -> PriceWatchResult<()>;

    /// First element in document order matching the query, if any
    async fn query(&self, query: &ElementQuery) -> PriceWatchResult<Option<ElementHandle>>;

    /// All elements matching the query, in document order
    async fn query_all(&self, query: &ElementQuery) -> PriceWatchResult<Vec<ElementHandle>>;

    /// First descendant of `parent` matching the query
    async fn query_within(
        &self,
        parent: &ElementHandle,
        query: &ElementQuery,
    ) -> PriceWatchResult<Option<ElementHandle>>;

    /// Current `value` property of a form control
    async fn element_value(&self, element: &ElementHandle) -> PriceWatchResult<String>;

    /// Whether the control is enabled and interactive
    async fn is_enabled(&self, element: &ElementHandle) -> PriceWatchResult<bool>;

    /// Attribute value, if present
    async fn attribute(&self, element: &ElementHandle, name: &str)
        -> PriceWatchResult<Option<String>>;

    /// Rendered text content, if any
    async fn text_content(&self, element: &ElementHandle) -> PriceWatchResult<Option<String>>;

    /// Standard fill primitive
    async fn fill(&self, element: &ElementHandle, value: &str) -> PriceWatchResult<()>;

    /// Write through the platform's native value setter, bypassing any
    /// setter the page installed on the element
    async fn set_native_value(&self, element: &ElementHandle, value: &str) -> PriceWatchResult<()>;

    /// Dispatch a synthetic DOM event on the element
    async fn dispatch_event(&self, element: &ElementHandle, event: DomEvent)
        -> PriceWatchResult<()>;

    /// Focus the element
    async fn focus(&self, element: &ElementHandle) -> PriceWatchResult<()>;

    /// Select the element's entire contents
    async fn select_all(&self, element: &ElementHandle) -> PriceWatchResult<()>;

    /// Type one character as a key press into the focused element
    async fn type_char(&self, element: &ElementHandle, ch: char) -> PriceWatchResult<()>;

    /// Activate (click) the element
    async fn activate(&self, element: &ElementHandle, options: ActivateOptions)
        -> PriceWatchResult<()>;

    /// Capture a screenshot and DOM snapshot
    async fn snapshot(&self) -> PriceWatchResult<DiagnosticArtifact>;

    /// Release the browsing session
    async fn dispose(&self) -> PriceWatchResult<()>;
}

/// Opens one isolated browsing session per run
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Driver type the factory produces
    type Driver: BrowsingDriver;

    /// Acquire a fresh session
    async fn open(&self) -> PriceWatchResult<Self::Driver>;
}

// =============================================================================
// BOUNDED DRIVER
// =============================================================================

/// Wraps a driver so no single call can hang the run.
///
/// Every call except `navigate` fails with [`PriceWatchError::Driver`] once
/// `budget` elapses. Navigation keeps its own, longer, deadline.
pub struct BoundedDriver<'a, D: ?Sized> {
    inner: &'a D,
    budget: Duration,
}

impl<'a, D: BrowsingDriver + ?Sized> BoundedDriver<'a, D> {
    /// Bound every call on `inner` by `budget`
    #[must_use]
    pub const fn new(inner: &'a D, budget: Duration) -> Self {
        Self { inner, budget }
    }

    /// Per-call budget
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    async fn within<T>(
        &self,
        op: &str,
        call: impl Future<Output = PriceWatchResult<T>> + Send,
    ) -> PriceWatchResult<T> {
        tokio::time::timeout(self.budget, call).await.unwrap_or_else(|_| {
            Err(PriceWatchError::driver(format!(
                "{op} did not complete within {}ms",
                self.budget.as_millis()
            )))
        })
    }
}

impl<D: ?Sized> std::fmt::Debug for BoundedDriver<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedDriver")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<'a, D: BrowsingDriver + ?Sized> BrowsingDriver for BoundedDriver<'a, D> {
    async fn navigate(&self, url: &str, wait_until: LoadState) -> PriceWatchResult<()> {
        self.inner.navigate(url, wait_until).await
    }

    async fn query(&self, query: &ElementQuery) -> PriceWatchResult<Option<ElementHandle>> {
        self.within("query", self.inner.query(query)).await
    }

    async fn query_all(&self, query: &ElementQuery) -> PriceWatchResult<Vec<ElementHandle>> {
        self.within("query_all", self.inner.query_all(query)).await
    }

    async fn query_within(
        &self,
        parent: &ElementHandle,
        query: &ElementQuery,
    ) -> PriceWatchResult<Option<ElementHandle>> {
        self.within("query_within", self.inner.query_within(parent, query))
            .await
    }

    async fn element_value(&self, element: &ElementHandle) -> PriceWatchResult<String> {
        self.within("element_value", self.inner.element_value(element))
            .await
    }

    async fn is_enabled(&self, element: &ElementHandle) -> PriceWatchResult<bool> {
        self.within("is_enabled", self.inner.is_enabled(element)).await
    }

    async fn attribute(&self, element: &ElementHandle, name: &str)
        -> PriceWatchResult<Option<String>> {
        self.within("attribute", self.inner.attribute(element, name))
            .await
    }

    async fn text_content(&self, element: &ElementHandle) -> PriceWatchResult<Option<String>> {
        self.within("text_content", self.inner.text_content(element))
            .await
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> PriceWatchResult<()> {
        self.within("fill", self.inner.fill(element, value)).await
    }

    async fn set_native_value(&self, element: &ElementHandle, value: &str) -> PriceWatchResult<()> {
        self.within("set_native_value", self.inner.set_native_value(element, value))
            .await
    }

    async fn dispatch_event(&self, element: &ElementHandle, event: DomEvent)
        -> PriceWatchResult<()> {
        self.within("dispatch_event", self.inner.dispatch_event(element, event))
            .await
    }

    async fn focus(&self, element: &ElementHandle) -> PriceWatchResult<()> {
        self.within("focus", self.inner.focus(element)).await
    }

    async fn select_all(&self, element: &ElementHandle) -> PriceWatchResult<()> {
        self.within("select_all", self.inner.select_all(element)).await
    }

    async fn type_char(&self, element: &ElementHandle, ch: char) -> PriceWatchResult<()> {
        self.within("type_char", self.inner.type_char(element, ch)).await
    }

    async fn activate(&self, element: &ElementHandle, options: ActivateOptions)
        -> PriceWatchResult<()> {
        self.within("activate", self.inner.activate(element, options))
            .await
    }

    async fn snapshot(&self) -> PriceWatchResult<DiagnosticArtifact> {
        self.within("snapshot", self.inner.snapshot()).await
    }

    async fn dispose(&self) -> PriceWatchResult<()> {
        self.within("dispose", self.inner.dispose()).await
    }
}
