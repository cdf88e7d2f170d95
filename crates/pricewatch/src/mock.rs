//! In-memory browsing driver for tests and offline runs.
//!
//! A [`MockDocument`] is a tree of [`MockNode`]s with scripted timing
//! (appearance, enablement, reveal-on-click) and scripted control
//! behaviour, so every engine stage can be exercised without a browser.
//! Time is read from `tokio::time`, which makes the document deterministic
//! under a paused test clock.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::driver::{
    ActivateOptions, BrowsingDriver, DiagnosticArtifact, DomEvent, ElementHandle, SessionFactory,
};
use crate::locator::{DomNode, ElementQuery};
use crate::result::{PriceWatchError, PriceWatchResult};
use crate::wait::LoadState;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

// =============================================================================
// DOCUMENT MODEL
// =============================================================================

/// How a form control reacts to value writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlBehavior {
    /// Every write primitive updates the value
    #[default]
    Plain,
    /// Framework-managed: the observable value only changes when an `input`
    /// event or a key press commits it, so a bare fill is lost
    Reactive,
    /// Only key presses work; fill errors and native writes are ignored
    KeyboardOnly,
    /// Accepts every call and never changes
    ReadOnly,
}

/// One element in a mock document
#[derive(Debug, Clone, Default)]
pub struct MockNode {
    tag: String,
    key: Option<String>,
    attrs: BTreeMap<String, String>,
    text: String,
    value: String,
    behavior: ControlBehavior,
    disabled: bool,
    enabled_after: Option<Duration>,
    appears_after: Option<Duration>,
    revealed_by: Option<(String, Duration)>,
    removed_on_activate: bool,
    unreadable: bool,
    children: Vec<MockNode>,
}

impl MockNode {
    /// Element with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Test-side name used with [`MockDriver::handle_for`]
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Set own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Initial control value
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Control behaviour for value writes
    #[must_use]
    pub const fn behavior(mut self, behavior: ControlBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Permanently disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Disabled until `delay` after page load
    #[must_use]
    pub const fn enabled_after(mut self, delay: Duration) -> Self {
        self.disabled = true;
        self.enabled_after = Some(delay);
        self
    }

    /// Absent until `delay` after page load
    #[must_use]
    pub const fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = Some(delay);
        self
    }

    /// Absent until `delay` after the node keyed `trigger` is activated
    #[must_use]
    pub fn appears_after_activation(mut self, trigger: impl Into<String>, delay: Duration) -> Self {
        self.revealed_by = Some((trigger.into(), delay));
        self
    }

    /// Removed from the document when activated
    #[must_use]
    pub const fn removed_on_activate(mut self) -> Self {
        self.removed_on_activate = true;
        self
    }

    /// Attribute and text reads fail as if the node were detached
    #[must_use]
    pub const fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }

    /// Append a child
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }
}

/// Root-level node list
#[derive(Debug, Clone, Default)]
pub struct MockDocument {
    roots: Vec<MockNode>,
}

impl MockDocument {
    /// Empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root node
    #[must_use]
    pub fn with(mut self, node: MockNode) -> Self {
        self.roots.push(node);
        self
    }

    /// A typical energy comparison page: consent banner, a framework-managed
    /// postcode input, a compare button enabled once the page hydrates, and
    /// plan cards revealed shortly after the button is pressed.
    #[must_use]
    pub fn comparison_page(plans: &[(&str, &str)]) -> Self {
        let results = plans.iter().fold(
            MockNode::new("section")
                .attr("class", "results-list")
                .appears_after_activation("compare", Duration::from_millis(800)),
            |section, (brand, price)| {
                section.child(
                    MockNode::new("div")
                        .attr("class", "plan-card")
                        .child(MockNode::new("img").attr("alt", *brand))
                        .child(MockNode::new("span").attr("class", "price").text(*price)),
                )
            },
        );

        Self::new()
            .with(
                MockNode::new("div")
                    .attr("class", "cookie-banner")
                    .child(
                        MockNode::new("button")
                            .key("consent")
                            .text("Accept all")
                            .removed_on_activate(),
                    ),
            )
            .with(
                MockNode::new("form")
                    .child(
                        MockNode::new("input")
                            .key("postcode")
                            .attr("type", "text")
                            .attr("placeholder", "Enter your postcode")
                            .behavior(ControlBehavior::Reactive),
                    )
                    .child(
                        MockNode::new("button")
                            .key("compare")
                            .attr("type", "submit")
                            .text("Compare plans")
                            .enabled_after(Duration::from_millis(500)),
                    ),
            )
            .with(results)
    }
}

#[derive(Debug)]
struct Slot {
    node: MockNode,
    parent: Option<usize>,
    subtree_end: usize,
    raw_value: String,
    committed_value: String,
    select_pending: bool,
    removed: bool,
}

fn flatten(node: MockNode, parent: Option<usize>, slots: &mut Vec<Slot>) {
    let index = slots.len();
    let mut children = Vec::new();
    let mut node = node;
    std::mem::swap(&mut children, &mut node.children);
    slots.push(Slot {
        raw_value: node.value.clone(),
        committed_value: node.value.clone(),
        node,
        parent,
        subtree_end: index + 1,
        select_pending: false,
        removed: false,
    });
    for child in children {
        flatten(child, Some(index), slots);
    }
    slots[index].subtree_end = slots.len();
}

struct NodeView<'a> {
    slots: &'a [Slot],
    index: usize,
}

impl DomNode for NodeView<'_> {
    fn tag_name(&self) -> &str {
        &self.slots[self.index].node.tag
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.slots[self.index].node.attrs.get(name).map(String::as_str)
    }

    fn text(&self) -> String {
        let slot = &self.slots[self.index];
        self.slots[self.index..slot.subtree_end]
            .iter()
            .map(|s| s.node.text.as_str())
            .collect()
    }
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

#[derive(Debug)]
struct MockState {
    slots: Vec<Slot>,
    created_at: Instant,
    loaded_at: Option<Instant>,
    activations: HashMap<usize, Vec<Instant>>,
    call_history: Vec<String>,
    current_url: Option<String>,
    navigation_error: Option<String>,
    stalled: HashSet<&'static str>,
    snapshot_error: Option<String>,
    query_errors_remaining: u32,
    disposed: bool,
}

impl MockState {
    fn page_age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.loaded_at.unwrap_or(self.created_at))
    }

    fn first_activation(&self, key: &str) -> Option<Instant> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.node.key.as_deref() == Some(key))
            .filter_map(|(index, _)| self.activations.get(&index).and_then(|t| t.first()))
            .min()
            .copied()
    }

    fn is_present(&self, index: usize, now: Instant) -> bool {
        let slot = &self.slots[index];
        if slot.removed {
            return false;
        }
        if slot
            .node
            .appears_after
            .is_some_and(|delay| self.page_age(now) < delay)
        {
            return false;
        }
        if let Some((trigger, delay)) = &slot.node.revealed_by {
            let revealed = self
                .first_activation(trigger)
                .is_some_and(|at| now.saturating_duration_since(at) >= *delay);
            if !revealed {
                return false;
            }
        }
        slot.parent.map_or(true, |parent| self.is_present(parent, now))
    }

    fn is_enabled(&self, index: usize, now: Instant) -> bool {
        let node = &self.slots[index].node;
        if !node.disabled {
            return true;
        }
        node.enabled_after
            .is_some_and(|delay| self.page_age(now) >= delay)
    }

    fn resolve(&self, element: &ElementHandle) -> PriceWatchResult<usize> {
        let index = element
            .id
            .strip_prefix("node-")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|index| *index < self.slots.len())
            .ok_or_else(|| PriceWatchError::driver(format!("unknown element {element}")))?;
        if !self.is_present(index, Instant::now()) {
            return Err(PriceWatchError::driver(format!(
                "element {element} is detached from the document"
            )));
        }
        Ok(index)
    }

    fn handle(&self, index: usize) -> ElementHandle {
        ElementHandle::new(format!("node-{index}"), self.slots[index].node.tag.clone())
    }

    fn find(&self, range: std::ops::Range<usize>, query: &ElementQuery) -> Vec<usize> {
        let now = Instant::now();
        range
            .filter(|index| self.is_present(*index, now))
            .filter(|index| {
                query.matches(&NodeView {
                    slots: &self.slots,
                    index: *index,
                })
            })
            .collect()
    }

    fn take_query_error(&mut self) -> PriceWatchResult<()> {
        if self.query_errors_remaining > 0 {
            self.query_errors_remaining -= 1;
            return Err(PriceWatchError::driver(
                "execution context was destroyed",
            ));
        }
        Ok(())
    }

    fn render(&self, index: usize, now: Instant, out: &mut String) {
        let slot = &self.slots[index];
        out.push('<');
        out.push_str(&slot.node.tag);
        for (name, value) in &slot.node.attrs {
            out.push_str(&format!(" {name}=\"{}\"", value.replace('"', "&quot;")));
        }
        out.push('>');
        out.push_str(&slot.node.text);
        let mut child = index + 1;
        while child < slot.subtree_end {
            if self.is_present(child, now) {
                self.render(child, now, out);
            }
            child = self.slots[child].subtree_end;
        }
        out.push_str("</");
        out.push_str(&slot.node.tag);
        out.push('>');
    }
}

/// Mock driver over a [`MockDocument`].
///
/// Clones share one document, so a test can keep a handle for assertions
/// while the engine owns another.
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create a driver serving the document
    #[must_use]
    pub fn new(document: MockDocument) -> Self {
        let mut slots = Vec::new();
        for root in document.roots {
            flatten(root, None, &mut slots);
        }
        Self {
            state: Arc::new(Mutex::new(MockState {
                slots,
                created_at: Instant::now(),
                loaded_at: None,
                activations: HashMap::new(),
                call_history: Vec::new(),
                current_url: None,
                navigation_error: None,
                stalled: HashSet::new(),
                snapshot_error: None,
                query_errors_remaining: 0,
                disposed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: String) -> MutexGuard<'_, MockState> {
        let mut state = self.lock();
        state.call_history.push(call);
        state
    }

    /// Record the call, then hang forever if `method` is stalled
    async fn enter(&self, method: &'static str, call: String) -> MutexGuard<'_, MockState> {
        let stalled = self.record(call).stalled.contains(method);
        if stalled {
            std::future::pending::<()>().await;
        }
        self.lock()
    }

    /// Make navigation fail with the message
    #[must_use]
    pub fn fail_navigation(self, message: impl Into<String>) -> Self {
        self.lock().navigation_error = Some(message.into());
        self
    }

    /// Make navigation never complete
    #[must_use]
    pub fn stall_navigation(self) -> Self {
        self.stall("navigate")
    }

    /// Make calls to `method` never complete.
    ///
    /// Covers `navigate`, `fill`, `activate`, `snapshot` and `dispose`.
    #[must_use]
    pub fn stall(self, method: &'static str) -> Self {
        self.lock().stalled.insert(method);
        self
    }

    /// Make snapshots fail with the message
    #[must_use]
    pub fn fail_snapshot(self, message: impl Into<String>) -> Self {
        self.lock().snapshot_error = Some(message.into());
        self
    }

    /// Make the next `count` queries fail
    #[must_use]
    pub fn fail_queries(self, count: u32) -> Self {
        self.lock().query_errors_remaining = count;
        self
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().call_history.clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.lock()
            .call_history
            .iter()
            .any(|c| c.starts_with(method))
    }

    /// Number of recorded calls starting with `method`
    #[must_use]
    pub fn count_calls(&self, method: &str) -> usize {
        self.lock()
            .call_history
            .iter()
            .filter(|c| c.starts_with(method))
            .count()
    }

    /// Handle for the node carrying `key`, whether or not it is present
    #[must_use]
    pub fn handle_for(&self, key: &str) -> Option<ElementHandle> {
        let state = self.lock();
        state
            .slots
            .iter()
            .position(|slot| slot.node.key.as_deref() == Some(key))
            .map(|index| state.handle(index))
    }

    /// Times the node carrying `key` was activated
    #[must_use]
    pub fn activation_count(&self, key: &str) -> usize {
        let state = self.lock();
        state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.node.key.as_deref() == Some(key))
            .map(|(index, _)| state.activations.get(&index).map_or(0, Vec::len))
            .sum()
    }

    /// Observable value of the node carrying `key`
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<String> {
        let state = self.lock();
        state
            .slots
            .iter()
            .find(|slot| slot.node.key.as_deref() == Some(key))
            .map(|slot| observed_value(slot).to_string())
    }

    /// URL of the last successful navigation
    #[must_use]
    pub fn current_url(&self) -> Option<String> {
        self.lock().current_url.clone()
    }

    /// Whether the session was disposed
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

fn observed_value(slot: &Slot) -> &str {
    match slot.node.behavior {
        ControlBehavior::Reactive => &slot.committed_value,
        _ => &slot.raw_value,
    }
}

#[async_trait]
impl BrowsingDriver for MockDriver {
    async fn navigate(&self, url: &str, _wait_until: LoadState) -> PriceWatchResult<()> {
        let mut state = self.enter("navigate", format!("navigate:{url}")).await;
        if let Some(message) = state.navigation_error.clone() {
            return Err(PriceWatchError::driver(message));
        }
        state.current_url = Some(url.to_string());
        state.loaded_at = Some(Instant::now());
        Ok(())
    }

    async fn query(&self, query: &ElementQuery) -> PriceWatchResult<Option<ElementHandle>> {
        let mut state = self.record(format!("query:{query}"));
        state.take_query_error()?;
        let len = state.slots.len();
        Ok(state
            .find(0..len, query)
            .first()
            .map(|index| state.handle(*index)))
    }

    async fn query_all(&self, query: &ElementQuery) -> PriceWatchResult<Vec<ElementHandle>> {
        let mut state = self.record(format!("query_all:{query}"));
        state.take_query_error()?;
        let len = state.slots.len();
        Ok(state
            .find(0..len, query)
            .into_iter()
            .map(|index| state.handle(index))
            .collect())
    }

    async fn query_within(
        &self,
        parent: &ElementHandle,
        query: &ElementQuery,
    ) -> PriceWatchResult<Option<ElementHandle>> {
        let mut state = self.record(format!("query_within:{}:{query}", parent.id));
        state.take_query_error()?;
        let parent = state.resolve(parent)?;
        let range = parent + 1..state.slots[parent].subtree_end;
        Ok(state
            .find(range, query)
            .first()
            .map(|index| state.handle(*index)))
    }

    async fn element_value(&self, element: &ElementHandle) -> PriceWatchResult<String> {
        let state = self.lock();
        let index = state.resolve(element)?;
        Ok(observed_value(&state.slots[index]).to_string())
    }

    async fn is_enabled(&self, element: &ElementHandle) -> PriceWatchResult<bool> {
        let state = self.lock();
        let index = state.resolve(element)?;
        Ok(state.is_enabled(index, Instant::now()))
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> PriceWatchResult<Option<String>> {
        let state = self.lock();
        let index = state.resolve(element)?;
        let node = &state.slots[index].node;
        if node.unreadable {
            return Err(PriceWatchError::driver(format!("cannot read {name} of {element}")));
        }
        Ok(node.attrs.get(name).cloned())
    }

    async fn text_content(&self, element: &ElementHandle) -> PriceWatchResult<Option<String>> {
        let state = self.lock();
        let index = state.resolve(element)?;
        if state.slots[index].node.unreadable {
            return Err(PriceWatchError::driver(format!("cannot read text of {element}")));
        }
        Ok(Some(
            NodeView {
                slots: &state.slots,
                index,
            }
            .text(),
        ))
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> PriceWatchResult<()> {
        let mut state = self.enter("fill", format!("fill:{}", element.id)).await;
        let index = state.resolve(element)?;
        let slot = &mut state.slots[index];
        match slot.node.behavior {
            ControlBehavior::Plain | ControlBehavior::Reactive => {
                slot.raw_value = value.to_string();
            }
            ControlBehavior::KeyboardOnly => {
                return Err(PriceWatchError::driver(format!(
                    "element {element} is not fillable"
                )));
            }
            ControlBehavior::ReadOnly => {}
        }
        Ok(())
    }

    async fn set_native_value(&self, element: &ElementHandle, value: &str) -> PriceWatchResult<()> {
        let mut state = self.record(format!("set_native_value:{}", element.id));
        let index = state.resolve(element)?;
        let slot = &mut state.slots[index];
        if matches!(
            slot.node.behavior,
            ControlBehavior::Plain | ControlBehavior::Reactive
        ) {
            slot.raw_value = value.to_string();
        }
        Ok(())
    }

    async fn dispatch_event(&self, element: &ElementHandle, event: DomEvent) -> PriceWatchResult<()> {
        let mut state = self.record(format!("dispatch_event:{}:{event}", element.id));
        let index = state.resolve(element)?;
        let slot = &mut state.slots[index];
        if event == DomEvent::Input && slot.node.behavior == ControlBehavior::Reactive {
            slot.committed_value = slot.raw_value.clone();
        }
        Ok(())
    }

    async fn focus(&self, element: &ElementHandle) -> PriceWatchResult<()> {
        let state = self.record(format!("focus:{}", element.id));
        state.resolve(element)?;
        Ok(())
    }

    async fn select_all(&self, element: &ElementHandle) -> PriceWatchResult<()> {
        let mut state = self.record(format!("select_all:{}", element.id));
        let index = state.resolve(element)?;
        state.slots[index].select_pending = true;
        Ok(())
    }

    async fn type_char(&self, element: &ElementHandle, ch: char) -> PriceWatchResult<()> {
        let mut state = self.record(format!("type_char:{}", element.id));
        let index = state.resolve(element)?;
        let slot = &mut state.slots[index];
        if slot.node.behavior == ControlBehavior::ReadOnly {
            return Ok(());
        }
        if slot.select_pending {
            slot.raw_value.clear();
            slot.select_pending = false;
        }
        slot.raw_value.push(ch);
        slot.committed_value = slot.raw_value.clone();
        Ok(())
    }

    async fn activate(&self, element: &ElementHandle, options: ActivateOptions) -> PriceWatchResult<()> {
        let mut state = self
            .enter("activate", format!("activate:{}:force={}", element.id, options.force))
            .await;
        let index = state.resolve(element)?;
        let now = Instant::now();
        if !state.is_enabled(index, now) {
            return Ok(());
        }
        state.activations.entry(index).or_default().push(now);
        if state.slots[index].node.removed_on_activate {
            state.slots[index].removed = true;
        }
        Ok(())
    }

    async fn snapshot(&self) -> PriceWatchResult<DiagnosticArtifact> {
        let state = self.enter("snapshot", "snapshot".to_string()).await;
        if let Some(message) = state.snapshot_error.clone() {
            return Err(PriceWatchError::driver(message));
        }
        let now = Instant::now();
        let mut html = String::from("<html><body>");
        let mut index = 0;
        while index < state.slots.len() {
            if state.is_present(index, now) {
                state.render(index, now, &mut html);
            }
            index = state.slots[index].subtree_end;
        }
        html.push_str("</body></html>");

        let mut artifact = DiagnosticArtifact::new()
            .with_screenshot(PNG_SIGNATURE.to_vec())
            .with_dom(html);
        if let Some(url) = &state.current_url {
            artifact = artifact.with_url(url.clone());
        }
        Ok(artifact)
    }

    async fn dispose(&self) -> PriceWatchResult<()> {
        let mut state = self.enter("dispose", "dispose".to_string()).await;
        state.disposed = true;
        Ok(())
    }
}

// =============================================================================
// SESSION FACTORY
// =============================================================================

/// Hands out clones of one prepared [`MockDriver`]
#[derive(Debug)]
pub struct MockSessionFactory {
    driver: MockDriver,
    open_error: Option<String>,
    opened: AtomicU32,
}

impl MockSessionFactory {
    /// Factory serving the driver
    #[must_use]
    pub const fn new(driver: MockDriver) -> Self {
        Self {
            driver,
            open_error: None,
            opened: AtomicU32::new(0),
        }
    }

    /// Make every `open` fail
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            driver: MockDriver::new(MockDocument::new()),
            open_error: Some(message.into()),
            opened: AtomicU32::new(0),
        }
    }

    /// Shared handle to the served driver
    #[must_use]
    pub fn driver(&self) -> MockDriver {
        self.driver.clone()
    }

    /// Number of sessions opened
    #[must_use]
    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    type Driver = MockDriver;

    async fn open(&self) -> PriceWatchResult<MockDriver> {
        if let Some(message) = &self.open_error {
            return Err(PriceWatchError::driver(message.clone()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.driver.clone())
    }
}

// =============================================================================
// TESTS
// =============================================================================
