//! Locator abstraction for element selection.
//!
//! Selectors are typed predicate objects rather than selector strings:
//! an [`ElementQuery`] names an element kind and a set of heuristic
//! attribute/text predicates, any one of which may match. The same query is
//! evaluated in memory (via [`DomNode`]) or compiled to a JavaScript filter
//! for a live page (via [`ElementQuery::to_js`]).
//!
//! # Design Philosophy
//!
//! - **Auto-Waiting**: [`Locator::resolve`] polls until the element exists,
//!   tolerating hydration delay and transient driver errors
//! - **First Match Wins**: candidates are tried in the order given
//! - **Case-Insensitive**: keywords match regardless of case

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::driver::{BrowsingDriver, ElementHandle};
use crate::result::{PriceWatchError, PriceWatchResult};
use crate::wait::{poll_until, Polled, WaitOptions, DEFAULT_POLL_INTERVAL_MS};

/// Default timeout for locating an element (15 seconds)
pub const DEFAULT_LOCATE_TIMEOUT_MS: u64 = 15_000;

const NON_TEXT_INPUT_TYPES: [&str; 7] = [
    "submit", "button", "hidden", "checkbox", "radio", "image", "reset",
];

// =============================================================================
// ELEMENT KIND
// =============================================================================

/// Element type filter applied before any predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Any element
    #[default]
    Any,
    /// Text-like form control (`input` or `textarea`)
    Input,
    /// Button-like control (`button`, submit inputs, `role=button`)
    Button,
    /// Image (`img`)
    Image,
    /// Anchor (`a`)
    Link,
}

impl ElementKind {
    /// CSS selector list covering this kind
    #[must_use]
    pub const fn css(&self) -> &'static str {
        match self {
            Self::Any => "*",
            Self::Input => {
                "input:not([type=submit]):not([type=button]):not([type=hidden]):not([type=checkbox]):not([type=radio]):not([type=image]):not([type=reset]), textarea"
            }
            Self::Button => "button, input[type=submit], input[type=button], [role=button]",
            Self::Image => "img",
            Self::Link => "a",
        }
    }

    /// Whether an element with this tag and attributes is of this kind
    #[must_use]
    pub fn admits<N: DomNode + ?Sized>(&self, node: &N) -> bool {
        let tag = node.tag_name().to_ascii_lowercase();
        let input_type = node
            .attribute("type")
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match self {
            Self::Any => true,
            Self::Input => {
                tag == "textarea"
                    || (tag == "input" && !NON_TEXT_INPUT_TYPES.contains(&input_type.as_str()))
            }
            Self::Button => {
                tag == "button"
                    || (tag == "input" && matches!(input_type.as_str(), "submit" | "button"))
                    || node
                        .attribute("role")
                        .is_some_and(|role| role.eq_ignore_ascii_case("button"))
            }
            Self::Image => tag == "img",
            Self::Link => tag == "a",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Any => "*",
            Self::Input => "input",
            Self::Button => "button",
            Self::Image => "img",
            Self::Link => "a",
        })
    }
}

// =============================================================================
// PREDICATES
// =============================================================================

/// How a keyword is compared against an attribute or text value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Case-insensitive substring
    #[default]
    Contains,
    /// Case-insensitive equality
    Equals,
}

impl MatchMode {
    /// Compare `value` against `keyword`
    #[must_use]
    pub fn test(&self, value: &str, keyword: &str) -> bool {
        let value = value.to_lowercase();
        let keyword = keyword.to_lowercase();
        match self {
            Self::Contains => value.contains(&keyword),
            Self::Equals => value == keyword,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Contains => "~",
            Self::Equals => "=",
        }
    }
}

/// One heuristic predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum Matcher {
    /// Attribute value compared against a keyword
    Attribute {
        /// Attribute name (e.g. `placeholder`)
        name: String,
        /// Keyword to look for
        keyword: String,
        /// Comparison mode
        #[serde(default)]
        mode: MatchMode,
    },
    /// Rendered text compared against a keyword
    Text {
        /// Keyword to look for
        keyword: String,
        /// Comparison mode
        #[serde(default)]
        mode: MatchMode,
    },
}

impl Matcher {
    /// Evaluate against an in-memory node
    #[must_use]
    pub fn matches<N: DomNode + ?Sized>(&self, node: &N) -> bool {
        match self {
            Self::Attribute {
                name,
                keyword,
                mode,
            } => node
                .attribute(name)
                .is_some_and(|value| mode.test(value, keyword)),
            Self::Text { keyword, mode } => mode.test(node.text().trim(), keyword),
        }
    }

    fn to_js(&self) -> String {
        let (subject, keyword, mode) = match self {
            Self::Attribute {
                name,
                keyword,
                mode,
            } => (
                format!("(el.getAttribute({}) || \"\")", js_string(name)),
                keyword,
                mode,
            ),
            Self::Text { keyword, mode } => (
                "(el.innerText || el.textContent || \"\").trim()".to_string(),
                keyword,
                mode,
            ),
        };
        let keyword = js_string(&keyword.to_lowercase());
        match mode {
            MatchMode::Contains => format!("{subject}.toLowerCase().includes({keyword})"),
            MatchMode::Equals => format!("{subject}.toLowerCase() === {keyword}"),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute {
                name,
                keyword,
                mode,
            } => write!(f, "{name}{}{keyword:?}", mode.symbol()),
            Self::Text { keyword, mode } => write!(f, "text{}{keyword:?}", mode.symbol()),
        }
    }
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Read access to an element, for evaluating queries without a browser
pub trait DomNode {
    /// Lowercase tag name
    fn tag_name(&self) -> &str;
    /// Attribute value, if present
    fn attribute(&self, name: &str) -> Option<&str>;
    /// Rendered text of the element and its descendants
    fn text(&self) -> String;
}

// =============================================================================
// ELEMENT QUERY
// =============================================================================

/// Typed element predicate: a kind filter plus any-of heuristics.
///
/// An empty `any_of` matches every element of the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ElementQuery {
    /// Element type filter
    #[serde(default)]
    pub kind: ElementKind,
    /// Predicates, any of which may match
    #[serde(default)]
    pub any_of: Vec<Matcher>,
}

impl ElementQuery {
    /// Query for any element of the given kind
    #[must_use]
    pub const fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            any_of: Vec::new(),
        }
    }

    /// Add an attribute-contains predicate
    #[must_use]
    pub fn attribute_contains(mut self, name: impl Into<String>, keyword: impl Into<String>) -> Self {
        self.any_of.push(Matcher::Attribute {
            name: name.into(),
            keyword: keyword.into(),
            mode: MatchMode::Contains,
        });
        self
    }

    /// Add an attribute-equals predicate
    #[must_use]
    pub fn attribute_equals(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.any_of.push(Matcher::Attribute {
            name: name.into(),
            keyword: value.into(),
            mode: MatchMode::Equals,
        });
        self
    }

    /// Add a text-contains predicate
    #[must_use]
    pub fn text_contains(mut self, keyword: impl Into<String>) -> Self {
        self.any_of.push(Matcher::Text {
            keyword: keyword.into(),
            mode: MatchMode::Contains,
        });
        self
    }

    /// Match `keyword` in any of the listed attributes
    #[must_use]
    pub fn keyword_in(kind: ElementKind, attributes: &[&str], keyword: &str) -> Self {
        attributes
            .iter()
            .fold(Self::new(kind), |query, attr| query.attribute_contains(*attr, keyword))
    }

    /// Evaluate against an in-memory node
    #[must_use]
    pub fn matches<N: DomNode + ?Sized>(&self, node: &N) -> bool {
        self.kind.admits(node)
            && (self.any_of.is_empty() || self.any_of.iter().any(|m| m.matches(node)))
    }

    /// CSS selector list for the kind filter
    #[must_use]
    pub const fn css(&self) -> &'static str {
        self.kind.css()
    }

    /// JavaScript arrow function `el => bool` for the predicates
    #[must_use]
    pub fn js_predicate(&self) -> String {
        if self.any_of.is_empty() {
            return "el => true".to_string();
        }
        let clauses = self
            .any_of
            .iter()
            .map(|m| format!("({})", m.to_js()))
            .collect::<Vec<_>>()
            .join(" || ");
        format!("el => {clauses}")
    }

    /// JavaScript expression evaluating to the matching elements under `root`
    #[must_use]
    pub fn to_js(&self, root: &str) -> String {
        format!(
            "Array.from({root}.querySelectorAll({})).filter({})",
            js_string(self.css()),
            self.js_predicate()
        )
    }
}

impl fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.any_of.is_empty() {
            let parts = self
                .any_of
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ");
            write!(f, "[{parts}]")?;
        }
        Ok(())
    }
}

// =============================================================================
// LOCATOR
// =============================================================================

/// A resolved element plus the query that found it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionTarget {
    /// Element handle
    pub element: ElementHandle,
    /// Human-readable query that matched
    pub descriptor: String,
}

impl fmt::Display for InteractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.element, self.descriptor)
    }
}

/// Polls for the first element matching one of several queries
#[derive(Debug, Clone)]
pub struct Locator {
    queries: Vec<ElementQuery>,
    options: WaitOptions,
}

impl Locator {
    /// Locator for a single query
    #[must_use]
    pub fn new(query: ElementQuery) -> Self {
        Self::any_of(vec![query])
    }

    /// Locator trying each query in order on every poll
    #[must_use]
    pub fn any_of(queries: Vec<ElementQuery>) -> Self {
        Self {
            queries,
            options: WaitOptions::new()
                .with_timeout(DEFAULT_LOCATE_TIMEOUT_MS)
                .with_poll_interval(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Replace wait options
    #[must_use]
    pub const fn with_options(mut self, options: WaitOptions) -> Self {
        self.options = options;
        self
    }

    /// Set a custom timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = timeout_ms;
        self
    }

    /// Candidate queries
    #[must_use]
    pub fn queries(&self) -> &[ElementQuery] {
        &self.queries
    }

    /// Wait options
    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// All candidate queries joined for messages
    #[must_use]
    pub fn descriptor(&self) -> String {
        self.queries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" or ")
    }

    /// One pass over the candidates without waiting.
    ///
    /// A hit on any candidate wins even if an earlier candidate errored; if
    /// nothing hit, the first error is returned.
    pub async fn find_now<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> PriceWatchResult<Option<InteractionTarget>> {
        let mut first_error = None;
        for query in &self.queries {
            match driver.query(query).await {
                Ok(Some(element)) => {
                    return Ok(Some(InteractionTarget {
                        element,
                        descriptor: query.to_string(),
                    }));
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(query = %query, error = %e, "query failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(None), Err)
    }

    /// Poll until a candidate matches or the timeout elapses
    pub async fn resolve<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> PriceWatchResult<InteractionTarget> {
        match poll_until(&self.options, move || self.find_now(driver)).await {
            Polled::Ready {
                value,
                elapsed,
                attempts,
            } => {
                info!(
                    target = %value,
                    elapsed_ms = elapsed.as_millis() as u64,
                    attempts,
                    "element located"
                );
                Ok(value)
            }
            Polled::TimedOut { last_error, .. } => Err(PriceWatchError::ElementNotFound {
                descriptor: self.descriptor(),
                timeout_ms: self.options.timeout_ms,
                last_error,
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
    use std::collections::BTreeMap;

    struct Node {
        tag: &'static str,
        attrs: BTreeMap<&'static str, &'static str>,
        text: &'static str,
    }

    impl Node {
        fn new(tag: &'static str, attrs: &[(&'static str, &'static str)]) -> Self {
            Self {
                tag,
                attrs: attrs.iter().copied().collect(),
                text: "",
            }
        }

        fn with_text(mut self, text: &'static str) -> Self {
            self.text = text;
            self
        }
    }

    impl DomNode for Node {
        fn tag_name(&self) -> &str {
            self.tag
        }

        fn attribute(&self, name: &str) -> Option<&str> {
            self.attrs.get(name).copied()
        }

        fn text(&self) -> String {
            self.text.to_string()
        }
    }

    mod kind_tests {
        use super::*;

        #[test]
        fn test_input_kind_admits_text_controls() {
            assert!(ElementKind::Input.admits(&Node::new("input", &[])));
            assert!(ElementKind::Input.admits(&Node::new("input", &[("type", "text")])));
            assert!(ElementKind::Input.admits(&Node::new("textarea", &[])));
            assert!(!ElementKind::Input.admits(&Node::new("input", &[("type", "submit")])));
            assert!(!ElementKind::Input.admits(&Node::new("input", &[("type", "HIDDEN")])));
            assert!(!ElementKind::Input.admits(&Node::new("div", &[])));
        }

        #[test]
        fn test_button_kind_admits_button_like_controls() {
            assert!(ElementKind::Button.admits(&Node::new("button", &[])));
            assert!(ElementKind::Button.admits(&Node::new("input", &[("type", "submit")])));
            assert!(ElementKind::Button.admits(&Node::new("div", &[("role", "Button")])));
            assert!(!ElementKind::Button.admits(&Node::new("input", &[("type", "text")])));
        }

        #[test]
        fn test_any_kind_admits_everything() {
            assert!(ElementKind::Any.admits(&Node::new("section", &[])));
        }

        #[test]
        fn test_kind_css() {
            assert_eq!(ElementKind::Image.css(), "img");
            assert!(ElementKind::Input.css().contains("textarea"));
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn test_placeholder_contains_post() {
            let query = ElementQuery::new(ElementKind::Input).attribute_contains("placeholder", "post");
            let node = Node::new("input", &[("placeholder", "Enter postcode")]);
            assert!(query.matches(&node));
        }

        #[test]
        fn test_contains_is_case_insensitive() {
            let query = ElementQuery::new(ElementKind::Input).attribute_contains("name", "POST");
            assert!(query.matches(&Node::new("input", &[("name", "userPostcode")])));
        }

        #[test]
        fn test_kind_filter_applies_before_predicates() {
            let query = ElementQuery::new(ElementKind::Input).attribute_contains("placeholder", "post");
            let div = Node::new("div", &[("placeholder", "postcode")]);
            assert!(!query.matches(&div));
        }

        #[test]
        fn test_any_of_semantics() {
            let query = ElementQuery::keyword_in(ElementKind::Input, &["placeholder", "name", "id"], "post");
            assert_eq!(query.any_of.len(), 3);
            assert!(query.matches(&Node::new("input", &[("id", "postcode-field")])));
            assert!(!query.matches(&Node::new("input", &[("id", "email")])));
        }

        #[test]
        fn test_equals_mode() {
            let query = ElementQuery::new(ElementKind::Any).attribute_equals("type", "submit");
            assert!(query.matches(&Node::new("button", &[("type", "SUBMIT")])));
            assert!(!query.matches(&Node::new("button", &[("type", "submit-later")])));
        }

        #[test]
        fn test_text_contains() {
            let query = ElementQuery::new(ElementKind::Button).text_contains("compare");
            assert!(query.matches(&Node::new("button", &[]).with_text("  Compare plans ")));
            assert!(!query.matches(&Node::new("button", &[]).with_text("Reset")));
        }

        #[test]
        fn test_empty_predicates_match_kind() {
            let query = ElementQuery::new(ElementKind::Image);
            assert!(query.matches(&Node::new("img", &[])));
            assert_eq!(query.js_predicate(), "el => true");
        }

        #[test]
        fn test_display_descriptor() {
            let query = ElementQuery::new(ElementKind::Input)
                .attribute_contains("placeholder", "post")
                .attribute_equals("type", "text");
            assert_eq!(query.to_string(), "input[placeholder~\"post\" | type=\"text\"]");
        }

        #[test]
        fn test_to_js_escapes_keywords() {
            let query = ElementQuery::new(ElementKind::Any).attribute_contains("aria-label", "it's \"quoted\"");
            let js = query.to_js("document");
            assert!(js.starts_with("Array.from(document.querySelectorAll(\"*\"))"));
            assert!(js.contains("el.getAttribute(\"aria-label\")"));
            assert!(js.contains("includes(\"it's \\\"quoted\\\"\")"));
        }

        #[test]
        fn test_to_js_lowercases_keywords() {
            let query = ElementQuery::new(ElementKind::Button).text_contains("Compare");
            assert!(query.js_predicate().contains("includes(\"compare\")"));
        }

        #[test]
        fn test_query_yaml_shape() {
            let yaml = r#"
kind: input
any_of:
  - match: attribute
    name: placeholder
    keyword: post
  - match: text
    keyword: postcode
    mode: equals
"#;
            let query: ElementQuery = serde_yaml_ng::from_str(yaml).unwrap();
            assert_eq!(query.kind, ElementKind::Input);
            assert_eq!(
                query.any_of[0],
                Matcher::Attribute {
                    name: "placeholder".to_string(),
                    keyword: "post".to_string(),
                    mode: MatchMode::Contains,
                }
            );
            assert_eq!(
                query.any_of[1],
                Matcher::Text {
                    keyword: "postcode".to_string(),
                    mode: MatchMode::Equals,
                }
            );
        }
    }

    mod locator_tests {
        use super::*;
        use crate::mock::{MockDocument, MockDriver, MockNode};
        use std::time::Duration;

        #[test]
        fn test_locator_descriptor_joins_candidates() {
            let locator = Locator::any_of(vec![
                ElementQuery::new(ElementKind::Button).text_contains("go"),
                ElementQuery::new(ElementKind::Any).attribute_equals("type", "submit"),
            ]);
            assert_eq!(locator.descriptor(), "button[text~\"go\"] or *[type=\"submit\"]");
        }

        #[tokio::test(start_paused = true)]
        async fn test_resolves_postcode_input() {
            let driver = MockDriver::new(
                MockDocument::new().with(MockNode::new("input").attr("placeholder", "Enter postcode")),
            );
            let locator = Locator::new(
                ElementQuery::new(ElementKind::Input).attribute_contains("placeholder", "post"),
            )
            .with_timeout(1_000);

            let target = locator.resolve(&driver).await.unwrap();
            assert_eq!(target.element.tag_name, "input");
            assert!(target.descriptor.contains("placeholder"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_waits_for_hydration() {
            let driver = MockDriver::new(MockDocument::new().with(
                MockNode::new("input")
                    .attr("name", "postcode")
                    .appears_after(Duration::from_millis(1_500)),
            ));
            let locator =
                Locator::new(ElementQuery::new(ElementKind::Input).attribute_contains("name", "post"))
                    .with_timeout(5_000);

            let start = tokio::time::Instant::now();
            locator.resolve(&driver).await.unwrap();
            assert!(start.elapsed() >= Duration::from_millis(1_500));
        }

        #[tokio::test(start_paused = true)]
        async fn test_times_out_with_element_not_found() {
            let driver = MockDriver::new(MockDocument::new().with(MockNode::new("div")));
            let locator = Locator::new(ElementQuery::new(ElementKind::Input)).with_timeout(300);

            let err = locator.resolve(&driver).await.unwrap_err();
            match err {
                PriceWatchError::ElementNotFound {
                    descriptor,
                    timeout_ms,
                    ..
                } => {
                    assert_eq!(descriptor, "input");
                    assert_eq!(timeout_ms, 300);
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_first_candidate_in_order_wins() {
            let driver = MockDriver::new(
                MockDocument::new()
                    .with(MockNode::new("button").attr("type", "submit").text("Go"))
                    .with(MockNode::new("button").key("compare").text("Compare")),
            );
            let locator = Locator::any_of(vec![
                ElementQuery::new(ElementKind::Button).text_contains("compare"),
                ElementQuery::new(ElementKind::Any).attribute_equals("type", "submit"),
            ]);

            let target = locator.resolve(&driver).await.unwrap();
            assert_eq!(Some(target.element), driver.handle_for("compare"));
        }
    }
}
