//! Result extraction: one snapshot of the rendered result items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::driver::{BrowsingDriver, ElementHandle};
use crate::locator::{ElementKind, ElementQuery};
use crate::result::PriceWatchResult;

/// Brand recorded when no brand attribute is found
pub const UNKNOWN_BRAND: &str = "Unknown";

/// Brand of the liveness row appended after a failed run
pub const HEARTBEAT_BRAND: &str = "System Check";

// =============================================================================
// RECORDS
// =============================================================================

/// One price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Provider name, never empty
    pub brand: String,
    /// Price as shown, `0` when unreadable
    pub price: f64,
    /// When the batch was taken
    pub captured_at: DateTime<Utc>,
}

impl ExtractedRecord {
    /// Create a record
    #[must_use]
    pub fn new(brand: impl Into<String>, price: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            brand: brand.into(),
            price,
            captured_at,
        }
    }

    /// Liveness row marking a failed run
    #[must_use]
    pub fn heartbeat(captured_at: DateTime<Utc>) -> Self {
        Self::new(HEARTBEAT_BRAND, 0.0, captured_at)
    }
}

/// All records read at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionBatch {
    captured_at: DateTime<Utc>,
    records: Vec<ExtractedRecord>,
}

impl ExtractionBatch {
    /// Empty batch stamped `captured_at`
    #[must_use]
    pub const fn new(captured_at: DateTime<Utc>) -> Self {
        Self {
            captured_at,
            records: Vec::new(),
        }
    }

    /// Add a record with the batch timestamp
    pub fn push(&mut self, brand: impl Into<String>, price: f64) {
        self.records
            .push(ExtractedRecord::new(brand, price, self.captured_at));
    }

    /// Batch timestamp
    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Records in page order
    #[must_use]
    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no items were found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records
    pub fn iter(&self) -> std::slice::Iter<'_, ExtractedRecord> {
        self.records.iter()
    }

    /// Take the records
    #[must_use]
    pub fn into_records(self) -> Vec<ExtractedRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a ExtractionBatch {
    type Item = &'a ExtractedRecord;
    type IntoIter = std::slice::Iter<'a, ExtractedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Keep ASCII digits and `.`, then read the leading `digits[.digits]`
/// number. Text with no leading number is `0`.
///
/// `"$1,234.56 /yr"` becomes `1234.56`; `"From $89.00."` becomes `89`.
#[must_use]
pub fn normalize_price(text: &str) -> f64 {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let whole = leading_digits(&cleaned);
    let end = match cleaned[whole..].strip_prefix('.') {
        Some(fraction) => whole + 1 + leading_digits(fraction),
        None => whole,
    };
    let number = cleaned[..end].trim_end_matches('.');
    if !number.bytes().any(|b| b.is_ascii_digit()) {
        return 0.0;
    }
    number
        .parse::<f64>()
        .ok()
        .filter(|price| price.is_finite())
        .unwrap_or(0.0)
}

fn leading_digits(s: &str) -> usize {
    s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len())
}

// =============================================================================
// EXTRACTOR
// =============================================================================

/// Where to find items, brands and prices on the result page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// One element per result item
    pub item: ElementQuery,
    /// Image inside an item carrying the brand
    pub brand_image: ElementQuery,
    /// Attributes read from the brand image, first non-blank wins
    pub brand_attributes: Vec<String>,
    /// Element inside an item carrying the price text
    pub price: ElementQuery,
    /// Keep only the first N items
    pub max_items: Option<usize>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            item: ElementQuery::new(ElementKind::Any)
                .attribute_contains("class", "plan-card")
                .attribute_contains("class", "result-item"),
            brand_image: ElementQuery::new(ElementKind::Image),
            brand_attributes: vec!["alt".to_string(), "aria-label".to_string(), "title".to_string()],
            price: ElementQuery::new(ElementKind::Any).attribute_contains("class", "price"),
            max_items: None,
        }
    }
}

/// Reads brand/price pairs from the rendered result items
#[derive(Debug, Clone, Default)]
pub struct ResultExtractor {
    config: ExtractorConfig,
}

impl ResultExtractor {
    /// Extractor with the given selectors
    #[must_use]
    pub const fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Selector configuration
    #[must_use]
    pub const fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Enumerate the items present now and read each one.
    ///
    /// Only the item enumeration can fail; a broken item falls back to
    /// the default brand and price.
    pub async fn extract<D: BrowsingDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> PriceWatchResult<ExtractionBatch> {
        let mut items = driver.query_all(&self.config.item).await?;
        let mut batch = ExtractionBatch::new(Utc::now());

        if let Some(max) = self.config.max_items {
            if items.len() > max {
                debug!(found = items.len(), max, "truncating result items");
                items.truncate(max);
            }
        }

        for item in &items {
            let brand = self.brand_of(driver, item).await;
            let price = self.price_of(driver, item).await;
            debug!(brand = %brand, price, "result item");
            batch.push(brand, price);
        }

        info!(records = batch.len(), "extraction complete");
        Ok(batch)
    }

    async fn brand_of<D: BrowsingDriver + ?Sized>(&self, driver: &D, item: &ElementHandle) -> String {
        let image = match driver.query_within(item, &self.config.brand_image).await {
            Ok(Some(image)) => image,
            Ok(None) => return UNKNOWN_BRAND.to_string(),
            Err(e) => {
                warn!(item = %item, error = %e, "brand image unreadable");
                return UNKNOWN_BRAND.to_string();
            }
        };

        for name in &self.config.brand_attributes {
            match driver.attribute(&image, name).await {
                Ok(Some(value)) if !value.trim().is_empty() => return value.trim().to_string(),
                Ok(_) => {}
                Err(e) => warn!(item = %item, attribute = %name, error = %e, "brand attribute unreadable"),
            }
        }
        UNKNOWN_BRAND.to_string()
    }

    async fn price_of<D: BrowsingDriver + ?Sized>(&self, driver: &D, item: &ElementHandle) -> f64 {
        let node = match driver.query_within(item, &self.config.price).await {
            Ok(Some(node)) => node,
            Ok(None) => return 0.0,
            Err(e) => {
                warn!(item = %item, error = %e, "price node unreadable");
                return 0.0;
            }
        };

        match driver.text_content(&node).await {
            Ok(text) => normalize_price(text.as_deref().unwrap_or_default()),
            Err(e) => {
                warn!(item = %item, error = %e, "price text unreadable");
                0.0
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
