//! Link collector - paginates the storefront listing.
//!
//! Walks `?sort=df&p=0..N`, pulls product anchors out of the rendered page
//! and stops at the first page that contributes nothing previously unseen.
//! The listing has no cheap total-count signal, so "no new links" is the
//! intended end-of-results heuristic. A page-load failure is not retried;
//! the page counts as empty, which also ends pagination.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::canon;
use crate::fetch::PageClient;
use crate::model::CatalogItem;

// ============================================================================
// Configuration
// ============================================================================

/// Collector settings.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Listing base URL (pagination appends `?sort=df&p=N`).
    pub listing_url: String,
    /// Product detail pages live under this path prefix.
    pub product_prefix: String,
    /// Pagination cap.
    pub max_pages: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            listing_url: "https://www.nintendo.com/us/store/games/nintendo-switch-2-games/"
                .to_string(),
            product_prefix: "/us/store/products/".to_string(),
            max_pages: 20,
        }
    }
}

// ============================================================================
// Listing collector
// ============================================================================

/// Result of one collection run.
#[derive(Debug, Default)]
pub struct CollectedListing {
    pub items: Vec<CatalogItem>,
    /// HTML of the first listing page, kept for the low-yield diagnostic
    /// snapshot.
    pub first_page_html: Option<String>,
}

/// Paginates the listing and extracts unique candidate items.
pub struct ListingCollector {
    client: Arc<dyn PageClient>,
    config: CollectorConfig,
    price_re: Regex,
    release_re: Regex,
}

impl ListingCollector {
    pub fn new(client: Arc<dyn PageClient>, config: CollectorConfig) -> Result<Self> {
        Ok(Self {
            client,
            config,
            price_re: Regex::new(r"\$\s*\d{1,3}(?:,\d{3})*(?:\.\d{2})?")
                .context("Bad price pattern")?,
            release_re: Regex::new(
                r"(?i)\b(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)[a-z]*\s+\d{1,2},\s+\d{4}\b",
            )
            .context("Bad release date pattern")?,
        })
    }

    /// Collect unique candidate items across listing pages. Infallible at
    /// run level; page failures are logged and end the walk early.
    pub async fn collect(&self) -> CollectedListing {
        let mut seen: HashSet<String> = HashSet::new();
        let mut result = CollectedListing::default();

        for page_index in 0..self.config.max_pages {
            let page_url = format!("{}?sort=df&p={}", self.config.listing_url, page_index);

            let html = match self.client.fetch(&page_url).await {
                Ok(page) if !page.is_dead() => page.html,
                Ok(page) => {
                    tracing::warn!("Listing page {} dead (status {})", page_index, page.status);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Listing page {} failed: {}", page_index, e);
                    break;
                }
            };

            if page_index == 0 {
                result.first_page_html = Some(html.clone());
            }

            let mut fresh = 0usize;
            for item in self.extract_listing(&html) {
                if seen.insert(item.url.clone()) {
                    result.items.push(item);
                    fresh += 1;
                }
            }

            tracing::info!("Listing page {}: {} new items", page_index, fresh);
            if fresh == 0 {
                break;
            }
        }

        result
    }

    /// Pull candidate items out of one rendered listing page. Pure over the
    /// HTML; deduplicates within the page.
    pub fn extract_listing(&self, html: &str) -> Vec<CatalogItem> {
        let document = Html::parse_document(html);

        let anchor_sel =
            match Selector::parse(&format!(r#"a[href^="{}"]"#, self.config.product_prefix)) {
                Ok(sel) => sel,
                Err(_) => return Vec::new(),
            };
        let img_sel = match Selector::parse("img") {
            Ok(sel) => sel,
            Err(_) => return Vec::new(),
        };

        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for anchor in document.select(&anchor_sel) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(url) = canon::resolve_href(&self.config.listing_url, href) else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }

            let img = anchor.select(&img_sel).next();

            // Title candidates: accessible label, image alt, visible text.
            let title = non_empty(anchor.value().attr("aria-label"))
                .or_else(|| non_empty(img.and_then(|i| i.value().attr("alt"))))
                .or_else(|| {
                    let text = collapse_ws(&anchor.text().collect::<Vec<_>>().join(" "));
                    if text.is_empty() {
                        None
                    } else {
                        Some(text)
                    }
                });

            // Image candidate: primary source, then the lazy-load attribute.
            let image_hint = non_empty(img.and_then(|i| i.value().attr("src")))
                .or_else(|| non_empty(img.and_then(|i| i.value().attr("data-src"))));

            let (price_text, release_text) = self.card_hints(anchor);

            items.push(CatalogItem {
                url,
                title,
                image_hint,
                price_text,
                release_text,
            });
        }

        items
    }

    /// Climb from the anchor to the surrounding card and scan its text for
    /// a price and a release date. Best effort only; the detail resolver
    /// re-derives both from richer sources.
    fn card_hints(&self, anchor: ElementRef<'_>) -> (Option<String>, Option<String>) {
        let mut cursor = Some(anchor);

        for _ in 0..6 {
            let Some(element) = cursor else { break };
            let text = collapse_ws(&element.text().collect::<Vec<_>>().join(" "));

            let price = self.price_re.find(&text).map(|m| m.as_str().to_string());
            let release = self.release_re.find(&text).map(|m| m.as_str().to_string());
            if price.is_some() || release.is_some() {
                return (price, release);
            }

            cursor = element.parent().and_then(ElementRef::wrap);
        }

        (None, None)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(attr: Option<&str>) -> Option<String> {
    attr.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

// ============================================================================
// Tests
// ============================================================================
