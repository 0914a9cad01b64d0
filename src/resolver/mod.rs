//! Detail resolver - turns a candidate URL into a full record.
//!
//! Must not fail for reachable-but-malformed pages: every field is tried
//! through an ordered chain of extractors and degrades independently. On a
//! total fetch failure the resolver still emits a partial record built from
//! what is computable without the network (slug title, hero fallback image).

pub mod extract;
pub mod normalize;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;

use crate::canon;
use crate::fetch::PageClient;
use crate::hints::HintClassifier;
use crate::model::{CatalogItem, Price, StoredEntry};
use crate::rates::{self, RateSource};

use extract::PageFacts;
use normalize::{parse_amount, parse_release_date};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Display currency for stored prices.
    pub target_currency: String,
    /// `hreflang` pattern for the preferred regional alternate.
    pub locale_pattern: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            target_currency: "USD".to_string(),
            locale_pattern: r"(?i)^de(-?de)?$".to_string(),
        }
    }
}

/// Resolution outcome: the record plus what the pipeline needs to decide
/// whether to screen it.
#[derive(Debug)]
pub struct Resolved {
    pub entry: StoredEntry,
    /// False when no page content could be fetched at all.
    pub fetched: bool,
    /// Whether the page text passed the performance-patch screen.
    pub patch_like: bool,
}

// ============================================================================
// Detail resolver
// ============================================================================

pub struct DetailResolver {
    client: Arc<dyn PageClient>,
    rates: Arc<dyn RateSource>,
    classifier: HintClassifier,
    locale_re: Regex,
    price_re: Regex,
    release_re: Regex,
    code_re: Regex,
    target_currency: String,
}

impl DetailResolver {
    pub fn new(
        client: Arc<dyn PageClient>,
        rates: Arc<dyn RateSource>,
        config: ResolverConfig,
    ) -> Result<Self> {
        Ok(Self {
            client,
            rates,
            classifier: HintClassifier::new()?,
            locale_re: Regex::new(&config.locale_pattern).context("Bad locale pattern")?,
            price_re: Regex::new(r"\$\s*\d{1,3}(?:,\d{3})*(?:\.\d{2})?")
                .context("Bad price pattern")?,
            release_re: Regex::new(
                r"(?i)\b(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)[a-z]*\s+\d{1,2},\s+\d{4}\b",
            )
            .context("Bad release date pattern")?,
            // Storefront catalog key: 14 digits, always leading 7.
            code_re: Regex::new(r"\b7\d{13}\b").context("Bad product code pattern")?,
            target_currency: config.target_currency,
        })
    }

    /// Resolve one candidate. Infallible: every failure path yields a
    /// best-effort record.
    pub async fn resolve(&self, item: &CatalogItem, today: NaiveDate) -> Resolved {
        let url = item.url.clone();

        let page = match self.client.fetch(&url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Fetch failed for {}: {}", url, e);
                return self.partial(item, today);
            }
        };

        let primary_dead = page.is_dead();
        let primary_facts = extract::page_facts(&page.html);

        // Regional alternate: accepted only when it is itself reachable.
        // A soft-404 primary can still expose its alternates, which is the
        // remaining way to rescue a dead canonical link.
        let alternate_url = self.pick_alternate(&primary_facts, &page.final_url);
        let mut regional_link = None;
        let mut alternate_html = None;

        if let Some(alt_url) = alternate_url {
            match self.client.fetch(&alt_url).await {
                Ok(alt) if !alt.is_dead() => {
                    alternate_html = Some(alt.html);
                    regional_link = Some(alt_url);
                }
                Ok(alt) => {
                    tracing::debug!("Alternate {} dead (status {})", alt_url, alt.status);
                }
                Err(e) => {
                    tracing::debug!("Alternate {} failed: {}", alt_url, e);
                }
            }
        }

        let facts = if primary_dead {
            match alternate_html.as_deref() {
                Some(html) => extract::page_facts(html),
                None => {
                    tracing::warn!("Dead link with no live alternate: {}", url);
                    return self.partial(item, today);
                }
            }
        } else {
            primary_facts
        };

        self.assemble(item, facts, regional_link, today).await
    }

    /// Build the record from extracted facts. Each field is an ordered
    /// first-non-null chain of pure extractors.
    async fn assemble(
        &self,
        item: &CatalogItem,
        facts: PageFacts,
        regional_link: Option<String>,
        today: NaiveDate,
    ) -> Resolved {
        let url = item.url.clone();
        let slug = canon::slug(&url).unwrap_or_default();

        let title = facts
            .og_title
            .clone()
            .or_else(|| facts.heading.clone())
            .or_else(|| item.title.clone())
            .unwrap_or_else(|| canon::title_from_slug(&slug));

        let image = facts.og_image.clone().or_else(|| item.image_hint.clone());

        let release_date = extract::structured_release_date(&facts.structured)
            .or_else(|| {
                self.release_re
                    .find(&facts.body_text)
                    .and_then(|m| parse_release_date(m.as_str()))
            })
            .or_else(|| item.release_text.as_deref().and_then(parse_release_date));

        let price = self.resolve_price(item, &facts).await;

        let product_code =
            extract::product_code(&facts.structured, &facts.body_text, &self.code_re);
        if let Some(ref code) = product_code {
            tracing::debug!("Catalog key for {}: {}", url, code);
        }

        let capability_hints = self.classifier.classify(&facts.body_text);
        let is_paid_upgrade = self.classifier.is_paid_upgrade(&facts.body_text);
        let patch_like = self.classifier.looks_like_patch(&facts.body_text);

        let entry = StoredEntry {
            link: regional_link.clone().unwrap_or_else(|| url.clone()),
            regional_link,
            hero_fallback_image: canon::hero_from_slug(&slug),
            source: url.clone(),
            url,
            title,
            image,
            release_date,
            price,
            is_paid_upgrade,
            capability_hints,
            product_code,
            last_checked: today,
        };

        Resolved {
            entry,
            fetched: true,
            patch_like,
        }
    }

    /// Price chain: structured data, page text, listing-card hint; the
    /// winner is converted into the display currency. Conversion failure
    /// leaves the price null rather than storing a guessed value.
    async fn resolve_price(&self, item: &CatalogItem, facts: &PageFacts) -> Option<Price> {
        let candidate = extract::structured_price(&facts.structured)
            .or_else(|| {
                self.price_re
                    .find(&facts.body_text)
                    .and_then(|m| parse_amount(m.as_str()))
                    .map(|amount| (amount, "USD".to_string()))
            })
            .or_else(|| {
                item.price_text
                    .as_deref()
                    .and_then(parse_amount)
                    .map(|amount| (amount, "USD".to_string()))
            })?;

        let (amount, currency) = candidate;
        let converted =
            rates::convert(self.rates.as_ref(), amount, &currency, &self.target_currency).await?;

        Some(Price {
            amount: converted,
            currency: self.target_currency.clone(),
        })
    }

    /// First alternate whose `hreflang` matches the configured locale,
    /// resolved against the page's settled URL.
    fn pick_alternate(&self, facts: &PageFacts, base: &str) -> Option<String> {
        facts
            .alternates
            .iter()
            .find(|alt| self.locale_re.is_match(&alt.lang))
            .and_then(|alt| canon::resolve_href(base, &alt.href))
    }

    /// Record built without any page content: slug title, hero image,
    /// everything optional null.
    fn partial(&self, item: &CatalogItem, today: NaiveDate) -> Resolved {
        let url = item.url.clone();
        let slug = canon::slug(&url).unwrap_or_default();

        let entry = StoredEntry {
            title: item
                .title
                .clone()
                .unwrap_or_else(|| canon::title_from_slug(&slug)),
            link: url.clone(),
            regional_link: None,
            image: None,
            hero_fallback_image: canon::hero_from_slug(&slug),
            release_date: None,
            price: None,
            is_paid_upgrade: false,
            capability_hints: None,
            product_code: None,
            source: url.clone(),
            url,
            last_checked: today,
        };

        Resolved {
            entry,
            fetched: false,
            patch_like: false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, RenderedPage};
    use crate::rates::FixedRates;
    use async_trait::async_trait;
    use std::collections::HashMap;

    enum Canned {
        Ok(String),
        Dead,
        Timeout,
    }

    struct CannedClient {
        pages: HashMap<String, Canned>,
    }

    #[async_trait]
    impl PageClient for CannedClient {
        async fn fetch(&self, url: &str) -> Result<RenderedPage, FetchError> {
            match self.pages.get(url) {
                Some(Canned::Ok(html)) => Ok(RenderedPage {
                    requested_url: url.to_string(),
                    final_url: url.to_string(),
                    status: 200,
                    html: html.clone(),
                }),
                Some(Canned::Dead) => Ok(RenderedPage {
                    requested_url: url.to_string(),
                    final_url: url.to_string(),
                    status: 404,
                    html: String::new(),
                }),
                Some(Canned::Timeout) | None => Err(FetchError::Timeout),
            }
        }
    }

    const PRODUCT_URL: &str = "https://www.nintendo.com/us/store/products/metroid-prime-4/";
    const DE_URL: &str = "https://www.nintendo.de/produkte/metroid-prime-4/";

    fn product_html(de_href: &str) -> String {
        format!(
            r#"<html><head>
                <meta property="og:title" content="Metroid Prime 4: Beyond">
                <meta property="og:image" content="https://img.example/mp4.png">
                <link rel="alternate" hreflang="de-DE" href="{}">
                <script type="application/ld+json">
                {{"@type":"Product","sku":"70010000012345",
                  "offers":{{"price":"59.99","priceCurrency":"USD"}},
                  "releaseDate":"2025-12-04"}}
                </script>
            </head>
            <body><h1>Metroid Prime 4</h1>
            <p>Nintendo Switch 2 Edition with improved frame rate and 4K visuals.
               Requires the paid upgrade pack.</p></body></html>"#,
            de_href
        )
    }

    fn resolver(pages: HashMap<String, Canned>, target: &str) -> DetailResolver {
        DetailResolver::new(
            Arc::new(CannedClient { pages }),
            Arc::new(FixedRates::new().with_rate("USD", "EUR", 0.9)),
            ResolverConfig {
                target_currency: target.to_string(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn today() -> NaiveDate {
        "2025-08-30".parse().unwrap()
    }

    #[tokio::test]
    async fn test_full_resolution() {
        let mut pages = HashMap::new();
        pages.insert(PRODUCT_URL.to_string(), Canned::Ok(product_html(DE_URL)));
        pages.insert(DE_URL.to_string(), Canned::Ok("<html><body>ok</body></html>".into()));

        let r = resolver(pages, "USD");
        let resolved = r
            .resolve(&CatalogItem::from_url(PRODUCT_URL.to_string()), today())
            .await;

        assert!(resolved.fetched);
        assert!(resolved.patch_like);

        let e = &resolved.entry;
        assert_eq!(e.title, "Metroid Prime 4: Beyond");
        assert_eq!(e.image.as_deref(), Some("https://img.example/mp4.png"));
        assert_eq!(e.regional_link.as_deref(), Some(DE_URL));
        assert_eq!(e.link, DE_URL);
        assert_eq!(e.release_date, Some("2025-12-04".parse().unwrap()));
        assert_eq!(
            e.price,
            Some(Price {
                amount: 59.99,
                currency: "USD".to_string()
            })
        );
        assert!(e.is_paid_upgrade);
        assert_eq!(e.product_code.as_deref(), Some("70010000012345"));
        let hints = e.capability_hints.as_deref().unwrap();
        assert!(hints.contains("60 FPS"));
        assert!(hints.contains("Auflösung"));
    }

    #[tokio::test]
    async fn test_dead_alternate_falls_back_to_primary_link() {
        let mut pages = HashMap::new();
        pages.insert(PRODUCT_URL.to_string(), Canned::Ok(product_html(DE_URL)));
        pages.insert(DE_URL.to_string(), Canned::Dead);

        let r = resolver(pages, "USD");
        let resolved = r
            .resolve(&CatalogItem::from_url(PRODUCT_URL.to_string()), today())
            .await;

        assert_eq!(resolved.entry.regional_link, None);
        assert_eq!(resolved.entry.link, PRODUCT_URL);
    }

    #[tokio::test]
    async fn test_price_converted_to_target_currency() {
        let mut pages = HashMap::new();
        pages.insert(PRODUCT_URL.to_string(), Canned::Ok(product_html(DE_URL)));
        pages.insert(DE_URL.to_string(), Canned::Ok("<html></html>".into()));

        let r = resolver(pages, "EUR");
        let resolved = r
            .resolve(&CatalogItem::from_url(PRODUCT_URL.to_string()), today())
            .await;

        assert_eq!(
            resolved.entry.price,
            Some(Price {
                amount: 53.99,
                currency: "EUR".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_conversion_failure_leaves_price_null() {
        let mut pages = HashMap::new();
        pages.insert(PRODUCT_URL.to_string(), Canned::Ok(product_html(DE_URL)));
        pages.insert(DE_URL.to_string(), Canned::Ok("<html></html>".into()));

        // No USD->GBP rate in the fixed table.
        let r = resolver(pages, "GBP");
        let resolved = r
            .resolve(&CatalogItem::from_url(PRODUCT_URL.to_string()), today())
            .await;

        assert_eq!(resolved.entry.price, None);
    }

    #[tokio::test]
    async fn test_timeout_yields_partial_record() {
        let r = resolver(HashMap::new(), "USD");
        let resolved = r
            .resolve(&CatalogItem::from_url(PRODUCT_URL.to_string()), today())
            .await;

        assert!(!resolved.fetched);
        let e = &resolved.entry;
        assert_eq!(e.title, "metroid prime 4");
        assert_eq!(e.image, None);
        assert_eq!(e.release_date, None);
        assert!(e.hero_fallback_image.contains("/m/metroid-prime-4/hero"));
    }
}
