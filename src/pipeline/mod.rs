//! Scan pipeline - collector, resolver, classifier and store wired together.
//!
//! Candidates come from an optional seed list plus the listing collector;
//! detail pages are resolved by a small bounded worker pool; results are
//! folded into the store. The store file is read once before the run and
//! written once after it; nothing here writes concurrently.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::collector::{CollectorConfig, ListingCollector};
use crate::fetch::PageClient;
use crate::model::CatalogItem;
use crate::rates::RateSource;
use crate::resolver::{DetailResolver, ResolverConfig};
use crate::store::PatchStore;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub collector: CollectorConfig,
    pub resolver: ResolverConfig,
    /// Bounded worker pool size for detail resolution.
    pub concurrency: usize,
    /// Walk the listing in addition to the seed list.
    pub use_listing: bool,
    /// Keep records that fail the performance-patch screen.
    pub keep_all: bool,
    /// Where diagnostic artifacts go on a suspiciously bad run.
    pub debug_dir: PathBuf,
    /// A listing yield below this triggers the diagnostic snapshot.
    pub low_yield_threshold: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            resolver: ResolverConfig::default(),
            concurrency: 4,
            use_listing: true,
            keep_all: false,
            debug_dir: PathBuf::from("debug"),
            low_yield_threshold: 3,
        }
    }
}

/// Counters for the end-of-run console summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanStats {
    pub scanned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub added: usize,
    pub updated: usize,
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    collector: ListingCollector,
    resolver: DetailResolver,
    config: ScanConfig,
}

impl Pipeline {
    pub fn new(
        client: Arc<dyn PageClient>,
        rates: Arc<dyn RateSource>,
        config: ScanConfig,
    ) -> Result<Self> {
        Ok(Self {
            collector: ListingCollector::new(client.clone(), config.collector.clone())?,
            resolver: DetailResolver::new(client, rates, config.resolver.clone())?,
            config,
        })
    }

    /// Run one scan over `seeds` (plus the listing when enabled), merging
    /// everything into `store`. Per-item failures never abort the run.
    pub async fn run(&self, store: &mut PatchStore, seeds: &[String]) -> Result<ScanStats> {
        let candidates = self.gather_candidates(seeds).await;
        tracing::info!("{} candidates to resolve", candidates.len());

        let today = Utc::now().date_naive();
        let resolved: Vec<_> = stream::iter(candidates.iter())
            .map(|item| self.resolver.resolve(item, today))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut stats = ScanStats::default();
        for result in resolved {
            stats.scanned += 1;

            if !result.fetched {
                stats.failed += 1;
                // Keep whatever was previously known-good; only brand-new
                // items get the partial record.
                if store.get(&result.entry.url).is_some() {
                    continue;
                }
            } else if !self.config.keep_all && !result.patch_like {
                stats.skipped += 1;
                continue;
            }

            let outcome = store.upsert(result.entry);
            if outcome.added {
                stats.added += 1;
            }
            if outcome.updated {
                stats.updated += 1;
            }
        }

        Ok(stats)
    }

    /// Seed URLs plus listing items, deduplicated by canonical URL.
    /// Seeds outside the product path are ignored with a note.
    async fn gather_candidates(&self, seeds: &[String]) -> Vec<CatalogItem> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<CatalogItem> = Vec::new();

        for raw in seeds {
            let Some(url) = crate::canon::normalize_url(raw) else {
                tracing::warn!("Ignoring unparseable seed URL: {}", raw);
                continue;
            };
            if !self.is_product_url(&url) {
                tracing::debug!("Ignoring non-product seed: {}", url);
                continue;
            }
            if seen.insert(url.clone()) {
                candidates.push(CatalogItem::from_url(url));
            }
        }

        if self.config.use_listing {
            let listing = self.collector.collect().await;

            if listing.items.len() < self.config.low_yield_threshold {
                self.write_snapshot(listing.first_page_html.as_deref());
            }

            for item in listing.items {
                if seen.insert(item.url.clone()) {
                    candidates.push(item);
                }
            }
        }

        candidates
    }

    fn is_product_url(&self, url: &str) -> bool {
        url::Url::parse(url)
            .map(|u| u.path().starts_with(&self.config.collector.product_prefix))
            .unwrap_or(false)
    }

    /// Near-total listing failure usually means the site changed under us;
    /// keep the rendered page around for manual inspection.
    fn write_snapshot(&self, html: Option<&str>) {
        let Some(html) = html else {
            tracing::warn!("Listing yielded almost nothing and no page was captured");
            return;
        };

        let path = self.config.debug_dir.join("listing-p0.html");
        let result = std::fs::create_dir_all(&self.config.debug_dir)
            .map_err(anyhow::Error::from)
            .and_then(|_| std::fs::write(&path, html).context("write snapshot"));

        match result {
            Ok(()) => tracing::warn!(
                "Listing yielded almost nothing; snapshot saved to {:?}",
                path
            ),
            Err(e) => tracing::warn!("Failed to save listing snapshot: {}", e),
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
    use tempfile::TempDir;

    enum Canned {
        Ok(String),
        NotFound(String),
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
                Some(Canned::NotFound(html)) => Ok(RenderedPage {
                    requested_url: url.to_string(),
                    final_url: url.to_string(),
                    status: 404,
                    html: html.clone(),
                }),
                Some(Canned::Timeout) | None => Err(FetchError::Timeout),
            }
        }
    }

    const FULL: &str = "https://www.nintendo.com/us/store/products/full-game/";
    const GONE: &str = "https://www.nintendo.com/us/store/products/gone-game/";
    const GONE_DE: &str = "https://www.nintendo.de/produkte/gone-game/";
    const SLOW: &str = "https://www.nintendo.com/us/store/products/slow-game/";

    fn full_page() -> String {
        r#"<html><head>
            <meta property="og:title" content="Full Game">
            <meta property="og:image" content="https://img.example/full.png">
            <script type="application/ld+json">
            {"offers":{"price":"59.99","priceCurrency":"USD"},"releaseDate":"2025-06-01"}
            </script>
        </head>
        <body><p>Nintendo Switch 2 Edition with improved frame rate.</p></body></html>"#
            .to_string()
    }

    fn gone_page() -> String {
        // Soft-404 that still exposes its DE alternate.
        format!(
            r#"<html><head>
                <link rel="alternate" hreflang="de-DE" href="{}">
            </head><body>Not found</body></html>"#,
            GONE_DE
        )
    }

    fn gone_de_page() -> String {
        r#"<html><head>
            <meta property="og:title" content="Gone Game">
        </head>
        <body><p>Performance update with faster loading on Switch 2.</p></body></html>"#
            .to_string()
    }

    fn pipeline(pages: HashMap<String, Canned>) -> Pipeline {
        let config = ScanConfig {
            use_listing: false,
            debug_dir: std::env::temp_dir().join("patchscout-test-debug"),
            ..Default::default()
        };
        Pipeline::new(
            Arc::new(CannedClient { pages }),
            Arc::new(FixedRates::new()),
            config,
        )
        .unwrap()
    }

    fn store_in(dir: &TempDir) -> PatchStore {
        PatchStore::load(&dir.path().join("patches.json")).unwrap()
    }

    #[tokio::test]
    async fn test_three_seed_scenario() {
        let mut pages = HashMap::new();
        pages.insert(FULL.to_string(), Canned::Ok(full_page()));
        pages.insert(GONE.to_string(), Canned::NotFound(gone_page()));
        pages.insert(GONE_DE.to_string(), Canned::Ok(gone_de_page()));
        pages.insert(SLOW.to_string(), Canned::Timeout);

        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let seeds = vec![FULL.to_string(), GONE.to_string(), SLOW.to_string()];

        let stats = pipeline(pages).run(&mut store, &seeds).await.unwrap();

        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.added, 3);
        assert_eq!(store.len(), 3);

        // Full metadata resolved normally.
        let full = store.get(FULL).unwrap();
        assert_eq!(full.title, "Full Game");
        assert_eq!(full.release_date, Some("2025-06-01".parse().unwrap()));
        assert_eq!(full.price.as_ref().unwrap().amount, 59.99);

        // 404 primary rescued through its live alternate-locale link.
        let gone = store.get(GONE).unwrap();
        assert_eq!(gone.title, "Gone Game");
        assert_eq!(gone.link, GONE_DE);
        assert_eq!(gone.regional_link.as_deref(), Some(GONE_DE));

        // Timed out entirely: slug title and hero image, nothing else.
        let slow = store.get(SLOW).unwrap();
        assert_eq!(slow.title, "slow game");
        assert_eq!(slow.image, None);
        assert_eq!(slow.release_date, None);
        assert!(slow.hero_fallback_image.contains("/s/slow-game/hero"));
    }

    #[tokio::test]
    async fn test_non_patch_pages_are_screened_out() {
        let mut pages = HashMap::new();
        pages.insert(
            FULL.to_string(),
            Canned::Ok(
                "<html><body><p>A calm puzzle collection.</p></body></html>".to_string(),
            ),
        );

        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let stats = pipeline(pages)
            .run(&mut store, &[FULL.to_string()])
            .await
            .unwrap();

        assert_eq!(stats.skipped, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_never_degrades_existing_entry() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        // First run: page resolves fully.
        let mut pages = HashMap::new();
        pages.insert(FULL.to_string(), Canned::Ok(full_page()));
        pipeline(pages)
            .run(&mut store, &[FULL.to_string()])
            .await
            .unwrap();
        let before = store.get(FULL).unwrap().clone();
        assert!(before.price.is_some());

        // Second run: everything times out. The entry must be untouched.
        let stats = pipeline(HashMap::new())
            .run(&mut store, &[FULL.to_string()])
            .await
            .unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(store.get(FULL).unwrap(), &before);
    }

    #[tokio::test]
    async fn test_non_product_seeds_are_ignored() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        let stats = pipeline(HashMap::new())
            .run(
                &mut store,
                &["https://news.example.com/some-article/".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(stats.scanned, 0);
        assert!(store.is_empty());
    }
}
