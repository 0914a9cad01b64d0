//! Data model for the patch list.
//!
//! Earlier script generations disagreed on field names (`name`/`us`/`link`,
//! `img`/`img2`, `price_usd`/`price_eur`, `core_patch`). This module fixes
//! one canonical schema and migrates the legacy variants on read; output is
//! always written in the canonical shape.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::canon;

// ============================================================================
// Types
// ============================================================================

/// A price in a single display currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

/// Candidate item collected from a listing page. Collector-run scoped;
/// the resolver folds it into a [`StoredEntry`] immediately.
#[derive(Debug, Clone, Default)]
pub struct CatalogItem {
    /// Canonical product URL (normalized, unique key).
    pub url: String,
    /// Best-effort title from the listing card.
    pub title: Option<String>,
    /// Image source seen near the anchor, if any.
    pub image_hint: Option<String>,
    /// Raw price text from the listing card (`$59.99`-style).
    pub price_text: Option<String>,
    /// Raw release date text from the listing card (`Mar 14, 2025`-style).
    pub release_text: Option<String>,
}

impl CatalogItem {
    /// Seed-only candidate: just a canonical URL, no listing hints.
    pub fn from_url(url: String) -> Self {
        Self {
            url,
            ..Default::default()
        }
    }
}

/// One persisted patch-list entry (canonical schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EntryOnDisk")]
pub struct StoredEntry {
    /// Canonical product URL; the unique identity key.
    pub url: String,
    pub title: String,
    /// Preferred outgoing link: the regional alternate when reachable,
    /// otherwise the canonical URL.
    pub link: String,
    pub regional_link: Option<String>,
    pub image: Option<String>,
    /// Slug-derived CDN image, used when no explicit image is discoverable.
    pub hero_fallback_image: String,
    pub release_date: Option<NaiveDate>,
    pub price: Option<Price>,
    pub is_paid_upgrade: bool,
    /// Comma-joined capability tags, max 5.
    pub capability_hints: Option<String>,
    /// Storefront catalog identifier (14-digit token), when discoverable.
    pub product_code: Option<String>,
    pub source: String,
    pub last_checked: NaiveDate,
}

// ============================================================================
// Legacy migration
// ============================================================================

/// On-disk union of the canonical schema and all legacy script variants.
/// Only used as a serde intermediate; [`StoredEntry`] is built from it.
#[derive(Debug, Deserialize)]
struct EntryOnDisk {
    url: Option<String>,
    us: Option<String>,
    title: Option<String>,
    name: Option<String>,
    link: Option<String>,
    regional_link: Option<String>,
    de: Option<String>,
    image: Option<String>,
    img: Option<String>,
    hero_fallback_image: Option<String>,
    img2: Option<String>,
    release_date: Option<NaiveDate>,
    price: Option<Price>,
    price_usd: Option<f64>,
    price_eur: Option<f64>,
    is_paid_upgrade: Option<bool>,
    paid: Option<bool>,
    capability_hints: Option<String>,
    core_patch: Option<String>,
    product_code: Option<String>,
    source: Option<String>,
    last_checked: Option<NaiveDate>,
}

impl From<EntryOnDisk> for StoredEntry {
    fn from(raw: EntryOnDisk) -> Self {
        let url = raw
            .url
            .or(raw.us)
            .or_else(|| raw.link.clone())
            .unwrap_or_default();

        let title = raw
            .title
            .or(raw.name)
            .or_else(|| canon::slug(&url).map(|s| canon::title_from_slug(&s)))
            .unwrap_or_default();

        let regional_link = raw.regional_link.or(raw.de);
        let link = raw
            .link
            .or_else(|| regional_link.clone())
            .unwrap_or_else(|| url.clone());

        let hero_fallback_image = raw
            .hero_fallback_image
            .or(raw.img2)
            .or_else(|| canon::hero_for_url(&url))
            .unwrap_or_default();

        let price = raw
            .price
            .or_else(|| {
                raw.price_usd.map(|amount| Price {
                    amount,
                    currency: "USD".to_string(),
                })
            })
            .or_else(|| {
                raw.price_eur.map(|amount| Price {
                    amount,
                    currency: "EUR".to_string(),
                })
            });

        Self {
            source: raw.source.unwrap_or_else(|| url.clone()),
            url,
            title,
            link,
            regional_link,
            image: raw.image.or(raw.img),
            hero_fallback_image,
            release_date: raw.release_date,
            price,
            is_paid_upgrade: raw.is_paid_upgrade.or(raw.paid).unwrap_or(false),
            capability_hints: raw.capability_hints.or(raw.core_patch),
            product_code: raw.product_code,
            last_checked: raw.last_checked.unwrap_or_default(),
        }
    }
}

// ============================================================================
// Output ordering
// ============================================================================

/// Deterministic output order: release date descending, undated entries
/// last, ties broken by case-insensitive title.
pub fn output_order(a: &StoredEntry, b: &StoredEntry) -> Ordering {
    match (a.release_date, b.release_date) {
        (Some(da), Some(db)) => db.cmp(&da),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
}

/// Sort entries into the deterministic output order.
pub fn sort_entries(entries: &mut [StoredEntry]) {
    entries.sort_by(output_order);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn entry(title: &str, release: Option<&str>) -> StoredEntry {
        StoredEntry {
            url: format!("https://example.com/products/{}/", title),
            title: title.to_string(),
            link: format!("https://example.com/products/{}/", title),
            regional_link: None,
            image: None,
            hero_fallback_image: canon::hero_from_slug(title),
            release_date: release.map(date),
            price: None,
            is_paid_upgrade: false,
            capability_hints: None,
            product_code: None,
            source: String::new(),
            last_checked: date("2025-08-01"),
        }
    }

    #[test]
    fn test_sort_release_desc_nulls_last() {
        let mut entries = vec![
            entry("mid", Some("2025-01-01")),
            entry("undated", None),
            entry("new", Some("2025-06-01")),
        ];
        sort_entries(&mut entries);

        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid", "undated"]);
    }

    #[test]
    fn test_sort_tie_broken_case_insensitive() {
        let mut entries = vec![
            entry("zelda", Some("2025-06-01")),
            entry("Mario", Some("2025-06-01")),
        ];
        sort_entries(&mut entries);
        assert_eq!(entries[0].title, "Mario");
    }

    #[test]
    fn test_canonical_roundtrip() {
        let original = entry("kirby", Some("2025-03-14"));
        let json = serde_json::to_string(&original).unwrap();
        let back: StoredEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_legacy_variant_migrates() {
        let json = r#"{
            "name": "Kirby and the Forgotten Land",
            "link": "https://www.nintendo.de/products/kirby/",
            "de": "https://www.nintendo.de/products/kirby/",
            "us": "https://www.nintendo.com/us/store/products/kirby-forgotten-land/",
            "img": "https://img.example/kirby.png",
            "img2": null,
            "core_patch": "bis zu 60 FPS, kürzere Ladezeiten",
            "paid": true,
            "price_usd": 19.99,
            "source": "https://www.nintendo.com/us/store/products/kirby-forgotten-land/",
            "last_checked": "2025-07-01"
        }"#;

        let e: StoredEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e.title, "Kirby and the Forgotten Land");
        assert_eq!(e.url, "https://www.nintendo.com/us/store/products/kirby-forgotten-land/");
        assert_eq!(e.regional_link.as_deref(), Some("https://www.nintendo.de/products/kirby/"));
        assert_eq!(e.image.as_deref(), Some("https://img.example/kirby.png"));
        assert!(e.hero_fallback_image.contains("/k/kirby-forgotten-land/hero"));
        assert!(e.is_paid_upgrade);
        assert_eq!(
            e.capability_hints.as_deref(),
            Some("bis zu 60 FPS, kürzere Ladezeiten")
        );
        assert_eq!(
            e.price,
            Some(Price {
                amount: 19.99,
                currency: "USD".to_string()
            })
        );
    }

    #[test]
    fn test_minimal_legacy_entry_gets_derived_fields() {
        let json = r#"{"us": "https://www.nintendo.com/us/store/products/metroid-prime-4/"}"#;
        let e: StoredEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e.title, "metroid prime 4");
        assert_eq!(e.link, e.url);
        assert!(e.hero_fallback_image.contains("/m/metroid-prime-4/hero"));
        assert!(!e.is_paid_upgrade);
    }
}
