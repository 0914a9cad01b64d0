//! Pure field extractors over a rendered detail page.
//!
//! One parse pass turns the HTML into [`PageFacts`]; each field the resolver
//! needs is then an independent, missing-tolerant lookup over those facts.
//! Structured-data blocks are author-controlled and arbitrarily nested, so
//! they are flattened with a recursive, depth-guarded traversal.

use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};

use super::normalize::{collapse_ws, parse_amount, parse_release_date};

/// Recursion guard for the structured-data traversal.
const MAX_FLATTEN_DEPTH: usize = 32;

/// An `hreflang` alternate exposed by the page.
#[derive(Debug, Clone)]
pub struct Alternate {
    pub lang: String,
    pub href: String,
}

/// Everything a single parse pass can tell us about a detail page.
#[derive(Debug, Default)]
pub struct PageFacts {
    pub og_title: Option<String>,
    pub heading: Option<String>,
    pub og_image: Option<String>,
    pub alternates: Vec<Alternate>,
    /// Parsed `application/ld+json` blocks, in document order.
    pub structured: Vec<Value>,
    pub body_text: String,
}

/// Parse a detail page into facts. Never fails; missing pieces stay empty.
pub fn page_facts(html: &str) -> PageFacts {
    let document = Html::parse_document(html);

    PageFacts {
        og_title: meta_content(&document, "og:title"),
        heading: first_heading(&document),
        og_image: meta_content(&document, "og:image"),
        alternates: alternates(&document),
        structured: structured_blocks(&document),
        body_text: body_text(&document),
    }
}

fn meta_content(document: &Html, property: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[property="{}"]"#, property)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(collapse_ws)
        .filter(|s| !s.is_empty())
}

fn first_heading(document: &Html) -> Option<String> {
    let selector = Selector::parse("h1, h2, h3").ok()?;
    document
        .select(&selector)
        .map(|el| collapse_ws(&el.text().collect::<Vec<_>>().join(" ")))
        .find(|text| !text.is_empty())
}

fn alternates(document: &Html) -> Vec<Alternate> {
    let Ok(selector) = Selector::parse(r#"link[rel="alternate"][hreflang]"#) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let lang = el.value().attr("hreflang")?.to_string();
            let href = el.value().attr("href")?.to_string();
            if href.is_empty() {
                None
            } else {
                Some(Alternate { lang, href })
            }
        })
        .collect()
}

fn structured_blocks(document: &Html) -> Vec<Value> {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let text: String = el.text().collect();
            match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!("Unparseable structured-data block: {}", e);
                    None
                }
            }
        })
        .collect()
}

fn body_text(document: &Html) -> String {
    if let Ok(selector) = Selector::parse("body") {
        if let Some(body) = document.select(&selector).next() {
            return collapse_ws(&body.text().collect::<Vec<_>>().join(" "));
        }
    }
    collapse_ws(&document.root_element().text().collect::<Vec<_>>().join(" "))
}

// ============================================================================
// Structured-data scanning
// ============================================================================

/// Collect every JSON object reachable from `root`, depth-first, with a
/// depth guard against degenerate nesting.
pub fn flatten_objects<'a>(root: &'a Value, depth: usize, out: &mut Vec<&'a Map<String, Value>>) {
    if depth > MAX_FLATTEN_DEPTH {
        return;
    }

    match root {
        Value::Object(map) => {
            out.push(map);
            for value in map.values() {
                flatten_objects(value, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for value in items {
                flatten_objects(value, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn all_objects(blocks: &[Value]) -> Vec<&Map<String, Value>> {
    let mut out = Vec::new();
    for block in blocks {
        flatten_objects(block, 0, &mut out);
    }
    out
}

/// Lowercased key with separators stripped, for tolerant matching.
fn normalized_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase()
}

fn is_release_date_key(key: &str) -> bool {
    let key = normalized_key(key);
    key.contains("releasedate") || key == "datepublished"
}

fn is_price_key(key: &str) -> bool {
    matches!(normalized_key(key).as_str(), "price" | "lowprice")
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scan flattened structured data for a release-date-like field.
/// Last parseable candidate wins when several exist.
pub fn structured_release_date(blocks: &[Value]) -> Option<NaiveDate> {
    let mut found = None;
    for object in all_objects(blocks) {
        for (key, value) in object {
            if is_release_date_key(key) {
                if let Some(date) = scalar_string(value).as_deref().and_then(parse_release_date) {
                    found = Some(date);
                }
            }
        }
    }
    found
}

/// Scan flattened structured data for a price and its currency. The
/// currency is read from the same object when present, defaulting to USD.
/// Last candidate wins.
pub fn structured_price(blocks: &[Value]) -> Option<(f64, String)> {
    let mut found = None;
    for object in all_objects(blocks) {
        for (key, value) in object {
            if !is_price_key(key) {
                continue;
            }
            let Some(amount) = scalar_string(value).as_deref().and_then(parse_amount) else {
                continue;
            };
            let currency = object
                .iter()
                .find(|(k, _)| normalized_key(k) == "pricecurrency")
                .and_then(|(_, v)| v.as_str())
                .unwrap_or("USD")
                .to_uppercase();
            found = Some((amount, currency));
        }
    }
    found
}

/// Find the storefront catalog identifier in structured data or raw markup.
pub fn product_code(blocks: &[Value], html: &str, code_re: &Regex) -> Option<String> {
    for object in all_objects(blocks) {
        for value in object.values() {
            if let Some(text) = scalar_string(value) {
                if let Some(m) = code_re.find(&text) {
                    return Some(m.as_str().to_string());
                }
            }
        }
    }
    code_re.find(html).map(|m| m.as_str().to_string())
}

// ============================================================================
// Tests
// ============================================================================
