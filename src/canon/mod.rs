//! Canonical URL handling.
//!
//! Every set/map lookup and equality test on a product URL goes through
//! [`normalize_url`] first, so two differently-formatted URLs for the same
//! item can never produce duplicate entries. The hero fallback image is a
//! pure function of the URL's slug and involves no network call.

use url::Url;

/// CDN base for the slug-derived hero image.
const HERO_BASE: &str =
    "https://assets.nintendo.com/image/upload/f_auto/q_auto/ncom/en_US/games/switch";

/// Normalize a URL to its canonical form: no fragment, no query, exactly
/// one trailing slash on the path. Returns `None` for unparseable input.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);
    url.set_query(None);

    let path = format!("{}/", url.path().trim_end_matches('/'));
    url.set_path(&path);

    Some(url.to_string())
}

/// Resolve a (possibly relative) href against a base URL and normalize it.
pub fn resolve_href(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    let joined = base.join(href).ok()?;
    normalize_url(joined.as_str())
}

/// Last non-empty path segment of a product URL.
pub fn slug(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| s.to_string())
}

/// Slug-derived hero image URL: first slug character selects the CDN bucket.
/// Pure and deterministic; same slug always yields the same URL.
pub fn hero_from_slug(slug: &str) -> String {
    let bucket = slug
        .chars()
        .next()
        .map(|c| c.to_ascii_lowercase())
        .unwrap_or('x');
    format!("{}/{}/{}/hero", HERO_BASE, bucket, slug)
}

/// Hero fallback image for a product URL, via its slug.
pub fn hero_for_url(url: &str) -> Option<String> {
    slug(url).map(|s| hero_from_slug(&s))
}

/// Human-readable title derived from a slug (dashes become spaces).
pub fn title_from_slug(slug: &str) -> String {
    slug.replace('-', " ")
}
