//! Page fetch capability.
//!
//! The rendered-page engine is an external collaborator: everything the
//! pipeline needs is "fetch this URL, give me the settled URL, the status
//! and the HTML". [`PageClient`] is that seam; the default implementation
//! is a plain `reqwest` client, tests swap in an in-memory mock.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Per-fetch failure taxonomy. All variants are handled at single-item
/// granularity and never abort a run. Error HTTP statuses are not fetch
/// failures here; they come back as a [`RenderedPage`] and are handled by
/// [`RenderedPage::is_dead`], since a soft-404 body is still worth mining.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
}

/// A fetched, settled page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL that was requested.
    pub requested_url: String,
    /// URL the request settled on after redirects.
    pub final_url: String,
    pub status: u16,
    pub html: String,
}

impl RenderedPage {
    /// Dead-link check: error status, or the storefront's error-page path.
    /// Path markers are matched as whole segments so product slugs that
    /// merely contain them (`errorless-game`) stay live.
    pub fn is_dead(&self) -> bool {
        if self.status >= 400 {
            return true;
        }
        let Ok(url) = Url::parse(&self.final_url) else {
            return false;
        };
        url.path_segments().is_some_and(|mut segments| {
            segments.any(|s| {
                let s = s.to_ascii_lowercase();
                s == "error" || s == "404" || s == "page-not-found"
            })
        })
    }
}

/// Capability to fetch a rendered page.
#[async_trait]
pub trait PageClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RenderedPage, FetchError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122 Safari/537.36";

/// Fixed legal birthdate submitted to age-gate forms.
const GATE_BIRTHDATE: (&str, &str, &str) = ("1990", "1", "1");

/// `reqwest`-backed [`PageClient`] with a bounded per-request timeout and
/// a best-effort age-gate bypass.
pub struct HttpPageClient {
    client: reqwest::Client,
}

impl HttpPageClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<RenderedPage, FetchError> {
        let response = self.client.get(url).send().await.map_err(map_reqwest)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = response.text().await.map_err(map_reqwest)?;

        Ok(RenderedPage {
            requested_url: url.to_string(),
            final_url,
            status,
            html,
        })
    }

    /// Attempted once per page, best-effort: submit the fixed birthdate to
    /// the gate form and re-fetch. Any failure leaves the original page in
    /// place; the caller extracts whatever is there.
    async fn try_pass_age_gate(&self, page: RenderedPage) -> RenderedPage {
        if !looks_age_gated(&page.html) {
            return page;
        }

        tracing::debug!("Age gate detected on {}", page.final_url);

        let (year, month, day) = GATE_BIRTHDATE;
        let form = [("year", year), ("month", month), ("day", day)];
        let submit = self
            .client
            .post(&page.final_url)
            .form(&form)
            .send()
            .await;

        if let Err(e) = submit {
            tracing::debug!("Age gate submit failed (ignored): {}", e);
            return page;
        }

        match self.get(&page.requested_url).await {
            Ok(retry) if !looks_age_gated(&retry.html) => retry,
            _ => page,
        }
    }
}

#[async_trait]
impl PageClient for HttpPageClient {
    async fn fetch(&self, url: &str) -> Result<RenderedPage, FetchError> {
        let page = self.get(url).await?;
        Ok(self.try_pass_age_gate(page).await)
    }
}

fn map_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Heuristic for the interstitial date-of-birth form.
fn looks_age_gated(html: &str) -> bool {
    let lower = html.to_lowercase();
    (lower.contains(r#"name="year""#) || lower.contains(r#"id="year""#))
        && (lower.contains("birth") || lower.contains("age gate") || lower.contains("age-gate"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn page(status: u16, final_url: &str) -> RenderedPage {
        RenderedPage {
            requested_url: "https://example.com/a/".to_string(),
            final_url: final_url.to_string(),
            status,
            html: String::new(),
        }
    }

    #[test]
    fn test_dead_on_error_status() {
        assert!(page(404, "https://example.com/a/").is_dead());
        assert!(page(500, "https://example.com/a/").is_dead());
        assert!(!page(200, "https://example.com/a/").is_dead());
    }

    #[test]
    fn test_dead_on_error_page_redirect() {
        assert!(page(200, "https://example.com/error/404/").is_dead());
        assert!(page(200, "https://example.com/page-not-found").is_dead());
    }

    #[test]
    fn test_slug_containing_error_marker_stays_live() {
        assert!(!page(200, "https://example.com/us/store/products/errorless-game/").is_dead());
        assert!(!page(200, "https://example.com/us/store/products/404-not-a-game/").is_dead());
    }

    #[test]
    fn test_age_gate_detection() {
        let gated = r#"<form><select name="year"></select><p>Please enter your birth date</p></form>"#;
        assert!(looks_age_gated(gated));
        assert!(!looks_age_gated("<html><body>Product page</body></html>"));
    }

    #[test]
    fn test_client_creation() {
        assert!(HttpPageClient::new().is_ok());
    }
}
