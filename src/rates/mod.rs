//! Currency conversion lookup.
//!
//! External collaborator: a fixed-rate source keyed by source/target
//! currency. Conversion failure yields no price rather than a guessed value.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// Rate lookup keyed by source/target currency code.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn rate(&self, from: &str, to: &str) -> Result<f64>;
}

/// Round to two decimal places for display currencies.
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Convert an amount into the target currency. Same-currency amounts pass
/// through (rounded); a failed rate lookup yields `None`.
pub async fn convert(rates: &dyn RateSource, amount: f64, from: &str, to: &str) -> Option<f64> {
    if from.eq_ignore_ascii_case(to) {
        return Some(round2(amount));
    }

    match rates.rate(from, to).await {
        Ok(rate) => Some(round2(amount * rate)),
        Err(e) => {
            tracing::warn!("Rate lookup {}->{} failed: {}", from, to, e);
            None
        }
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

const RATE_ENDPOINT: &str = "https://api.frankfurter.app/latest";

#[derive(Debug, Deserialize)]
struct RateResponse {
    rates: HashMap<String, f64>,
}

/// Rate source backed by the frankfurter.app fixed-rate API.
pub struct HttpRateSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRateSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build rate client")?;

        Ok(Self {
            client,
            endpoint: RATE_ENDPOINT.to_string(),
        })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn rate(&self, from: &str, to: &str) -> Result<f64> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("from", from), ("to", to)])
            .send()
            .await
            .context("Rate request failed")?
            .error_for_status()
            .context("Rate request rejected")?
            .json::<RateResponse>()
            .await
            .context("Malformed rate response")?;

        response
            .rates
            .get(&to.to_uppercase())
            .copied()
            .with_context(|| format!("No rate for {} in response", to))
    }
}

// ============================================================================
// Static table (tests, offline runs)
// ============================================================================

/// In-memory rate table.
#[derive(Debug, Default)]
pub struct FixedRates {
    table: HashMap<(String, String), f64>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: f64) -> Self {
        self.table
            .insert((from.to_uppercase(), to.to_uppercase()), rate);
        self
    }
}

#[async_trait]
impl RateSource for FixedRates {
    async fn rate(&self, from: &str, to: &str) -> Result<f64> {
        self.table
            .get(&(from.to_uppercase(), to.to_uppercase()))
            .copied()
            .with_context(|| format!("No fixed rate {}->{}", from, to))
    }
}

// ============================================================================
// Tests
// ============================================================================
