//! patchscout - Switch 2 performance patch tracker
//!
//! Walks the Nintendo US storefront listing for Switch 2 editions,
//! resolves each product page and maintains a merged JSON patch list.

pub mod canon;
pub mod cli;
pub mod collector;
pub mod fetch;
pub mod hints;
pub mod model;
pub mod pipeline;
pub mod rates;
pub mod resolver;
pub mod store;

// Re-exports
pub use collector::{CollectedListing, CollectorConfig, ListingCollector};
pub use fetch::{FetchError, HttpPageClient, PageClient, RenderedPage};
pub use hints::HintClassifier;
pub use model::{CatalogItem, Price, StoredEntry};
pub use pipeline::{Pipeline, ScanConfig, ScanStats};
pub use rates::{FixedRates, HttpRateSource, RateSource};
pub use resolver::{DetailResolver, Resolved, ResolverConfig};
pub use store::{PatchStore, UpsertOutcome};
