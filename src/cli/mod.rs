//! CLI - command definitions and implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::CollectorConfig;
use crate::fetch::HttpPageClient;
use crate::hints::HintClassifier;
use crate::pipeline::{Pipeline, ScanConfig};
use crate::rates::HttpRateSource;
use crate::resolver::ResolverConfig;
use crate::store::PatchStore;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "patchscout")]
#[command(version, about = "Switch 2 performance patch tracker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the storefront and merge results into the patch list
    Scan {
        /// Output JSON file (also the merge base)
        #[arg(short, long, default_value = "performance_patches.json")]
        out: PathBuf,

        /// Seed file: JSON array of product URLs
        #[arg(short, long)]
        seeds: Option<PathBuf>,

        /// Skip the listing walk and use seeds only
        #[arg(long)]
        no_listing: bool,

        /// Pagination cap for the listing walk
        #[arg(long, default_value_t = 20)]
        max_pages: usize,

        /// Parallel detail-page resolutions
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Display currency for stored prices
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Keep records even when they fail the performance-patch screen
        #[arg(long)]
        all: bool,

        /// Listing base URL override
        #[arg(long)]
        listing_url: Option<String>,
    },

    /// Print stored entries
    List {
        /// Patch list file
        #[arg(short, long, default_value = "performance_patches.json")]
        out: PathBuf,

        /// Limit the number of printed entries
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Classify hint text (from arguments or stdin)
    Classify {
        /// Text to classify; reads stdin when omitted
        text: Vec<String>,
    },

    /// Show store status
    Status {
        /// Patch list file
        #[arg(short, long, default_value = "performance_patches.json")]
        out: PathBuf,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan {
            out,
            seeds,
            no_listing,
            max_pages,
            concurrency,
            currency,
            all,
            listing_url,
        } => {
            cmd_scan(
                out,
                seeds,
                no_listing,
                max_pages,
                concurrency,
                currency,
                all,
                listing_url,
            )
            .await
        }
        Commands::List { out, limit } => cmd_list(&out, limit),
        Commands::Classify { text } => cmd_classify(text),
        Commands::Status { out } => cmd_status(&out),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Full pipeline run. Setup failures (unreadable seeds, malformed store)
/// abort with non-zero exit; per-item failures are logged and skipped.
#[allow(clippy::too_many_arguments)]
async fn cmd_scan(
    out: PathBuf,
    seeds: Option<PathBuf>,
    no_listing: bool,
    max_pages: usize,
    concurrency: usize,
    currency: String,
    all: bool,
    listing_url: Option<String>,
) -> Result<()> {
    let seed_urls = match seeds {
        Some(ref path) => read_seeds(path)?,
        None => Vec::new(),
    };

    if seed_urls.is_empty() && no_listing {
        anyhow::bail!("Nothing to scan: --no-listing given and no usable seeds");
    }

    let mut store = PatchStore::load(&out).context("Failed to load patch list")?;
    println!(
        "[*] Merge base: {} entries in {}",
        store.len(),
        out.display()
    );

    let mut collector = CollectorConfig {
        max_pages,
        ..Default::default()
    };
    if let Some(url) = listing_url {
        collector.listing_url = url;
    }

    let config = ScanConfig {
        collector,
        resolver: ResolverConfig {
            target_currency: currency,
            ..Default::default()
        },
        concurrency,
        use_listing: !no_listing,
        keep_all: all,
        ..Default::default()
    };

    let client = Arc::new(HttpPageClient::new().context("Failed to set up page client")?);
    let rates = Arc::new(HttpRateSource::new().context("Failed to set up rate source")?);
    let pipeline = Pipeline::new(client, rates, config)?;

    println!("[*] Scanning ({} seeds)...", seed_urls.len());
    let stats = pipeline.run(&mut store, &seed_urls).await?;

    store.save().context("Failed to write patch list")?;

    println!(
        "[OK] scan: scanned={} skipped={} failed={} added={} updated={} total={}",
        stats.scanned,
        stats.skipped,
        stats.failed,
        stats.added,
        stats.updated,
        store.len()
    );

    Ok(())
}

fn cmd_list(out: &Path, limit: usize) -> Result<()> {
    let store = PatchStore::load(out).context("Failed to load patch list")?;

    if store.is_empty() {
        println!("[!] No entries in {}", out.display());
        return Ok(());
    }

    println!("[OK] {} entries:\n", store.len());

    for entry in store.entries().iter().take(limit) {
        let release = entry
            .release_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "tba".to_string());
        let price = entry
            .price
            .as_ref()
            .map(|p| format!("{:.2} {}", p.amount, p.currency))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {} [{}] [{}]",
            truncate_text(&entry.title, 48),
            release,
            price
        );
        println!("    {}", entry.link);
        if let Some(ref hints) = entry.capability_hints {
            println!("    {}", truncate_text(hints, 72));
        }
        println!();
    }

    Ok(())
}

fn cmd_classify(text: Vec<String>) -> Result<()> {
    let input = if text.is_empty() {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        text.join(" ")
    };

    let classifier = HintClassifier::new()?;

    match classifier.classify(&input) {
        Some(hints) => println!("[OK] hints: {}", hints),
        None => println!("[!] no hints matched"),
    }
    println!("     paid upgrade: {}", classifier.is_paid_upgrade(&input));
    println!("     patch-like:   {}", classifier.looks_like_patch(&input));

    Ok(())
}

fn cmd_status(out: &Path) -> Result<()> {
    println!("patchscout v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if !out.exists() {
        println!("[!] No patch list at {}", out.display());
        return Ok(());
    }

    let store = PatchStore::load(out).context("Failed to load patch list")?;

    let dated = store
        .entries()
        .iter()
        .filter(|e| e.release_date.is_some())
        .count();
    let priced = store.entries().iter().filter(|e| e.price.is_some()).count();
    let hinted = store
        .entries()
        .iter()
        .filter(|e| e.capability_hints.is_some())
        .count();
    let paid = store.entries().iter().filter(|e| e.is_paid_upgrade).count();

    println!("[*] Patch list: {}", out.display());
    println!("[OK] {} entries", store.len());
    println!("     with release date: {}", dated);
    println!("     with price:        {}", priced);
    println!("     with hints:        {}", hinted);
    println!("     paid upgrades:     {}", paid);

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Seed file: flat JSON array of URL strings.
fn read_seeds(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Malformed seed file {:?}", path))
}

/// UTF-8 safe truncation for console output.
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_read_seeds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seeds.json");
        std::fs::write(
            &path,
            r#"["https://www.nintendo.com/us/store/products/a/", "https://www.nintendo.com/us/store/products/b/"]"#,
        )
        .unwrap();

        let seeds = read_seeds(&path).unwrap();
        assert_eq!(seeds.len(), 2);
    }

    #[test]
    fn test_read_seeds_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seeds.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(read_seeds(&path).is_err());
    }

    #[test]
    fn test_missing_seed_file_is_fatal() {
        assert!(read_seeds(Path::new("/nonexistent/seeds.json")).is_err());
    }
}
