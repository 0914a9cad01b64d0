//! Patch-list store - JSON file repository with merge-on-upsert.
//!
//! Loads the whole file once, keeps an in-memory index by canonical URL,
//! writes the whole file once at the end (temp file + rename). The merge
//! policy is the load-bearing part: refresh-always for volatile display
//! fields, fill-only-if-empty for stable ones, and a non-empty old value is
//! never replaced by an empty new one. That is what keeps a transient
//! scrape failure from erasing previously-good data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::canon;
use crate::model::{self, Price, StoredEntry};

/// Outcome of a single upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub added: bool,
    /// True only when a field actually changed value; re-upserting an
    /// identical record reports neither added nor updated.
    pub updated: bool,
}

/// File-backed patch list keyed by canonical URL.
pub struct PatchStore {
    path: PathBuf,
    entries: Vec<StoredEntry>,
    index: HashMap<String, usize>,
}

impl PatchStore {
    /// Load the store from `path`. A missing file is an empty store; a
    /// present-but-malformed file is a setup error (never silently start
    /// from scratch over existing data).
    pub fn load(path: &Path) -> Result<Self> {
        let entries: Vec<StoredEntry> = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read store file {:?}", path))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Malformed store file {:?}", path))?
        } else {
            Vec::new()
        };

        let mut store = Self {
            path: path.to_path_buf(),
            entries: Vec::new(),
            index: HashMap::new(),
        };
        for entry in entries {
            store.insert_raw(entry);
        }

        tracing::debug!("Loaded {} entries from {:?}", store.len(), store.path);
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[StoredEntry] {
        &self.entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up an entry by URL (normalized before the lookup).
    pub fn get(&self, url: &str) -> Option<&StoredEntry> {
        let key = canonical_key(url);
        self.index.get(&key).map(|&i| &self.entries[i])
    }

    /// Insert-or-merge by canonical URL.
    pub fn upsert(&mut self, record: StoredEntry) -> UpsertOutcome {
        let key = canonical_key(&record.url);

        let Some(&slot) = self.index.get(&key) else {
            let mut record = record;
            record.url = key;
            self.insert_raw(record);
            return UpsertOutcome {
                added: true,
                updated: false,
            };
        };

        let old = &mut self.entries[slot];
        let mut changed = false;

        // Latest observation wins for volatile display fields.
        refresh_str(&mut old.title, &record.title, &mut changed);
        refresh_opt(&mut old.image, &record.image, &mut changed);
        refresh_opt(&mut old.regional_link, &record.regional_link, &mut changed);
        refresh_str(&mut old.link, &record.link, &mut changed);
        refresh_opt(
            &mut old.capability_hints,
            &record.capability_hints,
            &mut changed,
        );
        refresh_flag(&mut old.is_paid_upgrade, record.is_paid_upgrade, &mut changed);
        refresh_str(&mut old.source, &record.source, &mut changed);
        refresh_date(&mut old.last_checked, record.last_checked, &mut changed);

        // First observation wins for stable fields.
        fill_date(&mut old.release_date, record.release_date, &mut changed);
        fill_price(&mut old.price, record.price, &mut changed);
        fill_opt(&mut old.product_code, &record.product_code, &mut changed);
        fill_str(&mut old.hero_fallback_image, &record.hero_fallback_image, &mut changed);

        UpsertOutcome {
            added: false,
            updated: changed,
        }
    }

    /// Sort into deterministic output order and write the whole list,
    /// pretty-printed, via a temp file in the same directory.
    pub fn save(&mut self) -> Result<()> {
        model::sort_entries(&mut self.entries);
        self.reindex();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create output directory {:?}", parent))?;
            }
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize store")?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write temp file {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to move {:?} into place", tmp))?;

        tracing::info!("Wrote {} entries -> {:?}", self.entries.len(), self.path);
        Ok(())
    }

    fn insert_raw(&mut self, mut entry: StoredEntry) {
        entry.url = canonical_key(&entry.url);
        // Last one wins when a legacy file carries duplicate keys.
        if let Some(&slot) = self.index.get(&entry.url) {
            self.entries[slot] = entry;
            return;
        }
        self.index.insert(entry.url.clone(), self.entries.len());
        self.entries.push(entry);
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.url.clone(), i))
            .collect();
    }
}

fn canonical_key(url: &str) -> String {
    canon::normalize_url(url).unwrap_or_else(|| url.to_string())
}

// ============================================================================
// Merge helpers
// ============================================================================

fn refresh_str(old: &mut String, new: &str, changed: &mut bool) {
    if !new.is_empty() && old != new {
        *old = new.to_string();
        *changed = true;
    }
}

fn refresh_opt(old: &mut Option<String>, new: &Option<String>, changed: &mut bool) {
    match new.as_deref() {
        Some(value) if !value.is_empty() && old.as_deref() != Some(value) => {
            *old = Some(value.to_string());
            *changed = true;
        }
        _ => {}
    }
}

fn refresh_flag(old: &mut bool, new: bool, changed: &mut bool) {
    if *old != new {
        *old = new;
        *changed = true;
    }
}

fn refresh_date(old: &mut NaiveDate, new: NaiveDate, changed: &mut bool) {
    if *old != new {
        *old = new;
        *changed = true;
    }
}

fn fill_str(old: &mut String, new: &str, changed: &mut bool) {
    if old.is_empty() && !new.is_empty() {
        *old = new.to_string();
        *changed = true;
    }
}

fn fill_opt(old: &mut Option<String>, new: &Option<String>, changed: &mut bool) {
    if old.is_none() {
        if let Some(value) = new.as_deref().filter(|v| !v.is_empty()) {
            *old = Some(value.to_string());
            *changed = true;
        }
    }
}

fn fill_date(old: &mut Option<NaiveDate>, new: Option<NaiveDate>, changed: &mut bool) {
    if old.is_none() && new.is_some() {
        *old = new;
        *changed = true;
    }
}

fn fill_price(old: &mut Option<Price>, new: Option<Price>, changed: &mut bool) {
    if old.is_none() && new.is_some() {
        *old = new;
        *changed = true;
    }
}

// ============================================================================
// Tests
// ============================================================================
