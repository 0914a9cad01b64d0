//! Capability hint classification.
//!
//! Pure keyword/pattern matching over lower-cased page text. Each rule is an
//! independent predicate mapping to one canonical tag; rule order does not
//! change which tags match, but it is the fixed priority used when more than
//! [`MAX_HINTS`] rules fire. Tag strings are the German display labels the
//! front-end renders verbatim.

use anyhow::{Context, Result};
use regex::Regex;

/// Cap on the number of tags in a hint string.
pub const MAX_HINTS: usize = 5;

/// Rule priority order: frame rate, resolution, load times, visuals,
/// perf/quality mode, ray tracing, haptics.
const HINT_RULES: &[(&str, &str)] = &[
    (
        r"\b60\s*fps\b|\b120\s*fps\b|higher frame|improved frame|framerate\b",
        "bis zu 60 FPS",
    ),
    (
        r"\b4k\b|ultra hd|higher resolution|upscaled|fsr|dlss",
        "höhere Auflösung",
    ),
    (
        r"reduced loading|faster loading|ladezeiten|load time",
        "kürzere Ladezeiten",
    ),
    (
        r"visual improvements|improved visuals|graphics|texturen",
        "Grafik-Verbesserungen",
    ),
    (
        r"performance mode|quality mode|modus",
        "Performance-/Qualitätsmodus",
    ),
    (r"ray tracing", "Raytracing (wenn aktiv)"),
    (r"haptics|rumble", "verbessertes Rumble/Haptik"),
];

/// Generic fallback tag when the text mentions the platform but matches no
/// specific rule.
const GENERIC_PATTERN: &str = r"switch\s*2|nintendo\s*switch\s*2|next-gen";
const GENERIC_TAG: &str = "Switch-2-optimiert";

/// Disjoint rule set for the paid-upgrade flag.
const PAID_PATTERNS: &[&str] = &[
    r"paid\s*(upgrade|patch|update)",
    r"upgrade\s*fee|pay\s*to\s*upgrade|kostenpflichtig|bezahl(?:t|bar)",
    r"deluxe\s*upgrade|expansion\s*upgrade",
];

/// Screen for "is this page about a performance patch at all".
const PATCH_PATTERNS: &[&str] = &[
    r"switch\s*2\s*(edition|update|patch)",
    r"performance\s*(patch|update|mode)",
    r"enhanced|improved|upgrade|remaster",
    r"frame\s*rate|fps|resolution|visuals|graphics",
];

/// Compiled hint rules. Build once, classify many times.
pub struct HintClassifier {
    rules: Vec<(Regex, &'static str)>,
    generic: Regex,
    paid: Vec<Regex>,
    patchy: Vec<Regex>,
}

impl HintClassifier {
    pub fn new() -> Result<Self> {
        let rules = HINT_RULES
            .iter()
            .map(|(pattern, tag)| Ok((compile(pattern)?, *tag)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            generic: compile(GENERIC_PATTERN)?,
            paid: PAID_PATTERNS.iter().map(|p| compile(p)).collect::<Result<_>>()?,
            patchy: PATCH_PATTERNS.iter().map(|p| compile(p)).collect::<Result<_>>()?,
        })
    }

    /// Derive the comma-joined hint string from free-form page text.
    /// Returns `None` when nothing matched, not even the generic fallback.
    pub fn classify(&self, text: &str) -> Option<String> {
        let text = text.to_lowercase();

        let mut tags: Vec<&str> = self
            .rules
            .iter()
            .filter(|(re, _)| re.is_match(&text))
            .map(|(_, tag)| *tag)
            .collect();

        if tags.is_empty() && self.generic.is_match(&text) {
            tags.push(GENERIC_TAG);
        }

        tags.dedup();
        tags.truncate(MAX_HINTS);

        if tags.is_empty() {
            None
        } else {
            Some(tags.join(", "))
        }
    }

    /// Does the text talk about a paid upgrade / upgrade fee?
    pub fn is_paid_upgrade(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.paid.iter().any(|re| re.is_match(&text))
    }

    /// Loose screen for whether the page is about a performance patch at
    /// all; non-matching candidates are skipped by the pipeline.
    pub fn looks_like_patch(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.patchy.iter().any(|re| re.is_match(&text))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("Bad hint pattern: {}", pattern))
}

// ============================================================================
// Tests
// ============================================================================
