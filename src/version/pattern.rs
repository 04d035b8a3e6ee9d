//! Shape inference for reference versions.
//!
//! Given one known-good version string, derive the structural fingerprint
//! (segment count, separators, affixes) and an extraction regex the checkers
//! use to pull same-shaped tokens out of noisy upstream text. Built once per
//! resolution and discarded; formats are independent between packages.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Which broad extraction approach fits the inferred shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Standard,
    Prefixed,
    Date,
    Generic,
}

/// Structural fingerprint of a reference version.
#[derive(Debug, Clone)]
pub struct VersionPattern {
    /// Human-readable shape tag, e.g. `a.b.c` or `unknown`.
    pub tag: &'static str,
    pub kind: PatternKind,
    /// Regex that pulls a same-shaped token out of surrounding text.
    pub regex: Regex,
    pub segment_count: usize,
    pub separators: Vec<char>,
    pub has_alpha_prefix: bool,
    pub is_date_like: bool,
}

impl VersionPattern {
    /// Dotted shape template with the reference's segment count, used by the
    /// shape-similarity check.
    pub fn shape(&self) -> String {
        vec!["x"; self.segment_count.max(1)].join(".")
    }
}

struct Rule {
    matcher: Regex,
    tag: &'static str,
    kind: PatternKind,
    extract: &'static str,
}

/// Ordered shape rules, first match wins. Anchored exact shapes first, then
/// the permissive generic fallbacks.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let rule = |m: &str, tag, kind, extract| Rule {
        matcher: Regex::new(m).unwrap(),
        tag,
        kind,
        extract,
    };
    vec![
        rule(r"^\d+\.\d+$", "a.b", PatternKind::Standard, r"(\d+\.\d+)"),
        rule(r"^\d+\.\d+\.\d+$", "a.b.c", PatternKind::Standard, r"(\d+\.\d+\.\d+)"),
        rule(
            r"^\d+\.\d+\.\d+\.\d+$",
            "a.b.c.d",
            PatternKind::Standard,
            r"(\d+\.\d+\.\d+\.\d+)",
        ),
        rule(
            r"^\d+\.\d+\.\d+\.\d+\.\d+$",
            "a.b.c.d.e",
            PatternKind::Standard,
            r"(\d+\.\d+\.\d+\.\d+\.\d+)",
        ),
        rule(
            r"^\d+\.\d+_\d+\.\d+\.\d+$",
            "a.b_c.d.e",
            PatternKind::Standard,
            r"(\d+\.\d+_\d+\.\d+\.\d+)",
        ),
        rule(
            r"^[A-Za-z]+\d+\.\d+\.\d+$",
            "PREFIXa.b.c",
            PatternKind::Prefixed,
            r"([A-Za-z]+\d+\.\d+\.\d+)",
        ),
        // Packed desktop-app suffix form, e.g. 9.0.3988.101ZH.S1
        rule(
            r"^\d+\.\d+\.\d+\.\d+[A-Z]{2}\.[A-Z]\d+$",
            "a.b.c.dXX.SY",
            PatternKind::Standard,
            r"(\d+\.\d+\.\d+\.\d+[A-Z]{2}\.[A-Z]\d+)",
        ),
        rule(
            r"^[A-Za-z]+v\d+$",
            "PREFIXvN",
            PatternKind::Prefixed,
            r"([A-Za-z]+v\d+)",
        ),
        // Generic fallbacks, unanchored.
        rule(
            r"v?\d+\.\d+\.\d+(?:\.\d+)*",
            "a.b.c+",
            PatternKind::Standard,
            r"(\d+\.\d+\.\d+(?:\.\d+)*)",
        ),
        rule(r"v?\d+\.\d+$", "a.b", PatternKind::Standard, r"(\d+\.\d+)"),
        rule(
            r"\d{4}[-/.]\d{1,2}[-/.]\d{1,2}",
            "date",
            PatternKind::Date,
            r"(\d{4}[-/.]\d{1,2}[-/.]\d{1,2})",
        ),
        rule(r"^\d+$", "a", PatternKind::Standard, r"(\d+)"),
        rule(
            r"[a-zA-Z]+\d+(?:\.\d+)*",
            "PREFIXa.b+",
            PatternKind::Prefixed,
            r"([a-zA-Z]+\d+(?:\.\d+)*)",
        ),
    ]
});

fn count_segments(reference: &str) -> usize {
    let digits_and_dots: String = reference
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits_and_dots
        .split('.')
        .filter(|s| !s.is_empty())
        .count()
        .max(1)
}

fn separators_of(reference: &str) -> Vec<char> {
    let mut seps: Vec<char> = Vec::new();
    for c in reference.chars() {
        if matches!(c, '.' | '_' | '-' | '/') && !seps.contains(&c) {
            seps.push(c);
        }
    }
    seps
}

/// Infer the shape of a reference version.
///
/// Never fails: when no rule matches, the result is the permissive `unknown`
/// pattern, which callers must treat as a valid (weak) shape, not an error.
pub fn infer(reference: &str) -> VersionPattern {
    let has_alpha_prefix = reference
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic());

    for rule in RULES.iter() {
        if rule.matcher.is_match(reference) {
            debug!("reference {} matched shape {}", reference, rule.tag);
            return VersionPattern {
                tag: rule.tag,
                kind: rule.kind,
                regex: Regex::new(rule.extract).unwrap(),
                segment_count: count_segments(reference),
                separators: separators_of(reference),
                has_alpha_prefix,
                is_date_like: rule.kind == PatternKind::Date,
            };
        }
    }

    debug!("no shape rule matched {}, using generic fallback", reference);
    VersionPattern {
        tag: "unknown",
        kind: PatternKind::Generic,
        regex: Regex::new(r"(\d+(?:\.\d+)+)").unwrap(),
        segment_count: count_segments(reference),
        separators: separators_of(reference),
        has_alpha_prefix,
        is_date_like: false,
    }
}
