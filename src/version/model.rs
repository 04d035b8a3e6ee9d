//! Value-level parsing, normalization and comparison of loosely-structured
//! version strings.
//!
//! Upstream sources emit versions in wildly different shapes (`v1.2.3`,
//! `app-1.2.3.tar.gz`, `2:1.5-3`, `6.0.37`), so everything here works on
//! plain text and stays deliberately forgiving. The one place with real
//! ordering semantics is [`latest_of`].

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::version::pattern::VersionPattern;

/// An `epoch:version-release` decomposition. Absent parts are empty strings,
/// never missing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionParts {
    pub epoch: String,
    pub version: String,
    pub release: String,
}

static ARCHIVE_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(zip|tar\.gz|tgz|rpm|deb|exe|dmg|pkg)$").unwrap());
static LEADING_NON_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^0-9]*").unwrap());
static TRAILING_JUNK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9.]*$").unwrap());

/// Placeholder tags that look like versions to a naive extractor but never
/// are ones.
const PLACEHOLDER_TAGS: &[&str] = &[
    "latest", "current", "stable", "master", "main", "head", "nightly", "next",
];

/// Split a packaging version string into epoch, core and release.
///
/// The epoch is everything before the first `:`, the release everything after
/// the last `-`. Underscores in the core are folded to hyphens so the core
/// can be matched against upstream text that uses either separator.
pub fn decompose(raw: &str) -> VersionParts {
    if raw.is_empty() {
        return VersionParts::default();
    }

    let (epoch, rest) = match raw.split_once(':') {
        Some((e, r)) => (e.to_string(), r),
        None => (String::new(), raw),
    };

    let (version, release) = match rest.rsplit_once('-') {
        Some((v, r)) => (v.to_string(), r.to_string()),
        None => (rest.to_string(), String::new()),
    };

    let normalized = version.replace('_', "-");
    if normalized != version {
        debug!("normalized version core: {} -> {}", version, normalized);
    }

    VersionParts {
        epoch,
        version: normalized,
        release,
    }
}

/// Strip archive/package file extensions and leading `v`/`-`/`_` markers.
pub fn clean(raw: &str) -> String {
    let without_ext = ARCHIVE_EXT.replace(raw, "");
    without_ext
        .trim_start_matches(['v', 'V', '-', '_'])
        .to_string()
}

/// Trim any leading non-digit run and trailing non-digit-non-dot run so the
/// result starts and ends with a digit, or is empty. Idempotent.
pub fn normalize(cleaned: &str) -> String {
    let s = LEADING_NON_DIGIT.replace(cleaned, "");
    TRAILING_JUNK.replace(&s, "").into_owned()
}

/// Whether `candidate` is shaped like the reference version.
///
/// A candidate with fewer dot segments than the reference is still accepted
/// as a partial match provided it has at least two segments. Candidates with
/// the same or more segments must be purely numeric in every segment.
pub fn is_similar(candidate: &str, reference_shape: &str) -> bool {
    if candidate.is_empty() || reference_shape.is_empty() {
        return false;
    }

    let candidate_parts: Vec<&str> = candidate.split('.').collect();
    let reference_parts: Vec<&str> = reference_shape.split('.').collect();

    if candidate_parts.len() < reference_parts.len() {
        return candidate_parts.len() >= 2;
    }

    candidate_parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Whether a tag name is plausibly a release version at all.
///
/// Filters branch-like placeholder tags and anything without a dotted
/// numeric core. An optional `-suffix` pre-release marker is accepted.
pub fn is_plausible_release(tag: &str) -> bool {
    if tag.is_empty() {
        return false;
    }
    if PLACEHOLDER_TAGS.contains(&tag.to_ascii_lowercase().as_str()) {
        debug!("'{}' is a placeholder tag, not a version", tag);
        return false;
    }

    static DOTTED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\d+(\.\d+){1,4}(-[a-zA-Z0-9.]+)?$").unwrap());
    DOTTED.is_match(tag)
}

/// Whether a version string carries a test-channel marker (`-rc1`,
/// `2.0.0-beta.2`, `3.0.0.dev1`). Architecture-ish suffixes like `-x86`
/// do not count.
pub fn is_prerelease(version: &str) -> bool {
    static MARKER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)(?:^|[-._])(?:alpha|beta|rc|dev|preview|pre|snapshot|nightly|test)(?:[0-9.]|$)")
            .unwrap()
    });
    MARKER.is_match(version)
}

/// Compare two normalized dotted versions segment by segment, right-padding
/// the shorter with implicit zeros.
fn compare_normalized(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<u64> = a.split('.').map(|p| p.parse().unwrap_or(0)).collect();
    let b_parts: Vec<u64> = b.split('.').map(|p| p.parse().unwrap_or(0)).collect();
    let len = a_parts.len().max(b_parts.len());

    for i in 0..len {
        let x = a_parts.get(i).copied().unwrap_or(0);
        let y = b_parts.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Whether `shorter` occurs inside `longer` at a segment-aligned boundary:
/// as a prefix (`6.37` in `6.37.1`), a suffix (`6.37` in `2.6.37`) or
/// embedded (`6.37` in `2.6.37.1`).
fn is_boundary_substring(shorter: &str, longer: &str) -> bool {
    if shorter == longer || shorter.is_empty() {
        return false;
    }
    longer.starts_with(&format!("{shorter}."))
        || longer.ends_with(&format!(".{shorter}"))
        || longer.contains(&format!(".{shorter}."))
}

/// Pick the latest version out of a noisy candidate pool.
///
/// Invalid and unnormalizable entries are dropped first, then candidates that
/// are boundary-aligned substrings of a longer candidate in the same pool
/// (a partial extraction of it, not an independent version). The survivors
/// are compared numerically and the winner's *original* string is returned.
///
/// When a reference pattern is supplied and the numeric winner fails the
/// shape check, the first shape-similar candidate that is not numerically
/// inferior to it is preferred instead: format fidelity beats raw maximality
/// when the two disagree.
pub fn latest_of(candidates: &[String], pattern: Option<&VersionPattern>) -> Option<String> {
    if candidates.is_empty() {
        warn!("empty candidate pool");
        return None;
    }

    let mut valid: Vec<(String, String)> = Vec::new();
    for candidate in candidates {
        let normalized = normalize(&clean(candidate));
        if !normalized.is_empty() {
            valid.push((candidate.clone(), normalized));
        }
    }

    if valid.is_empty() {
        warn!("no valid versions to compare in {:?}", candidates);
        return None;
    }
    if valid.len() == 1 {
        return Some(valid[0].0.clone());
    }

    // Drop partial extractions: a candidate contained in a longer candidate
    // at a segment boundary is noise from the same source, not a rival.
    let normals: Vec<String> = valid.iter().map(|(_, n)| n.clone()).collect();
    valid.retain(|(original, normalized)| {
        let partial = normals
            .iter()
            .any(|other| is_boundary_substring(normalized, other));
        if partial {
            debug!("dropping partial candidate {}", original);
        }
        !partial
    });

    if valid.is_empty() {
        return None;
    }

    let mut latest = valid[0].clone();
    for entry in &valid[1..] {
        if compare_normalized(&entry.1, &latest.1) == Ordering::Greater {
            latest = entry.clone();
        }
    }

    // Shape-fidelity re-check against the reference pattern.
    if let Some(pattern) = pattern {
        let shape = pattern.shape();
        if !is_similar(&latest.0, &shape) {
            warn!(
                "latest candidate {} does not match reference shape {}",
                latest.0, shape
            );
            for (original, normalized) in &valid {
                if is_similar(original, &shape)
                    && compare_normalized(normalized, &latest.1) != Ordering::Less
                {
                    debug!("preferring shape-similar candidate {}", original);
                    latest = (original.clone(), normalized.clone());
                    break;
                }
            }
        }
    }

    Some(latest.0)
}

/// Pull a version token out of arbitrary surrounding text (filenames, URL
/// path segments, page snippets).
///
/// Patterns are ordered most- to least-specific; the last non-empty capture
/// group of the first matching pattern wins.
pub fn extract_from_text(text: &str) -> Option<String> {
    static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        [
            r"(\d+\.\d+\.\d+\.\d+)",
            r"(\d+\.\d+\.\d+)",
            r"(\d+\.\d+)",
            r"[_-](\d+\.\d+\.\d+)",
            r"[_-](\d+\.\d+)",
            r"[_-](\d+)",
            r"/(\d+\.\d+\.\d+)/",
            r"/(\d+\.\d+)/",
            r"/(\d+)/",
            r"/[^/]+?-(\d+\.\d+\.\d+)",
            r"/[^/]+?-(\d+\.\d+)",
            r"[^/]+?-(\d+\.\d+\.\d+)",
            r"[^/]+?-(\d+\.\d+)",
            r"(\d+)",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });

    for pattern in PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            for i in (1..=caps.len() - 1).rev() {
                if let Some(m) = caps.get(i) {
                    return Some(m.as_str().to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::pattern::infer;
    use rstest::rstest;

    #[rstest]
    #[case("2:1.5-3", "2", "1.5", "3")]
    #[case("1.5", "", "1.5", "")]
    #[case("1.5-2", "", "1.5", "2")]
    #[case("1.2_rc1-1", "", "1.2-rc1", "1")]
    #[case("", "", "", "")]
    fn decompose_splits_epoch_core_release(
        #[case] raw: &str,
        #[case] epoch: &str,
        #[case] version: &str,
        #[case] release: &str,
    ) {
        let parts = decompose(raw);
        assert_eq!(parts.epoch, epoch);
        assert_eq!(parts.version, version);
        assert_eq!(parts.release, release);
    }

    #[rstest]
    #[case("app-1.2.3.tar.gz", "app-1.2.3")]
    #[case("widget-2.0.ZIP", "widget-2.0")]
    #[case("v1.2.3", "1.2.3")]
    #[case("_-v2.0", "2.0")]
    #[case("1.2.3.dmg", "1.2.3")]
    fn clean_strips_extensions_and_markers(#[case] raw: &str, #[case] expected: &str) {
        let cleaned = clean(raw);
        assert_eq!(cleaned, expected);
        assert!(!cleaned.contains(".tar.gz"));
    }

    #[rstest]
    #[case("release-1.2.3-final", "1.2.3")]
    #[case("abc", "")]
    #[case("1.2.3", "1.2.3")]
    #[case("v6.0rc2", "6.0")]
    fn normalize_trims_to_digit_boundaries(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize(raw), expected);
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["release-1.2.3-final", "abc", "1.2.3", "v6.0rc2", ""] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }

    #[rstest]
    #[case("6.37", "1.2.3", true)] // partial, >= 2 segments
    #[case("abc", "1.2.3", false)]
    #[case("1.2.3", "1.2.3", true)]
    #[case("1.2.3a", "1.2.3", false)]
    #[case("7", "1.2", false)] // single segment partial
    #[case("1.2.3.4", "1.2", true)]
    fn is_similar_matches_shapes(
        #[case] candidate: &str,
        #[case] reference: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(is_similar(candidate, reference), expected);
    }

    #[rstest]
    #[case("latest", false)]
    #[case("Nightly", false)]
    #[case("1.2.3", true)]
    #[case("1.2", true)]
    #[case("1.2.3-rc1", true)]
    #[case("f00dcafe", false)]
    fn plausible_release_filters_placeholders(#[case] tag: &str, #[case] expected: bool) {
        assert_eq!(is_plausible_release(tag), expected);
    }

    #[rstest]
    #[case("1.2.3-rc1", true)]
    #[case("2.0.0-beta.2", true)]
    #[case("3.0.0.dev1", true)]
    #[case("4.0.0-preview", true)]
    #[case("1.2.3", false)]
    #[case("1.2.3-x86", false)]
    #[case("2.0.0-3", false)]
    fn prerelease_markers_are_detected(#[case] version: &str, #[case] expected: bool) {
        assert_eq!(is_prerelease(version), expected);
    }

    #[test]
    fn latest_of_right_pads_shorter_versions() {
        let pool = vec!["1.2".to_string(), "1.2.3".to_string()];
        assert_eq!(latest_of(&pool, None).as_deref(), Some("1.2.3"));
    }

    #[test]
    fn latest_of_compares_segment_tuples() {
        let pool = vec!["4.17.19".into(), "4.17.21".into(), "4.17.20".into()];
        assert_eq!(latest_of(&pool, None).as_deref(), Some("4.17.21"));
    }

    #[test]
    fn latest_of_returns_original_form_of_winner() {
        let pool = vec!["v1.9.0".to_string(), "v2.0.0.tar.gz".to_string()];
        assert_eq!(latest_of(&pool, None).as_deref(), Some("v2.0.0.tar.gz"));
    }

    #[test]
    fn latest_of_excludes_boundary_aligned_substrings() {
        // "6.37" is a suffix-aligned fragment of "2.6.37"; it must not win
        // just because 6 > 2 in the first segment.
        let pool = vec!["2.6.37".to_string(), "6.37".to_string()];
        assert_eq!(latest_of(&pool, None).as_deref(), Some("2.6.37"));
    }

    #[test]
    fn latest_of_single_survivor_is_returned_unchanged() {
        let pool = vec!["v3.1.4.zip".to_string()];
        assert_eq!(latest_of(&pool, None).as_deref(), Some("v3.1.4.zip"));
    }

    #[test]
    fn latest_of_empty_and_invalid_pools_yield_none() {
        assert_eq!(latest_of(&[], None), None);
        let junk = vec!["abc".to_string(), "---".to_string()];
        assert_eq!(latest_of(&junk, None), None);
    }

    #[test]
    fn latest_of_prefers_shape_similar_candidate_on_mismatch() {
        // Both candidates normalize to 5.1.0, so the noisy one wins the
        // numeric comparison by pool order; the shape re-check swaps in the
        // clean three-segment form.
        let pattern = infer("1.2.3");
        let pool = vec!["v5.1.0-beta".to_string(), "5.1.0".to_string()];
        assert_eq!(latest_of(&pool, Some(&pattern)).as_deref(), Some("5.1.0"));
    }

    #[rstest]
    #[case("widget-1.2.3-linux.tar.gz", "1.2.3")]
    #[case("setup_2.6.exe", "2.6")]
    #[case("tool-v4.5.6.AppImage", "4.5.6")]
    #[case("build7", "7")]
    fn extract_from_text_finds_embedded_versions(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(extract_from_text(text).as_deref(), Some(expected));
    }

    #[test]
    fn extract_from_text_gives_up_on_versionless_text() {
        assert_eq!(extract_from_text("no-digits-here"), None);
    }
}
