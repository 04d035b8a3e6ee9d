//! Layered version extraction from release asset filenames.
//!
//! Release assets carry the version in many spellings
//! (`app-1.2.3-linux.tar.gz`, `app_v1.2.ext`, `setup1.2.3.exe`). The direct
//! dotted-run match is tried first, then progressively looser suffixed
//! patterns; every hit is validated before being accepted.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::version::model;

static DIRECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+|\d+\.\d+)").unwrap());

static LAYERED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[-_]v?(\d+\.\d+\.\d+)[.-]",
        r"[-_]v?(\d+\.\d+)[.-]",
        r"[-_]v(\d+\.\d+(?:\.\d+)?)[.-]",
        r"(\d+\.\d+\.\d+)",
        r"[^0-9](\d+\.\d+\.\d+)[^0-9]",
        r"[^0-9](\d+\.\d+)[^0-9]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Extract a plausible version from one asset filename, or `None`.
pub fn version_from_filename(filename: &str) -> Option<String> {
    if let Some(caps) = DIRECT.captures(filename) {
        let version = caps[1].to_string();
        if model::is_plausible_release(&version) {
            debug!("filename {} -> version {}", filename, version);
            return Some(version);
        }
    }

    for pattern in LAYERED.iter() {
        if let Some(caps) = pattern.captures(filename) {
            let version = caps[1].to_string();
            if model::is_plausible_release(&version) {
                debug!("filename {} -> version {} (layered)", filename, version);
                return Some(version);
            }
        }
    }

    debug!("no version in filename {}", filename);
    None
}

/// Keep only filenames containing `key` (case-insensitive substring). A
/// leading `.` on the key is ignored so `.AppImage` works as expected. When
/// nothing survives the filter, the full list is returned so extraction can
/// still proceed.
pub fn filter_by_key<'a>(filenames: &'a [String], key: &str) -> Vec<&'a String> {
    let clean_key = key.strip_prefix('.').unwrap_or(key).to_ascii_lowercase();
    let filtered: Vec<&String> = filenames
        .iter()
        .filter(|f| f.to_ascii_lowercase().contains(&clean_key))
        .collect();

    if filtered.is_empty() {
        debug!("no filenames matched key {:?}, using all", key);
        filenames.iter().collect()
    } else {
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("widget-1.2.3-x86_64.AppImage", Some("1.2.3"))]
    #[case("widget_v2.4.tar.gz", Some("2.4"))]
    #[case("setup-v10.1.2.exe", Some("10.1.2"))]
    #[case("no-version-here.txt", None)]
    #[case("widget-latest.zip", None)]
    fn extracts_versions_from_asset_names(#[case] filename: &str, #[case] expected: Option<&str>) {
        assert_eq!(version_from_filename(filename).as_deref(), expected);
    }

    #[test]
    fn key_filter_is_case_insensitive_substring() {
        let names = vec![
            "widget-1.2.3-Linux-x86_64.tar.gz".to_string(),
            "widget-1.2.3-windows.zip".to_string(),
        ];
        let kept = filter_by_key(&names, "linux");
        assert_eq!(kept.len(), 1);
        assert!(kept[0].contains("Linux"));
    }

    #[test]
    fn key_filter_ignores_leading_dot_and_falls_back_to_all() {
        let names = vec!["widget-1.2.3.AppImage".to_string()];
        assert_eq!(filter_by_key(&names, ".AppImage").len(), 1);
        assert_eq!(filter_by_key(&names, "macos").len(), 1); // fallback
    }
}
