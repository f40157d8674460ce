//! # I18n Unit Tests / I18n 单元测试
//!
//! Tests for locale negotiation, localized status strings and the
//! consistency of the locale files shipped in `locales/`.
//!
//! 语言协商、本地化状态字符串以及 `locales/` 中语言文件一致性的测试。

use e2e_matrix::cli::negotiate_locale;
use e2e_matrix::core::models::{ExecutionResult, ExecutionStatus};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

/// Flattens a nested locale file into `a.b.c -> value` pairs.
fn flatten_locale(name: &str) -> BTreeMap<String, String> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("locales").join(name);
    let text = std::fs::read_to_string(&path).unwrap();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut flat = BTreeMap::new();
    for line in text.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        let (key, value) = line.trim().split_once(':').unwrap();
        while stack.last().is_some_and(|(depth, _)| *depth >= indent) {
            stack.pop();
        }
        let value = value.trim();
        if value.is_empty() {
            stack.push((indent, key.to_string()));
            continue;
        }
        let mut full: Vec<&str> = stack.iter().map(|(_, k)| k.as_str()).collect();
        full.push(key);
        flat.insert(full.join("."), value.trim_matches('"').to_string());
    }
    flat
}

fn placeholders(value: &str) -> BTreeSet<String> {
    let re = Regex::new(r"%\{(\w+)\}").unwrap();
    re.captures_iter(value).map(|c| c[1].to_string()).collect()
}

fn result_with(status: ExecutionStatus) -> ExecutionResult {
    ExecutionResult {
        project: "api".to_string(),
        driver: "api".to_string(),
        file: "a.spec.toml".to_string(),
        case: "case".to_string(),
        item_index: 0,
        case_index: 0,
        status,
        reason: None,
        error: None,
        duration: Duration::ZERO,
        attempts: 1,
        steps: Vec::new(),
        artifacts: Vec::new(),
        notes: Vec::new(),
    }
}

#[cfg(test)]
mod negotiation_tests {
    use super::*;

    #[test]
    fn test_exact_locale_is_kept() {
        assert_eq!(negotiate_locale("en"), "en");
        assert_eq!(negotiate_locale("zh-CN"), "zh-CN");
    }

    #[test]
    fn test_language_prefix_falls_back() {
        assert_eq!(negotiate_locale("en-US"), "en");
        assert_eq!(negotiate_locale("zh_CN"), "zh-CN");
        assert_eq!(negotiate_locale("zh-TW"), "zh-CN");
    }

    #[test]
    fn test_unknown_locale_is_english() {
        assert_eq!(negotiate_locale("fr-FR"), "en");
        assert_eq!(negotiate_locale(""), "en");
    }
}

#[cfg(test)]
mod status_string_tests {
    use super::*;

    #[test]
    fn test_status_strings_are_localized() {
        let passed = result_with(ExecutionStatus::Passed);
        assert_eq!(passed.get_status_str("en"), "Passed");
        assert_eq!(passed.get_status_str("zh-CN"), "通过");

        let timed_out = result_with(ExecutionStatus::TimedOut);
        assert_ne!(timed_out.get_status_str("en"), timed_out.get_status_str("zh-CN"));
    }

    #[test]
    fn test_unknown_locale_uses_fallback() {
        let failed = result_with(ExecutionStatus::Failed);
        assert_eq!(failed.get_status_str("xx"), failed.get_status_str("en"));
    }
}

#[cfg(test)]
mod locale_file_tests {
    use super::*;

    #[test]
    fn test_locales_share_the_same_keys() {
        let en = flatten_locale("en.yml");
        let zh = flatten_locale("zh-CN.yml");
        let en_keys: BTreeSet<&String> = en.keys().collect();
        let zh_keys: BTreeSet<&String> = zh.keys().collect();
        assert_eq!(en_keys, zh_keys);
        assert!(en.contains_key("run.starting"));
        assert!(en.contains_key("html_report.table.header.project"));
    }

    #[test]
    fn test_placeholders_match_across_locales() {
        let en = flatten_locale("en.yml");
        let zh = flatten_locale("zh-CN.yml");
        for (key, value) in &en {
            assert_eq!(
                placeholders(value),
                placeholders(&zh[key]),
                "placeholder mismatch in {key}"
            );
        }
    }
}
