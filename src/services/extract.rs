// src/services/extract.rs

//! Phone candidate extraction.
//!
//! Listings expose numbers through different channels depending on the
//! endpoint and page generation, so three independent strategies run in
//! priority order and their results are unioned rather than stopping at the
//! first hit. Extraction never fails: a target with no phone is an expected
//! outcome and yields an empty sequence.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

/// Which strategy surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Phone-bearing field in an API JSON document
    StructuredField,
    /// JSON payload embedded in the page's `__NEXT_DATA__` script tag
    ScriptBlob,
    /// Loose pattern match over raw text
    TextPattern,
}

/// One raw candidate string; normalization happens downstream.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub raw: String,
    pub strategy: Strategy,
}

/// JSON keys that carry phone numbers across the API's response shapes.
const PHONE_FIELDS: &[&str] = &["phone_number", "phone", "mobile", "contact_phone"];

/// Runs the extraction strategies over fetched content.
pub struct Extractor {
    next_data: Regex,
    patterns: Vec<Regex>,
}

impl Extractor {
    pub fn new() -> Self {
        let next_data = Regex::new(
            r#"(?s)<script id="__NEXT_DATA__"[^>]*>(.*?)</script>"#,
        )
        .expect("valid pattern");
        // Loose on purpose: the normalizer rejects false positives.
        let patterns = vec![
            Regex::new(r"\+?995[\s\-]?\d{3}[\s\-]?\d{3}[\s\-]?\d{3}").expect("valid pattern"),
            Regex::new(r"\b5\d{2}[\s\-]?\d{3}[\s\-]?\d{3}\b").expect("valid pattern"),
        ];
        Self {
            next_data,
            patterns,
        }
    }

    /// Extract raw phone candidates from one target's content.
    pub fn extract(&self, content: &str) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut push = |raw: String, strategy: Strategy, out: &mut Vec<Candidate>| {
            if seen.insert(raw.clone()) {
                out.push(Candidate { raw, strategy });
            }
        };

        // Strategy 1: the whole document is JSON (API responses).
        if let Ok(value) = serde_json::from_str::<Value>(content) {
            for raw in collect_phone_fields(&value) {
                push(raw, Strategy::StructuredField, &mut out);
            }
        }

        // Strategy 2: embedded script blob.
        if let Some(caps) = self.next_data.captures(content) {
            if let Ok(value) = serde_json::from_str::<Value>(&caps[1]) {
                for raw in collect_phone_fields(&value) {
                    push(raw, Strategy::ScriptBlob, &mut out);
                }
            }
        }

        // Strategy 3: loose text patterns.
        for pattern in &self.patterns {
            for found in pattern.find_iter(content) {
                push(found.as_str().to_string(), Strategy::TextPattern, &mut out);
            }
        }

        out
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first walk collecting values of known phone-bearing keys.
fn collect_phone_fields(value: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    if PHONE_FIELDS.contains(&key.as_str()) {
                        match child {
                            Value::String(s) if !s.is_empty() => out.push(s.clone()),
                            Value::Number(n) => out.push(n.to_string()),
                            _ => {}
                        }
                    }
                    walk(child, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}
