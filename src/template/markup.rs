//! Markup stripping and placeholder extraction

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SCRIPT_OR_STYLE: Regex =
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap();
    static ref BLOCK_BREAK: Regex = Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6])\s*/?>").unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref PLACEHOLDER: Regex = Regex::new(r"\[\[\s*([A-Za-z0-9_.\- ]+?)\s*\]\]").unwrap();
}

/// Remove HTML markup, decode basic entities and collapse whitespace
pub fn strip_markup(input: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(input, " ");
    let with_breaks = BLOCK_BREAK.replace_all(&without_scripts, " ");
    let without_tags = TAG.replace_all(&with_breaks, "");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        // Last, so "&amp;lt;" decodes to "&lt;" rather than "<"
        .replace("&amp;", "&")
}

/// Placeholder names (`[[name]]`) in order of first appearance
pub fn extract_variables(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    PLACEHOLDER
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
