//! Splitting loosely formatted model output into headed sections.
//!
//! Models answer with a mix of markdown headings, bold labels, `LABEL:` prefixes and
//! numbered headings. A line counts as a heading only when it looks like one *and* the
//! caller's classifier recognises its label; everything else is body text.

use std::sync::LazyLock;

use regex::Regex;

static HEADING_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[#*\-•\s]*(\d+[.)]\s*)?[*\s]*").expect("Invalid regex"));
static MARKED_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#|[-•*]?\s*\*\*|\d+[.)]\s)").expect("Invalid regex"));
static ITEM_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d.\-*•)\s]+").expect("Invalid regex"));

const MAX_LABEL_LEN: usize = 60;

/// A run of body lines under one recognised heading
#[derive(Debug, Clone, PartialEq)]
pub struct Section<K> {
    pub kind: Option<K>,
    pub lines: Vec<String>,
}

/// If `line` is shaped like a heading, return its label and any inline content after `:`
pub fn heading_label(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let marked = MARKED_HEADING.is_match(trimmed);
    let stripped = HEADING_MARKERS.replace(trimmed, "");
    let (label, rest, had_colon) = match stripped.split_once(':') {
        Some((label, rest)) => (label, rest, true),
        None => (stripped.as_ref(), "", false),
    };

    let label = label.trim().trim_matches('*').trim();
    let rest = rest.trim().trim_matches('*').trim();
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return None;
    }

    let shouty = label.chars().any(char::is_alphabetic) && !label.chars().any(char::is_lowercase);
    if marked || shouty || had_colon {
        Some((label.to_string(), rest.to_string()))
    } else {
        None
    }
}

/// Group lines into sections, starting a new one at each heading the classifier recognises.
/// Text before the first recognised heading goes into a section with `kind: None`.
pub fn split_sections<K, F>(text: &str, classify: F) -> Vec<Section<K>>
where
    K: Copy,
    F: Fn(&str) -> Option<K>,
{
    let mut sections = vec![Section {
        kind: None,
        lines: Vec::new(),
    }];

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some((label, rest)) = heading_label(trimmed) {
            if let Some(kind) = classify(&label.to_uppercase()) {
                let mut lines = Vec::new();
                if !rest.is_empty() {
                    lines.push(rest);
                }
                sections.push(Section {
                    kind: Some(kind),
                    lines,
                });
                continue;
            }
        }

        if let Some(current) = sections.last_mut() {
            current.lines.push(trimmed.to_string());
        }
    }

    sections
}

/// Body lines of every section of the given kind, in order
pub fn lines_of<K: PartialEq>(sections: &[Section<K>], kind: K) -> Vec<&str> {
    sections
        .iter()
        .filter(|section| section.kind.as_ref() == Some(&kind))
        .flat_map(|section| section.lines.iter().map(String::as_str))
        .collect()
}

/// Strip list numbering, bullets and stray bold markers from a line
pub fn clean_item(line: &str) -> String {
    ITEM_MARKERS
        .replace(line.trim(), "")
        .trim()
        .trim_matches('*')
        .trim()
        .to_string()
}
