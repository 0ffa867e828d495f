//! Expression reference extraction
//!
//! Mapping expressions read columns (`this.name`), metadata
//! (`meta("key")`), and environment variables (`${VAR}`), and may write
//! new columns (`root.field = ...`). This module extracts those
//! references with shallow pattern matching. It deliberately does not
//! parse the mapping language into an AST: the extraction here is
//! lexical, and capturing only the first path segment after `this.` is
//! intentional (the first segment is the column; the rest is structure
//! inside the column value).
//!
//! All functions are pure. Malformed expressions produce fewer or no
//! matches, never errors.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static COLUMN_DOTTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bthis\.([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex pattern"));

static COLUMN_BRACKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bthis\[\s*(?:"([^"]+)"|'([^']+)')\s*\]"#).expect("Invalid regex pattern")
});

static META_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bmeta\(\s*(?:"([^"]+)"|'([^']+)')\s*\)"#).expect("Invalid regex pattern")
});

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("Invalid regex pattern"));

static OUTPUT_ASSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\broot\.([A-Za-z_][A-Za-z0-9_]*)(?:\.[A-Za-z0-9_]+)*\s*=(?:[^=]|$)")
        .expect("Invalid regex pattern")
});

/// References extracted from a single expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionAnalysis {
    /// Columns the expression reads (`this.<col>`, `this["col"]`)
    pub referenced_columns: BTreeSet<String>,

    /// Metadata keys the expression reads (`meta("key")`)
    pub metadata_keys: BTreeSet<String>,

    /// Environment variables the expression reads (`${VAR}`)
    pub env_vars: BTreeSet<String>,

    /// Columns the expression writes (`root.<col> = ...`)
    pub produced_columns: BTreeSet<String>,
}

/// Run all extractors over an expression.
pub fn analyze(text: &str) -> ExpressionAnalysis {
    let stripped = strip_comments(text);
    ExpressionAnalysis {
        referenced_columns: extract_column_references(&stripped),
        metadata_keys: extract_metadata_references(&stripped),
        env_vars: extract_env_var_references(&stripped),
        produced_columns: extract_output_assignments(&stripped),
    }
}

/// Remove `#` and `//` comments, preserving line structure.
///
/// A comment marker only counts outside single- or double-quoted runs.
/// A backslash escapes the following character and is itself consumed,
/// so `"\""` does not close the string and `\#` inside a string stays.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(strip_line(line).trim_end());
    }
    out
}

fn strip_line(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match (c, quote) {
            (b'\\', _) => {
                // Escape consumes the next byte, even inside quotes.
                i += 1;
            }
            (b'\'', None) | (b'"', None) => quote = Some(c),
            (b'\'', Some(b'\'')) | (b'"', Some(b'"')) => quote = None,
            (b'#', None) => return &line[..i],
            (b'/', None) if bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

/// Columns read via `this.<ident>` or `this["key"]` / `this['key']`.
///
/// Dotted access captures only the first path segment: `this.user.name`
/// yields `user`. Bracket access captures the literal key.
pub fn extract_column_references(text: &str) -> BTreeSet<String> {
    let stripped = strip_comments(text);
    let mut columns = BTreeSet::new();
    for caps in COLUMN_DOTTED.captures_iter(&stripped) {
        columns.insert(caps[1].to_string());
    }
    for caps in COLUMN_BRACKET.captures_iter(&stripped) {
        if let Some(key) = caps.get(1).or_else(|| caps.get(2)) {
            columns.insert(key.as_str().to_string());
        }
    }
    columns
}

/// Metadata keys read via `meta("key")` / `meta('key')`.
pub fn extract_metadata_references(text: &str) -> BTreeSet<String> {
    let stripped = strip_comments(text);
    META_CALL
        .captures_iter(&stripped)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Environment variables read via `${VAR}`.
pub fn extract_env_var_references(text: &str) -> BTreeSet<String> {
    let stripped = strip_comments(text);
    ENV_VAR
        .captures_iter(&stripped)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Columns written via top-level `root.<ident> = ...` assignments.
///
/// Only the first path segment after `root.` is captured; `root.a.b = 1`
/// produces column `a`. `==` comparisons are not assignments.
pub fn extract_output_assignments(text: &str) -> BTreeSet<String> {
    let stripped = strip_comments(text);
    OUTPUT_ASSIGN
        .captures_iter(&stripped)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// A static expression reads no columns and never needs schema checks.
pub fn is_static(text: &str) -> bool {
    extract_column_references(text).is_empty()
}
