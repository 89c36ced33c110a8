//! Statement fingerprinting
//!
//! Structurally identical statements that differ only in literal values collapse
//! to one normalized template and one stable `query_id`.

use super::statement::replace_literals_and_comments;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static POSITIONAL_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d+").unwrap());
static NUMERIC_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?(?:[eE][+-]?\d+)?\b").unwrap());
static PLACEHOLDER_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\?(?:\s*,\s*\?)*\s*\)").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Length of the hex `query_id`
const QUERY_ID_LEN: usize = 16;

/// Replace literals and bind placeholders with `?`, collapse `IN (?, ?, ...)` lists,
/// drop comments and normalize whitespace/case.
pub fn normalize_sql(sql: &str) -> String {
    let result = replace_literals_and_comments(sql, "?");
    let result = POSITIONAL_PARAM.replace_all(&result, "?");
    let result = NUMERIC_LITERAL.replace_all(&result, "?");
    let result = PLACEHOLDER_LIST.replace_all(&result, "(?)");
    let result = WHITESPACE.replace_all(&result, " ");

    result
        .trim()
        .trim_end_matches(';')
        .trim_end()
        .to_uppercase()
}

/// Hex SHA-256 digest of `input`
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Stable id of an already normalized statement
pub fn query_id(normalized: &str) -> String {
    let mut digest = sha256_hex(normalized);
    digest.truncate(QUERY_ID_LEN);
    digest
}

/// Normalize `sql` and return `(query_id, normalized_query)`
pub fn fingerprint(sql: &str) -> (String, String) {
    let normalized = normalize_sql(sql);
    (query_id(&normalized), normalized)
}
