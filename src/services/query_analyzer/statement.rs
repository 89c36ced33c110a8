//! Statement text inspection
//!
//! Best-effort pattern matching over SQL text: read-only classification, WHERE /
//! wildcard detection and table/column extraction. This is not a
//! parser; complex statements may be mis-extracted.

use super::AnalyzerError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// Literals and comments in one alternation: whichever starts first wins, so `--` inside
// a literal stays part of the literal and a quote inside a comment stays in the comment.
static LITERAL_OR_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'|--[^\n]*|(?s:/\*.*?\*/)").unwrap());
static WHERE_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").unwrap());
static SELECT_STAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\bSELECT\s+(?:(?:DISTINCT|ALL)\s+)?(?:[\w"]+\.)?\*"#).unwrap()
});
static PROJECTION_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i),\s*(?:[\w"]+\.)?\*\s*(?:,|\bFROM\b)"#).unwrap());
static WRITE_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|MERGE|TRUNCATE|DROP|ALTER|CREATE|GRANT|REVOKE|COPY)\b")
        .unwrap()
});
static SELECT_INTO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bINTO\b").unwrap());
static LOCKING_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bFOR\s+(NO\s+KEY\s+UPDATE|KEY\s+SHARE|UPDATE|SHARE)\b").unwrap());
static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+((?:"?\w+"?\.)?"?\w+"?)(?:\s+(?:AS\s+)?("?\w+"?))?"#)
        .unwrap()
});
static CLAUSE_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(GROUP\s+BY|ORDER\s+BY|LIMIT|OFFSET|HAVING|WINDOW|UNION|INTERSECT|EXCEPT|FOR)\b")
        .unwrap()
});
static COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)((?:"?\w+"?\.)?"?[A-Za-z_]\w*"?)\s*(?:=|<>|!=|<=|>=|<|>|\bNOT\s+LIKE\b|\bLIKE\b|\bILIKE\b|\bNOT\s+IN\b|\bIN\b|\bBETWEEN\b|\bIS\b)"#,
    )
    .unwrap()
});
static ORDER_BY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bORDER\s+BY\b").unwrap());
static ORDER_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(LIMIT|OFFSET|FOR|FETCH)\b").unwrap());

/// Words that can appear before a comparison operator but are never columns
const NON_COLUMN_WORDS: &[&str] = &[
    "AND", "OR", "NOT", "WHERE", "NULL", "TRUE", "FALSE", "EXISTS", "ANY", "ALL", "SOME",
    "CASE", "WHEN", "THEN", "ELSE", "END", "SELECT", "ON", "AS",
];

/// A column referenced in a predicate, with its optional qualifier (alias or table)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub column: String,
}

/// A table referenced in FROM/JOIN, with its optional alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

/// Replace every string literal with `literal` and every comment with a space
pub fn replace_literals_and_comments(sql: &str, literal: &str) -> String {
    LITERAL_OR_COMMENT
        .replace_all(sql, |caps: &Captures| {
            if caps[0].starts_with('\'') { literal } else { " " }
        })
        .into_owned()
}

/// Remove comments and string literal contents; literals become `''`
pub fn strip_comments_and_literals(sql: &str) -> String {
    replace_literals_and_comments(sql, "''")
}

fn unquote(ident: &str) -> String {
    ident.trim_matches('"').to_string()
}

fn first_keyword(text: &str) -> String {
    text.trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .next()
        .unwrap_or("")
        .to_uppercase()
}

/// Refuse anything that is not a single read-only query
pub fn ensure_read_only(sql: &str) -> Result<(), AnalyzerError> {
    let cleaned = strip_comments_and_literals(sql);
    let body = cleaned.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());

    if body.is_empty() {
        return Err(AnalyzerError::UnsupportedStatement("empty statement".to_string()));
    }

    if body.contains(';') {
        return Err(AnalyzerError::UnsupportedStatement(
            "multiple statements are not supported".to_string(),
        ));
    }

    let keyword = first_keyword(body);
    if keyword != "SELECT" && keyword != "WITH" {
        return Err(AnalyzerError::UnsupportedStatement(format!(
            "only SELECT statements can be analyzed, got {}",
            if keyword.is_empty() { "unknown statement" } else { keyword.as_str() }
        )));
    }

    if let Some(m) = WRITE_KEYWORD.find(body) {
        return Err(AnalyzerError::UnsupportedStatement(format!(
            "statement contains a data-modifying clause ({})",
            m.as_str().to_uppercase()
        )));
    }

    if SELECT_INTO.is_match(body) {
        return Err(AnalyzerError::UnsupportedStatement(
            "SELECT ... INTO creates a table".to_string(),
        ));
    }

    if LOCKING_CLAUSE.is_match(body) {
        return Err(AnalyzerError::UnsupportedStatement(
            "locking reads (FOR UPDATE/SHARE) are not supported".to_string(),
        ));
    }

    Ok(())
}

pub fn has_where_clause(sql: &str) -> bool {
    WHERE_KEYWORD.is_match(&strip_comments_and_literals(sql))
}

/// Whether the projection uses a wildcard (`SELECT *`, `SELECT t.*`, `a, *`)
pub fn selects_all_columns(sql: &str) -> bool {
    let cleaned = strip_comments_and_literals(sql);
    SELECT_STAR.is_match(&cleaned) || PROJECTION_STAR.is_match(&cleaned)
}

/// Tables referenced in FROM/JOIN clauses, in order of appearance, deduplicated.
/// Schema qualifiers are dropped.
pub fn extract_tables(sql: &str) -> Vec<TableRef> {
    let cleaned = strip_comments_and_literals(sql);
    let mut tables: Vec<TableRef> = Vec::new();

    for cap in TABLE_REF.captures_iter(&cleaned) {
        let Some(name) = cap.get(1) else { continue };
        let qualified = unquote(name.as_str());
        let table = qualified
            .rsplit('.')
            .next()
            .map(unquote)
            .unwrap_or_else(|| qualified.clone());

        // "FROM (" subqueries and keywords following the name are not tables/aliases
        if NON_COLUMN_WORDS.contains(&table.to_uppercase().as_str()) {
            continue;
        }

        let alias = cap
            .get(2)
            .map(|a| unquote(a.as_str()))
            .filter(|a| !is_clause_keyword(a));

        if !tables.iter().any(|t| t.table.eq_ignore_ascii_case(&table)) {
            tables.push(TableRef { table, alias });
        }
    }

    tables
}

fn is_clause_keyword(word: &str) -> bool {
    matches!(
        word.to_uppercase().as_str(),
        "WHERE" | "JOIN" | "INNER" | "LEFT" | "RIGHT" | "FULL" | "CROSS" | "NATURAL" | "ON"
            | "USING" | "GROUP" | "ORDER" | "LIMIT" | "OFFSET" | "HAVING" | "WINDOW" | "UNION"
            | "INTERSECT" | "EXCEPT" | "FOR" | "FETCH" | "LATERAL"
    )
}

/// Text of the first WHERE clause, up to the next clause keyword
fn where_clause_text(cleaned: &str) -> Option<&str> {
    let start = WHERE_KEYWORD.find(cleaned)?.end();
    let rest = &cleaned[start..];
    let end = CLAUSE_END.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    Some(&rest[..end])
}

fn parse_column_ref(token: &str) -> Option<ColumnRef> {
    let mut parts: Vec<String> = token.split('.').map(unquote).collect();
    let column = parts.pop()?;

    if column.is_empty()
        || column.chars().next().is_some_and(|c| c.is_ascii_digit())
        || NON_COLUMN_WORDS.contains(&column.to_uppercase().as_str())
    {
        return None;
    }

    Some(ColumnRef { qualifier: parts.pop(), column })
}

fn push_unique(columns: &mut Vec<ColumnRef>, col: ColumnRef) {
    if !columns
        .iter()
        .any(|c| c.column.eq_ignore_ascii_case(&col.column) && c.qualifier == col.qualifier)
    {
        columns.push(col);
    }
}

/// Columns used on the left side of WHERE-clause comparisons
pub fn extract_where_columns(sql: &str) -> Vec<ColumnRef> {
    let cleaned = strip_comments_and_literals(sql);
    let Some(clause) = where_clause_text(&cleaned) else {
        return Vec::new();
    };

    let mut columns = Vec::new();
    for cap in COMPARISON.captures_iter(clause) {
        if let Some(col) = cap.get(1).and_then(|m| parse_column_ref(m.as_str())) {
            push_unique(&mut columns, col);
        }
    }
    columns
}

/// Plain column references from the ORDER BY clause (expressions are skipped)
pub fn extract_order_by_columns(sql: &str) -> Vec<ColumnRef> {
    let cleaned = strip_comments_and_literals(sql);
    let Some(m) = ORDER_BY.find(&cleaned) else {
        return Vec::new();
    };
    let rest = &cleaned[m.end()..];
    let end = ORDER_END.find(rest).map(|m| m.start()).unwrap_or(rest.len());

    let mut columns = Vec::new();
    for item in rest[..end].split(',') {
        let token = item.split_whitespace().next().unwrap_or("");
        if token.contains('(') {
            continue;
        }
        if let Some(col) = parse_column_ref(token) {
            push_unique(&mut columns, col);
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_accepts_selects() {
        assert!(ensure_read_only("SELECT * FROM users").is_ok());
        assert!(ensure_read_only("  select id from users where id = 1;  ").is_ok());
        assert!(ensure_read_only("WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
        assert!(ensure_read_only("(SELECT 1) UNION (SELECT 2)").is_ok());
        assert!(ensure_read_only("SELECT 'DELETE FROM x; --' AS s").is_ok());
        assert!(ensure_read_only("-- list users\nSELECT * FROM users").is_ok());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        for sql in [
            "DELETE FROM users",
            "UPDATE users SET name = 'x'",
            "INSERT INTO users VALUES (1)",
            "DROP TABLE users",
            "WITH d AS (DELETE FROM users RETURNING *) SELECT * FROM d",
            "SELECT * INTO backup FROM users",
            "SELECT * FROM users FOR UPDATE",
            "SELECT 1; SELECT 2",
            "",
            "EXPLAIN SELECT 1",
        ] {
            assert!(
                matches!(ensure_read_only(sql), Err(AnalyzerError::UnsupportedStatement(_))),
                "expected rejection for {:?}",
                sql
            );
        }
    }

    #[test]
    fn test_comment_markers_inside_literals() {
        assert!(ensure_read_only("SELECT id FROM notes WHERE body = '/* draft */'").is_ok());
        assert!(ensure_read_only("SELECT id FROM notes WHERE body LIKE '%--%'").is_ok());
        assert!(ensure_read_only("SELECT 'a;b' AS s, id FROM notes").is_ok());
        assert!(ensure_read_only("SELECT id /* it's fine */ FROM notes").is_ok());

        for sql in [
            "SELECT '/*'; DELETE FROM users; SELECT '*/'",
            "SELECT '--'; DROP TABLE users",
            "SELECT 'x' -- ok\n; UPDATE users SET admin = true",
        ] {
            assert!(
                matches!(ensure_read_only(sql), Err(AnalyzerError::UnsupportedStatement(_))),
                "expected rejection for {:?}",
                sql
            );
        }

        assert!(has_where_clause("SELECT * FROM users WHERE note = '--' AND id = 1"));
        assert_eq!(
            strip_comments_and_literals("SELECT '/*' /* c */, 'it''s'"),
            "SELECT ''  , ''"
        );
    }

    #[test]
    fn test_where_detection_ignores_literals() {
        assert!(has_where_clause("SELECT * FROM users WHERE id = 1"));
        assert!(!has_where_clause("SELECT * FROM users"));
        assert!(!has_where_clause("SELECT 'where' FROM users"));
        assert!(!has_where_clause("SELECT * FROM users -- where id = 1"));
    }

    #[test]
    fn test_select_star_detection() {
        assert!(selects_all_columns("SELECT * FROM users"));
        assert!(selects_all_columns("select distinct * from users"));
        assert!(selects_all_columns("SELECT u.* FROM users u"));
        assert!(selects_all_columns("SELECT id, * FROM users"));
        assert!(selects_all_columns("select id, * from users"));
        assert!(selects_all_columns("select id, u.* from users u"));
        assert!(!selects_all_columns("SELECT COUNT(*) FROM users"));
        assert!(!selects_all_columns("SELECT id, name FROM users"));
    }

    #[test]
    fn test_extract_tables_with_aliases() {
        let tables = extract_tables(
            "SELECT o.id FROM public.orders o JOIN users AS u ON u.id = o.user_id WHERE o.total > 10",
        );
        assert_eq!(
            tables,
            vec![
                TableRef { table: "orders".to_string(), alias: Some("o".to_string()) },
                TableRef { table: "users".to_string(), alias: Some("u".to_string()) },
            ]
        );

        let tables = extract_tables("SELECT * FROM users WHERE id = 1");
        assert_eq!(tables, vec![TableRef { table: "users".to_string(), alias: None }]);
    }

    #[test]
    fn test_extract_where_columns() {
        let cols = extract_where_columns(
            "SELECT * FROM users u WHERE u.email = 'a@b.c' AND status IN ('x') AND age >= 18 ORDER BY created_at",
        );
        let names: Vec<&str> = cols.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(names, vec!["email", "status", "age"]);
        assert_eq!(cols[0].qualifier.as_deref(), Some("u"));
        assert_eq!(cols[1].qualifier, None);
    }

    #[test]
    fn test_extract_where_columns_skips_placeholders_and_numbers() {
        let cols = extract_where_columns("SELECT * FROM t WHERE 1 = 1 AND id = $1 AND NOT deleted IS NULL");
        let names: Vec<&str> = cols.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(names, vec!["id", "deleted"]);
    }

    #[test]
    fn test_extract_order_by_columns() {
        let cols = extract_order_by_columns("SELECT * FROM events ORDER BY created_at DESC, lower(name) LIMIT 10");
        assert_eq!(cols, vec![ColumnRef { qualifier: None, column: "created_at".to_string() }]);
    }
}
