//! Query Cache
//!
//! Process-local, bounded, TTL-based LRU cache for read results.
//!
//! - Capacity overflow evicts the least recently used entry
//! - Expired entries are treated as absent on lookup and removed lazily,
//!   or eagerly by `purge_expired`
//! - The lock covers only the map and counters, never a database round-trip;
//!   results are committed after the fetch completes, so a failed or dropped
//!   fetch leaves nothing behind

use crate::models::CacheStats;
use crate::services::pg_client::QueryExecutor;
use crate::services::query_analyzer::fingerprint::sha256_hex;
use crate::services::query_analyzer::{AnalyzerError, QueryAnalyzer, statement};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Prefix of keys produced by `execute_with_cache`
pub const QUERY_KEY_PREFIX: &str = "query:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("query execution failed: {0}")]
    Execution(#[from] sqlx::Error),

    #[error("statement refused: {0}")]
    UnsupportedStatement(#[from] AnalyzerError),

    #[error("failed to serialize cache key parameters: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    /// Live value for `key`; an expired entry is dropped and counted as an eviction
    fn lookup(&mut self, key: &str, now: Instant) -> Option<serde_json::Value> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.pop(key);
            self.evictions += 1;
        }
        None
    }

    fn insert(&mut self, key: String, entry: CacheEntry) {
        if let Some((evicted_key, _)) = self.entries.push(key.clone(), entry)
            && evicted_key != key
        {
            self.evictions += 1;
            tracing::debug!("Cache full, evicted least recently used key {}", short_key(&evicted_key));
        }
    }
}

/// Keys may embed statement text; logs only carry a prefix
fn short_key(key: &str) -> &str {
    let end = key.char_indices().nth(24).map(|(i, _)| i).unwrap_or(key.len());
    &key[..end]
}

/// Collapse whitespace outside string literals and drop a trailing `;`.
/// Literal values are kept so statements that differ only in a constant get
/// different keys.
fn normalize_statement_text(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_literal = false;
    let mut pending_space = false;

    for c in sql.trim().trim_end_matches(';').trim_end().chars() {
        if in_literal {
            out.push(c);
            if c == '\'' {
                in_literal = false;
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        if c == '\'' {
            in_literal = true;
        }
        out.push(c);
    }

    out
}

/// Cache key of a statement and its bound parameters
pub fn cache_key(sql: &str, params: &[serde_json::Value]) -> Result<String, CacheError> {
    let params = serde_json::to_string(params)?;
    let material = format!("{}\n{}", normalize_statement_text(sql), params);
    Ok(format!("{}{}", QUERY_KEY_PREFIX, sha256_hex(&material)))
}

/// Compile a glob pattern (`*` any run, `?` one character) into an anchored regex
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr).ok()
}

pub struct QueryCache {
    state: Mutex<CacheState>,
    executor: Arc<dyn QueryExecutor>,
    analyzer: Option<Arc<QueryAnalyzer>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl QueryCache {
    pub fn new(executor: Arc<dyn QueryExecutor>, max_entries: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            executor,
            analyzer: None,
            default_ttl,
            max_entries: capacity.get(),
        }
    }

    /// Report execution times of cache misses to the analyzer's history
    pub fn with_analyzer(mut self, analyzer: Arc<QueryAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached result of `query` with `params`, executing it on a miss.
    ///
    /// `ttl` defaults to the configured TTL. Only single read-only statements are
    /// accepted. Execution errors propagate and are never cached.
    pub async fn execute_with_cache(
        &self,
        query: &str,
        params: &[serde_json::Value],
        ttl: Option<Duration>,
    ) -> Result<serde_json::Value, CacheError> {
        statement::ensure_read_only(query)?;
        let key = cache_key(query, params)?;

        {
            let mut state = self.state();
            if let Some(value) = state.lookup(&key, Instant::now()) {
                state.hits += 1;
                tracing::debug!("Cache hit for {}", short_key(&key));
                return Ok(value);
            }
            state.misses += 1;
        }

        tracing::debug!("Cache miss for {}, executing", short_key(&key));
        let start = Instant::now();
        let value = self.executor.execute(query, params).await.map_err(|e| {
            tracing::warn!("Query for cache key {} failed: {}", short_key(&key), e);
            e
        })?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Some(analyzer) = &self.analyzer {
            analyzer.record_execution(query, elapsed_ms);
        }

        let entry = CacheEntry {
            value: value.clone(),
            inserted_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.state().insert(key, entry);

        Ok(value)
    }

    /// Store an arbitrary value under an explicit key
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.state().insert(key.into(), entry);
    }

    /// Look up an explicit key. Counts as a hit or miss.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut state = self.state();
        let value = state.lookup(key, Instant::now());
        if value.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        value
    }

    /// Remove every entry whose key matches the glob `pattern`. Returns the count removed.
    pub fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let Some(matcher) = glob_to_regex(pattern) else {
            tracing::warn!("Ignoring invalid cache invalidation pattern");
            return 0;
        };

        let mut state = self.state();
        let matching: Vec<String> = state
            .entries
            .iter()
            .filter(|(k, _)| matcher.is_match(k))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &matching {
            state.entries.pop(key);
        }

        tracing::info!("Invalidated {} cache entries matching '{}'", matching.len(), pattern);
        matching.len()
    }

    /// Drop every expired entry now. Returns the count removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            state.entries.pop(key);
        }
        state.evictions += expired.len() as u64;

        if !expired.is_empty() {
            tracing::debug!("Purged {} expired cache entries", expired.len());
        }
        expired.len()
    }

    /// Remove all entries; counters are kept
    pub fn clear(&self) {
        self.state().entries.clear();
        tracing::info!("Query cache cleared");
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            size: state.entries.len(),
            max_entries: self.max_entries,
            hit_rate: CacheStats::compute_hit_rate(state.hits, state.misses),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        async fn execute(
            &self,
            sql: &str,
            params: &[serde_json::Value],
        ) -> Result<serde_json::Value, sqlx::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if sql.contains("broken") {
                return Err(sqlx::Error::RowNotFound);
            }
            Ok(json!([{ "sql": sql, "params": params }]))
        }
    }

    fn cache(capacity: usize) -> (QueryCache, Arc<CountingExecutor>) {
        let executor = Arc::new(CountingExecutor::default());
        (QueryCache::new(executor.clone(), capacity, Duration::from_secs(300)), executor)
    }

    #[test]
    fn test_set_get_and_ttl_expiry() {
        let (cache, _) = cache(10);
        cache.set("k", json!(1), Some(Duration::from_millis(40)));
        assert_eq!(cache.get("k"), Some(json!(1)));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("k"), None);

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_capacity_overflow_evicts_least_recently_used() {
        let (cache, _) = cache(3);
        cache.set("a", json!("a"), None);
        cache.set("b", json!("b"), None);
        cache.set("c", json!("c"), None);
        // touch "a" so "b" becomes least recently used
        assert!(cache.get("a").is_some());
        cache.set("d", json!("d"), None);

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        let stats = cache.get_stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 3);
    }

    #[test]
    fn test_overwrite_is_not_an_eviction() {
        let (cache, _) = cache(2);
        cache.set("a", json!(1), None);
        cache.set("a", json!(2), None);
        assert_eq!(cache.get("a"), Some(json!(2)));
        assert_eq!(cache.get_stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_same_query_twice_executes_once() {
        let (cache, executor) = cache(10);
        let params = [json!(42)];
        let first = cache
            .execute_with_cache("SELECT * FROM t WHERE id = $1", &params, None)
            .await
            .unwrap();
        let second = cache
            .execute_with_cache("SELECT * FROM t WHERE id = $1", &params, None)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        let stats = cache.get_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_whitespace_differences_share_a_key() {
        let (cache, executor) = cache(10);
        cache.execute_with_cache("SELECT * FROM t WHERE id = 1", &[], None).await.unwrap();
        cache.execute_with_cache("  SELECT *\n  FROM t WHERE id = 1;", &[], None).await.unwrap();
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_params_and_literals_separate_keys() {
        let (cache, executor) = cache(10);
        cache.execute_with_cache("SELECT $1", &[json!(1)], None).await.unwrap();
        cache.execute_with_cache("SELECT $1", &[json!(2)], None).await.unwrap();
        cache.execute_with_cache("SELECT 'a  b'", &[], None).await.unwrap();
        cache.execute_with_cache("SELECT 'a b'", &[], None).await.unwrap();
        assert_eq!(executor.calls.load(Ordering::SeqCst), 4);
        assert_eq!(cache.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_execution_is_not_cached() {
        let (cache, executor) = cache(10);
        for _ in 0..2 {
            let err = cache.execute_with_cache("SELECT broken", &[], None).await.unwrap_err();
            assert!(matches!(err, CacheError::Execution(_)));
        }
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.get_stats().misses, 2);
    }

    #[tokio::test]
    async fn test_writes_are_refused_before_execution() {
        let (cache, executor) = cache(10);
        for sql in ["DELETE FROM t", "SELECT 1; DROP TABLE t", "SELECT '/*'; UPDATE t SET x = 1; SELECT '*/'"] {
            let err = cache.execute_with_cache(sql, &[], None).await.unwrap_err();
            assert!(matches!(err, CacheError::UnsupportedStatement(_)), "accepted: {}", sql);
        }
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.get_stats().misses, 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_by_pattern() {
        let (cache, _) = cache(10);
        cache.execute_with_cache("SELECT 1", &[], None).await.unwrap();
        cache.execute_with_cache("SELECT 2", &[], None).await.unwrap();
        cache.set("user:1", json!("a"), None);
        cache.set("user:2", json!("b"), None);
        cache.set("user:10", json!("c"), None);

        assert_eq!(cache.invalidate_by_pattern("user:?"), 2);
        assert_eq!(cache.get("user:10"), Some(json!("c")));
        assert_eq!(cache.invalidate_by_pattern("query:*"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate_by_pattern("nothing[here]"), 0);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let (cache, _) = cache(10);
        cache.set("a", json!(1), None);
        cache.get("a");
        cache.get("missing");
        cache.clear();

        let stats = cache.get_stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_purge_expired_counts_evictions() {
        let (cache, _) = cache(10);
        cache.set("short", json!(1), Some(Duration::from_millis(10)));
        cache.set("long", json!(2), None);
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_stats().evictions, 1);
    }

    #[test]
    fn test_normalize_statement_text() {
        assert_eq!(normalize_statement_text("  SELECT  a,\n b FROM t ; "), "SELECT a, b FROM t");
        assert_eq!(normalize_statement_text("SELECT 'x   y'"), "SELECT 'x   y'");
    }

    #[test]
    fn test_glob_matching() {
        let re = glob_to_regex("query:*").unwrap();
        assert!(re.is_match("query:abc"));
        assert!(!re.is_match("xquery:abc"));
        let re = glob_to_regex("a.b?").unwrap();
        assert!(re.is_match("a.bc"));
        assert!(!re.is_match("axbc"));
    }
}
