// Database Statistics Source
// Purpose: Read-only access to engine catalog statistics (connections, buffer cache,
// index and table usage). Every read is best-effort telemetry.

use crate::models::{ConnectionPoolSnapshot, IndexUsage, TableActivity};
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("statistic '{statistic}' unavailable: {message}")]
    Unavailable { statistic: &'static str, message: String },
}

impl StatisticsError {
    pub fn unavailable(statistic: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable { statistic, message: err.to_string() }
    }

    pub fn statistic(&self) -> &'static str {
        match self {
            Self::Unavailable { statistic, .. } => *statistic,
        }
    }
}

pub type StatisticsResult<T> = Result<T, StatisticsError>;

#[async_trait]
pub trait StatisticsSource: Send + Sync {
    /// Number of backends currently executing a statement
    async fn active_connections(&self) -> StatisticsResult<i64>;

    /// Buffer cache hit ratio in [0, 1]
    async fn cache_hit_ratio(&self) -> StatisticsResult<f64>;

    /// Indexes with the most scans, busiest first
    async fn top_indexes(&self, limit: i64) -> StatisticsResult<Vec<IndexUsage>>;

    /// Tables ranked by combined read + write activity, busiest first
    async fn table_activity(&self, limit: i64) -> StatisticsResult<Vec<TableActivity>>;

    async fn connection_pool(&self) -> StatisticsResult<ConnectionPoolSnapshot>;
}

const ACTIVE_CONNECTIONS_SQL: &str =
    "SELECT count(*)::bigint FROM pg_stat_activity WHERE state = 'active'";

const CACHE_HIT_RATIO_SQL: &str = r#"
    SELECT COALESCE(
        sum(blks_hit)::float8 / NULLIF(sum(blks_hit) + sum(blks_read), 0)::float8,
        0
    )::float8
    FROM pg_stat_database
"#;

const TOP_INDEXES_SQL: &str = r#"
    SELECT
        schemaname::text,
        relname::text,
        indexrelname::text,
        COALESCE(idx_scan, 0)::bigint,
        COALESCE(idx_tup_read, 0)::bigint
    FROM pg_stat_user_indexes
    ORDER BY idx_scan DESC NULLS LAST
    LIMIT $1
"#;

const TABLE_ACTIVITY_SQL: &str = r#"
    SELECT
        schemaname::text,
        relname::text,
        (COALESCE(seq_scan, 0) + COALESCE(idx_scan, 0))::bigint AS reads,
        (COALESCE(n_tup_ins, 0) + COALESCE(n_tup_upd, 0) + COALESCE(n_tup_del, 0))::bigint AS writes,
        pg_total_relation_size(relid)::bigint AS size_bytes
    FROM pg_stat_user_tables
    ORDER BY COALESCE(seq_scan, 0) + COALESCE(idx_scan, 0)
        + COALESCE(n_tup_ins, 0) + COALESCE(n_tup_upd, 0) + COALESCE(n_tup_del, 0) DESC
    LIMIT $1
"#;

const CONNECTION_POOL_SQL: &str = r#"
    SELECT
        count(*)::bigint,
        (count(*) FILTER (WHERE state = 'active'))::bigint,
        (count(*) FILTER (WHERE state LIKE 'idle%'))::bigint,
        (count(*) FILTER (WHERE wait_event_type = 'Lock'))::bigint
    FROM pg_stat_activity
    WHERE datname = current_database()
"#;

pub struct PgStatisticsSource {
    pool: PgPool,
}

impl PgStatisticsSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatisticsSource for PgStatisticsSource {
    async fn active_connections(&self) -> StatisticsResult<i64> {
        sqlx::query_scalar::<_, i64>(ACTIVE_CONNECTIONS_SQL)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StatisticsError::unavailable("active_connections", e))
    }

    async fn cache_hit_ratio(&self) -> StatisticsResult<f64> {
        sqlx::query_scalar::<_, f64>(CACHE_HIT_RATIO_SQL)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StatisticsError::unavailable("cache_hit_ratio", e))
    }

    async fn top_indexes(&self, limit: i64) -> StatisticsResult<Vec<IndexUsage>> {
        let rows = sqlx::query_as::<_, (String, String, String, i64, i64)>(TOP_INDEXES_SQL)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StatisticsError::unavailable("top_indexes", e))?;

        Ok(rows
            .into_iter()
            .map(|(schema_name, table_name, index_name, reads, tuples_read)| IndexUsage {
                schema_name,
                table_name,
                index_name,
                reads,
                tuples_read,
            })
            .collect())
    }

    async fn table_activity(&self, limit: i64) -> StatisticsResult<Vec<TableActivity>> {
        let rows = sqlx::query_as::<_, (String, String, i64, i64, i64)>(TABLE_ACTIVITY_SQL)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StatisticsError::unavailable("table_activity", e))?;

        Ok(rows
            .into_iter()
            .map(|(schema_name, table_name, reads, writes, size_bytes)| TableActivity {
                schema_name,
                table_name,
                reads,
                writes,
                total_activity: reads + writes,
                size_bytes,
            })
            .collect())
    }

    async fn connection_pool(&self) -> StatisticsResult<ConnectionPoolSnapshot> {
        let (total, active, idle, waiting) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(CONNECTION_POOL_SQL)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StatisticsError::unavailable("connection_pool", e))?;

        Ok(ConnectionPoolSnapshot {
            total_connections: total,
            active_connections: active,
            idle_connections: idle,
            waiting_requests: waiting,
        })
    }
}
