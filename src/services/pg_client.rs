use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::QueryScalar;

/// Executes a read statement and returns its rows as a JSON array.
///
/// This is the boundary the query cache goes through on a miss.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<serde_json::Value, sqlx::Error>;
}

/// Thin wrapper around the PostgreSQL pool used by every read this service issues
#[derive(Clone)]
pub struct PgClient {
    pool: PgPool,
}

impl PgClient {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute a statement and return all rows as a JSON array of objects.
    ///
    /// The statement is wrapped in `json_agg` so the engine does the row encoding;
    /// `$n` placeholders in `sql` are bound from `params` in order. It runs in a
    /// read-only transaction that is always rolled back.
    pub async fn query_json(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<serde_json::Value, sqlx::Error> {
        let statement = sql.trim().trim_end_matches(';');
        let wrapped = format!(
            "SELECT COALESCE(json_agg(row_to_json(q)), '[]'::json) FROM ({}) AS q",
            statement
        );

        let start = std::time::Instant::now();
        let mut query = sqlx::query_scalar::<_, serde_json::Value>(&wrapped);
        for param in params {
            query = bind_json_param(query, param);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
        let rows = query.fetch_one(&mut *tx).await.map_err(|e| {
            tracing::error!("PostgreSQL query execution failed: {}", e);
            e
        })?;
        tx.rollback().await?;

        tracing::debug!(
            "Query returned {} rows in {}ms",
            rows.as_array().map(|a| a.len()).unwrap_or(0),
            start.elapsed().as_millis()
        );

        Ok(rows)
    }
}

#[async_trait]
impl QueryExecutor for PgClient {
    async fn execute(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<serde_json::Value, sqlx::Error> {
        self.query_json(sql, params).await
    }
}

/// Bind a JSON parameter using the closest native PostgreSQL type
fn bind_json_param<'q>(
    query: QueryScalar<'q, Postgres, serde_json::Value, PgArguments>,
    param: &serde_json::Value,
) -> QueryScalar<'q, Postgres, serde_json::Value, PgArguments> {
    match param {
        serde_json::Value::Null => query.bind(Option::<String>::None),
        serde_json::Value::Bool(b) => query.bind(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        },
        serde_json::Value::String(s) => query.bind(s.clone()),
        other => query.bind(sqlx::types::Json(other.clone())),
    }
}
