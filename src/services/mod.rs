pub mod dashboard_service;
pub mod performance_monitor;
pub mod pg_client;
pub mod plan_retriever;
pub mod query_analyzer;
pub mod query_cache;
pub mod statistics;

pub use dashboard_service::DashboardService;
pub use performance_monitor::{PerformanceMonitor, start_performance_monitor};
pub use pg_client::{PgClient, QueryExecutor};
pub use plan_retriever::{PgPlanRetriever, PlanRetrievalError, PlanRetriever};
pub use query_analyzer::{AnalyzerError, QueryAnalyzer};
pub use query_cache::{CacheError, QueryCache};
pub use statistics::{PgStatisticsSource, StatisticsError, StatisticsSource};
