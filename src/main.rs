use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use querylens::config::Config;
use querylens::db;
use querylens::models;
use querylens::services::{
    DashboardService, PerformanceMonitor, PgClient, PgPlanRetriever, PgStatisticsSource,
    QueryAnalyzer, QueryCache, StatisticsSource, start_performance_monitor,
};
use querylens::{AppState, handlers};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Dashboard
        handlers::dashboard::get_performance_summary,
        handlers::dashboard::get_slow_queries,
        handlers::dashboard::get_connection_pool_metrics,
        handlers::dashboard::get_cache_stats,
        handlers::dashboard::get_top_tables,
        handlers::dashboard::get_query_analysis,
        handlers::dashboard::get_monitor_report,
        // Queries
        handlers::queries::analyze_query,
        // Cache
        handlers::cache::invalidate_cache,
    ),
    components(
        schemas(
            models::ExecutionPlanNode,
            models::SuggestionKind,
            models::Priority,
            models::OptimizationSuggestion,
            models::IndexType,
            models::IndexRecommendation,
            models::QueryAnalysisResult,
            models::QueryPerformanceMetrics,
            models::QueryAnalysisDetail,
            models::AnalyzeQueryRequest,
            models::CacheStats,
            models::ConnectionPoolSnapshot,
            models::IndexUsage,
            models::TableActivity,
            models::SlowQuerySummary,
            models::PerformanceSummary,
            models::DatabaseStatistics,
            models::SlowQueryWarning,
            models::MonitorReport,
            models::InvalidateCacheRequest,
            models::InvalidateCacheResponse,
            querylens::utils::error::ErrorResponse,
        )
    ),
    tags(
        (name = "Dashboard", description = "Performance dashboard aggregates"),
        (name = "Queries", description = "Query plan analysis"),
        (name = "Cache", description = "Query result cache management"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // APP_* overrides may come from a .env file
    dotenvy::dotenv().ok();

    // Load configuration first
    let config = Config::load()?;

    // Initialize logging
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);

    let registry = tracing_subscriber::registry().with(log_filter);

    // The guard must outlive the server or buffered file output is lost
    let mut _log_guard = None;
    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("querylens.log");
        // Rolling appender adds its own date suffix
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _log_guard = Some(guard);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    tracing::info!("QueryLens starting up");
    tracing::info!("Configuration loaded successfully");

    let pool = db::create_pool(&config.database.url, config.database.max_connections).await?;

    // Initialize core components
    let retriever = Arc::new(PgPlanRetriever::new(pool.clone(), config.analyzer.include_analyze));
    let statistics: Arc<dyn StatisticsSource> = Arc::new(PgStatisticsSource::new(pool.clone()));

    let analyzer = Arc::new(QueryAnalyzer::new(retriever, &config.analyzer));

    let query_cache = Arc::new(
        QueryCache::new(
            Arc::new(PgClient::from_pool(pool.clone())),
            config.cache.max_entries,
            Duration::from_secs(config.cache.default_ttl_secs),
        )
        .with_analyzer(Arc::clone(&analyzer)),
    );

    let monitor = Arc::new(
        PerformanceMonitor::new(
            Arc::clone(&analyzer),
            Arc::clone(&statistics),
            config.monitor.top_n,
        )
        .with_cache(Arc::clone(&query_cache)),
    );

    let dashboard_service = Arc::new(
        DashboardService::new(Arc::clone(&analyzer), Arc::clone(&query_cache), statistics)
            .with_monitor(Arc::clone(&monitor)),
    );

    let app_state = Arc::new(AppState {
        analyzer: Arc::clone(&analyzer),
        query_cache: Arc::clone(&query_cache),
        dashboard_service,
    });

    // Start the performance monitor (configurable interval)
    let monitor_handle = if config.monitor.enabled {
        Some(start_performance_monitor(Arc::clone(&monitor), config.monitor.interval_secs))
    } else {
        tracing::warn!("Performance monitor disabled by configuration");
        None
    };

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(handlers::api_routes(app_state))
        .merge(health_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);
    tracing::info!("QueryLens is ready to serve requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = monitor_handle {
        handle.shutdown();
    }
    pool.close().await;
    tracing::info!("QueryLens stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check() -> &'static str {
    "READY"
}
