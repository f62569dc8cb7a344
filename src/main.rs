use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coderev_platform::cache::ResultCache;
use coderev_platform::config::AppConfig;
use coderev_platform::controllers;
use coderev_platform::dlq::dlq_controller;
use coderev_platform::dlq::dlq_repository::DlqRepository;
use coderev_platform::dlq::dlq_service::DlqService;
use coderev_platform::reviews::job_repository::JobRepository;
use coderev_platform::reviews::review_controller;
use coderev_platform::reviews::review_service::ReviewService;
use coderev_platform::services::metrics_service::MetricsService;
use coderev_platform::services::stats_service::StatsService;
use coderev_platform::workers::{RedisQueue, WorkerConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_config = AppConfig::from_env()?;
    // Queue names and redrive policy are shared with the worker process.
    let worker_config = WorkerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&app_config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let client = redis::Client::open(&app_config.redis_url[..])?;
    let connection_manager = ConnectionManager::new(client).await?;

    let queue = RedisQueue::from_connection(connection_manager.clone(), &worker_config);
    let jobs = JobRepository::new(pool.clone());
    let cache = ResultCache::new(
        connection_manager.clone(),
        app_config.cache_ttl_seconds,
        app_config.cache_key_prefix.clone(),
    );
    let stats = StatsService::new(connection_manager, queue.clone(), jobs.clone());
    let metrics = MetricsService::new(app_config.statsd_addr.as_deref(), "coderev");

    let review_service = ReviewService::new(
        jobs.clone(),
        cache,
        queue.clone(),
        stats.clone(),
        metrics,
        app_config.max_content_bytes,
    );
    let dlq_service = DlqService::new(DlqRepository::new(pool.clone()), jobs, queue);

    let bind = (app_config.bind_host.clone(), app_config.bind_port);
    info!("API listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(app_config.clone()))
            .app_data(web::Data::new(review_service.clone()))
            .app_data(web::Data::new(dlq_service.clone()))
            .app_data(web::Data::new(stats.clone()))
            .service(review_controller::submit)
            .service(review_controller::status)
            .service(review_controller::history)
            // Literal /dlq/stats must be registered ahead of /dlq/{id}
            .service(dlq_controller::stats)
            .service(dlq_controller::list)
            .service(dlq_controller::get)
            .service(dlq_controller::retry)
            .service(dlq_controller::resolve)
            .service(controllers::health::health)
            .service(controllers::health::stats)
            .service(controllers::auth::register)
            .service(controllers::auth::login)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
