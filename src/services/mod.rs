pub mod auth_service;
pub mod metrics_service;
pub mod stats_service;
