//! Similarity Service - similar-user lookups over course platform activity
//!
//! Port: 8083

use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::info;
use user_similarity::server::{configure_routes, AppState};
use user_similarity::{load_event_tables, SimilarityConfig, SimilarityService};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = SimilarityConfig::load()?;
    let bind_addr = config.bind_addr();

    info!(
        algorithm = %config.neighbors.index_algorithm,
        distance_exponent = config.neighbors.distance_exponent,
        k = config.neighbors.k,
        "Starting Similarity Service"
    );

    let datasets = config.datasets.clone();
    let neighbors = config.neighbors.clone();
    let service = web::block(move || {
        let tables = load_event_tables(&datasets)?;
        SimilarityService::build(&tables, neighbors)
    })
    .await
    .map_err(|e| anyhow::anyhow!("Initial index build task failed: {}", e))??;

    let state = web::Data::new(AppState {
        service: Arc::new(service),
        datasets: config.datasets.clone(),
    });

    info!("Similarity Service listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure_routes)
            .wrap(actix_web::middleware::Logger::default())
    })
    .workers(config.server.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }))
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
