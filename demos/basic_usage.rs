//! Basic usage example for ErrorWatch Actix
//!
//! Run with:
//! ```bash
//! ERRORWATCH_APPLICATION_NAME=demo-app \
//! ERRORWATCH_QUEUE_URL=http://localhost:9324/000000000000/errors.fifo \
//! RUST_LOG=errorwatch_actix=debug \
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use actix_web::{error, web, App, HttpResponse, HttpServer};
use errorwatch_actix::{health::health_handler, CaptureOrchestrator, ErrorWatchMiddleware};
use tracing_subscriber::EnvFilter;

async fn index() -> HttpResponse {
    HttpResponse::Ok().body("Hello ErrorWatch!")
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "example-app"
    }))
}

async fn create_user(body: String) -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "Internal error",
        "received": body
    }))
}

async fn database() -> Result<HttpResponse, actix_web::Error> {
    Err(error::ErrorServiceUnavailable("database unavailable"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let orchestrator = Arc::new(CaptureOrchestrator::from_env());

    tracing::info!("starting example server on http://0.0.0.0:8080");
    tracing::info!("try: GET /, GET /health, POST /api/users, GET /api/db, GET /errorwatch/health");

    let app_orchestrator = orchestrator.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(ErrorWatchMiddleware::new(app_orchestrator.clone()))
            .app_data(web::Data::from(app_orchestrator.clone()))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/health").route(web::get().to(health)))
            .service(web::resource("/api/users").route(web::post().to(create_user)))
            .service(web::resource("/api/db").route(web::get().to(database)))
            .service(web::resource("/errorwatch/health").route(web::get().to(health_handler)))
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await?;

    let drained = orchestrator.close().await;
    tracing::info!(drained, stats = ?orchestrator.stats(), "shut down");
    Ok(())
}
