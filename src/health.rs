//! Liveness route for the error event destination

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::dispatch::CaptureOrchestrator;

/// Reports whether captured errors can currently be delivered
///
/// Register with the orchestrator as app data:
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use actix_web::{web, App};
/// # use errorwatch_actix::{health::health_handler, CaptureOrchestrator};
/// # fn app(orchestrator: Arc<CaptureOrchestrator>) {
/// App::new()
///     .app_data(web::Data::from(orchestrator))
///     .route("/health/errorwatch", web::get().to(health_handler));
/// # }
/// ```
pub async fn health_handler(orchestrator: web::Data<CaptureOrchestrator>) -> HttpResponse {
    if orchestrator.health_check().await {
        HttpResponse::Ok().json(json!({ "status": "UP" }))
    } else {
        HttpResponse::ServiceUnavailable().json(json!({ "status": "DOWN" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::CaptureError;
    use crate::event::ErrorEvent;
    use crate::sink::ErrorSink;
    use actix_web::{test, App};
    use std::sync::Arc;

    struct FixedHealthSink(bool);

    #[async_trait::async_trait]
    impl ErrorSink for FixedHealthSink {
        async fn publish(&self, _event: &ErrorEvent) -> Result<(), CaptureError> {
            Ok(())
        }

        async fn publish_batch(&self, _events: &[ErrorEvent]) -> Result<(), CaptureError> {
            Ok(())
        }

        async fn health_check(&self) -> bool {
            self.0
        }
    }

    async fn status_for(healthy: bool) -> (u16, serde_json::Value) {
        let orchestrator = Arc::new(CaptureOrchestrator::new(
            Config::default(),
            Arc::new(FixedHealthSink(healthy)),
        ));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(orchestrator))
                .route("/health/errorwatch", web::get().to(health_handler)),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/health/errorwatch").to_request(),
        )
        .await;
        let status = resp.status().as_u16();
        let body: serde_json::Value = test::read_body_json(resp).await;
        (status, body)
    }

    #[actix_rt::test]
    async fn test_reports_up() {
        let (status, body) = status_for(true).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "UP");
    }

    #[actix_rt::test]
    async fn test_reports_down() {
        let (status, body) = status_for(false).await;
        assert_eq!(status, 503);
        assert_eq!(body["status"], "DOWN");
    }
}
