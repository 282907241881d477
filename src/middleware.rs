//! Actix-Web middleware feeding the capture pipeline
//!
//! Hooks into the request/response lifecycle, snapshots each exchange and
//! passes it to [`CaptureOrchestrator::capture_async`]. It never changes what
//! the client receives: bodies are buffered and replayed byte for byte, and
//! errors from inner services are returned unchanged.

use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::HeaderMap,
    Error,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use crate::decision::{is_excluded_path, should_capture};
use crate::dispatch::CaptureOrchestrator;
use crate::event::{ExchangeError, ExchangeSnapshot};
use crate::request_body::capture_request_body;
use crate::response_body::capture_response_body;

/// Error capture middleware for Actix-Web
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use actix_web::{web, App, HttpResponse, HttpServer};
/// use errorwatch_actix::{CaptureOrchestrator, ErrorWatchMiddleware};
///
/// #[actix_web::main]
/// async fn main() -> std::io::Result<()> {
///     let orchestrator = Arc::new(CaptureOrchestrator::from_env());
///
///     HttpServer::new(move || {
///         App::new()
///             .wrap(ErrorWatchMiddleware::new(orchestrator.clone()))
///             .route("/", web::get().to(|| async { HttpResponse::Ok().finish() }))
///     })
///     .bind("0.0.0.0:8080")?
///     .run()
///     .await
/// }
/// ```
#[derive(Clone)]
pub struct ErrorWatchMiddleware {
    orchestrator: Arc<CaptureOrchestrator>,
}

impl ErrorWatchMiddleware {
    pub fn new(orchestrator: Arc<CaptureOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ErrorWatchMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = ErrorWatchService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ErrorWatchService {
            service: Rc::new(service),
            orchestrator: self.orchestrator.clone(),
        })
    }
}

/// The actual service that handles each request
pub struct ErrorWatchService<S> {
    service: Rc<S>,
    orchestrator: Arc<CaptureOrchestrator>,
}

impl<S, B> Service<ServiceRequest> for ErrorWatchService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let capture = &self.orchestrator.config().capture;

        // Nothing from these requests can ever be captured.
        if !capture.enabled || is_excluded_path(req.path(), &capture.excluded_paths) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_boxed_body()) });
        }

        let service = self.service.clone();
        let orchestrator = self.orchestrator.clone();

        Box::pin(async move {
            let start = Instant::now();
            let capture = &orchestrator.config().capture;

            let request_body = if capture.include_request_body {
                capture_request_body(&mut req, capture.max_body_size).await
            } else {
                None
            };

            let mut snapshot = request_snapshot(&req);
            snapshot.request_body = request_body;

            match service.call(req).await {
                Ok(res) => {
                    let status = res.status().as_u16();
                    if !should_capture(status, &snapshot.path, capture) {
                        return Ok(res.map_into_boxed_body());
                    }

                    snapshot.status_code = status;
                    snapshot.duration_ms = Some(elapsed_ms(start));
                    snapshot.error = res.response().error().map(actix_error);
                    snapshot.response_headers = header_pairs(res.headers());

                    let res = if capture.include_response_body {
                        let (res, body) = capture_response_body(res).await;
                        snapshot.response_body = body;
                        res
                    } else {
                        res.map_into_boxed_body()
                    };

                    orchestrator.capture_async(snapshot);
                    Ok(res)
                }
                Err(err) => {
                    snapshot.status_code = err.as_response_error().status_code().as_u16();
                    snapshot.duration_ms = Some(elapsed_ms(start));
                    snapshot.error = Some(actix_error(&err));

                    orchestrator.capture_async(snapshot);
                    Err(err)
                }
            }
        })
    }
}

/// Request-side fields of the snapshot; status and response come later
fn request_snapshot(req: &ServiceRequest) -> ExchangeSnapshot {
    let (scheme, host) = {
        let info = req.connection_info();
        (info.scheme().to_string(), info.host().to_string())
    };
    let (server_name, server_port) = split_host(&host, &scheme);

    ExchangeSnapshot {
        method: req.method().to_string(),
        path: req.path().to_string(),
        query_string: Some(req.query_string().to_string()).filter(|q| !q.is_empty()),
        request_headers: header_pairs(req.headers()),
        remote_addr: req.peer_addr().map(|addr| addr.ip().to_string()),
        protocol: Some(format!("{:?}", req.version())),
        scheme: Some(scheme),
        server_name: Some(server_name),
        server_port,
        ..Default::default()
    }
}

/// Header values that are not visible ASCII are left out
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn split_host(host: &str, scheme: &str) -> (String, Option<u16>) {
    let default_port = match scheme {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    };

    match host.rsplit_once(':') {
        // Bare IPv6 literals contain colons but no port.
        Some((name, port)) if !name.contains(':') || name.ends_with(']') => match port.parse() {
            Ok(port) => (name.to_string(), Some(port)),
            Err(_) => (host.to_string(), default_port),
        },
        _ => (host.to_string(), default_port),
    }
}

fn actix_error(err: &Error) -> ExchangeError {
    ExchangeError::new("actix_web::Error", Some(err.to_string()), format!("{err:?}"))
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, Config};
    use crate::error::CaptureError;
    use crate::event::ErrorEvent;
    use crate::sink::ErrorSink;
    use actix_web::{error, test, web, App, HttpResponse};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ErrorEvent>>,
    }

    #[async_trait::async_trait]
    impl ErrorSink for RecordingSink {
        async fn publish(&self, event: &ErrorEvent) -> Result<(), CaptureError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn publish_batch(&self, events: &[ErrorEvent]) -> Result<(), CaptureError> {
            self.events.lock().unwrap().extend_from_slice(events);
            Ok(())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn orchestrator(capture: CaptureConfig, sink: Arc<RecordingSink>) -> Arc<CaptureOrchestrator> {
        let config = Config {
            application_name: "users-api".to_string(),
            capture,
            ..Default::default()
        };
        Arc::new(CaptureOrchestrator::new(config, sink))
    }

    async fn echo_failure(body: String) -> HttpResponse {
        HttpResponse::InternalServerError()
            .content_type("application/json")
            .body(format!(r#"{{"error":"Internal error","echo":{body}}}"#))
    }

    async fn failing_handler() -> Result<HttpResponse, Error> {
        Err(error::ErrorServiceUnavailable("database unavailable"))
    }

    #[actix_rt::test]
    async fn test_captures_server_error_with_bodies() {
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(CaptureConfig::default(), sink.clone());

        let app = test::init_service(
            App::new()
                .wrap(ErrorWatchMiddleware::new(orchestrator.clone()))
                .route("/api/users", web::post().to(echo_failure)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/users?dry_run=true")
            .insert_header(("content-type", "application/json"))
            .insert_header(("authorization", "Bearer secret"))
            .insert_header(("x-forwarded-for", "192.168.1.100, 10.0.0.1"))
            .insert_header(("user-agent", "integration-test"))
            .set_payload(r#"{"name":"test"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status().as_u16(), 500);
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], br#"{"error":"Internal error","echo":{"name":"test"}}"#);

        assert!(orchestrator.shutdown(Duration::from_secs(5)).await);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.method(), "POST");
        assert_eq!(event.path(), "/api/users");
        assert_eq!(event.status_code(), 500);
        assert_eq!(event.request_body(), Some(r#"{"name":"test"}"#));
        assert_eq!(
            event.response_body(),
            Some(r#"{"error":"Internal error","echo":{"name":"test"}}"#)
        );
        assert_eq!(event.remote_address(), Some("192.168.1.100"));
        assert_eq!(event.user_agent(), Some("integration-test"));
        assert!(event.request_headers().contains_key("content-type"));
        assert!(!event.request_headers().contains_key("authorization"));
        assert_eq!(event.additional_data()["queryString"], "dry_run=true");
        assert!(event.duration().is_some());
    }

    #[actix_rt::test]
    async fn test_captures_handler_error() {
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(CaptureConfig::default(), sink.clone());

        let app = test::init_service(
            App::new()
                .wrap(ErrorWatchMiddleware::new(orchestrator.clone()))
                .route("/api/orders", web::get().to(failing_handler)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/orders").to_request()).await;
        assert_eq!(resp.status().as_u16(), 503);

        assert!(orchestrator.shutdown(Duration::from_secs(5)).await);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status_code(), 503);
        assert_eq!(events[0].error_message(), Some("database unavailable"));
        assert!(events[0].stack_trace().is_some());
        assert_eq!(events[0].additional_data()["exceptionClass"], "actix_web::Error");
    }

    #[actix_rt::test]
    async fn test_successful_and_excluded_requests_are_not_captured() {
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(CaptureConfig::default(), sink.clone());

        let app = test::init_service(
            App::new()
                .wrap(ErrorWatchMiddleware::new(orchestrator.clone()))
                .route("/ok", web::get().to(|| async { HttpResponse::Ok().body("fine") }))
                .route(
                    "/health/deep",
                    web::get().to(|| async { HttpResponse::ServiceUnavailable().finish() }),
                ),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ok").to_request()).await;
        assert!(resp.status().is_success());
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health/deep").to_request()).await;
        assert_eq!(resp.status().as_u16(), 503);

        assert!(orchestrator.shutdown(Duration::from_secs(5)).await);
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_disabled_capture_passes_through() {
        let sink = Arc::new(RecordingSink::default());
        let orchestrator = orchestrator(CaptureConfig::disabled(), sink.clone());

        let app = test::init_service(
            App::new()
                .wrap(ErrorWatchMiddleware::new(orchestrator.clone()))
                .route("/boom", web::get().to(|| async { HttpResponse::InternalServerError().finish() })),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/boom").to_request()).await;
        assert_eq!(resp.status().as_u16(), 500);

        assert!(orchestrator.shutdown(Duration::from_secs(5)).await);
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_not_found_captured_only_when_configured() {
        let sink = Arc::new(RecordingSink::default());
        let capture = CaptureConfig {
            status_codes: HashSet::from([500]),
            ..Default::default()
        };
        let orchestrator = orchestrator(capture, sink.clone());

        let app = test::init_service(App::new().wrap(ErrorWatchMiddleware::new(orchestrator.clone()))).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/missing").to_request()).await;
        assert_eq!(resp.status().as_u16(), 404);

        assert!(orchestrator.shutdown(Duration::from_secs(5)).await);
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[::core::prelude::v1::test]
    fn test_split_host() {
        assert_eq!(split_host("example.com:8080", "http"), ("example.com".to_string(), Some(8080)));
        assert_eq!(split_host("example.com", "https"), ("example.com".to_string(), Some(443)));
        assert_eq!(split_host("[::1]:3000", "http"), ("[::1]".to_string(), Some(3000)));
        assert_eq!(split_host("::1", "http"), ("::1".to_string(), Some(80)));
    }
}
