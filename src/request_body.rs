//! Request body capture for the error capture middleware
//!
//! Buffers the start of a text payload and hands the handler an identical
//! stream: the buffered bytes followed by whatever was not read.

use actix_web::{
    dev::{Payload, ServiceRequest},
    error::PayloadError,
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    web::{Bytes, BytesMut},
    HttpMessage,
};
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;

use crate::policy::is_text_content_type;

/// Worst-case UTF-8 width, used to turn a character budget into a byte cap
const MAX_UTF8_WIDTH: usize = 4;

/// Capture up to `max_chars` worth of a text request body
///
/// Returns `None` for binary or missing content types, empty bodies and
/// bodies whose declared length is over four times the budget; those are
/// left unread. Bodies without a declared length are read up to the byte cap.
/// Read errors are passed on to the handler untouched.
pub async fn capture_request_body(req: &mut ServiceRequest, max_chars: usize) -> Option<String> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if !is_text_content_type(content_type) {
        return None;
    }

    let declared_len = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<usize>().ok());
    if let Some(len) = declared_len.filter(|len| *len > max_chars.saturating_mul(MAX_UTF8_WIDTH)) {
        tracing::debug!(declared_len = len, max_chars, "request body too large for error capture");
        return None;
    }

    // One character past the budget so truncation can still be detected.
    let byte_cap = max_chars.saturating_add(1).saturating_mul(MAX_UTF8_WIDTH);

    let mut payload = req.take_payload();
    let mut buffer = BytesMut::new();
    let mut replay: Vec<Result<Bytes, PayloadError>> = Vec::new();

    while buffer.len() < byte_cap {
        match payload.next().await {
            Some(Ok(chunk)) => {
                buffer.extend_from_slice(&chunk);
                replay.push(Ok(chunk));
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, "request body read failed during error capture");
                replay.push(Err(e));
                break;
            }
            None => break,
        }
    }

    restore_payload(req, replay, payload);

    if buffer.is_empty() {
        return None;
    }
    let end = buffer.len().min(byte_cap);
    Some(String::from_utf8_lossy(&buffer[..end]).into_owned())
}

/// Put the consumed chunks back in front of the unread remainder
fn restore_payload(req: &mut ServiceRequest, replay: Vec<Result<Bytes, PayloadError>>, rest: Payload) {
    let stream = stream::iter(replay).chain(rest);
    let payload: Pin<Box<dyn Stream<Item = Result<Bytes, PayloadError>>>> = Box::pin(stream);
    req.set_payload(Payload::Stream { payload });
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::header::HeaderValue, test::TestRequest};

    async fn read_all(req: &mut ServiceRequest) -> Bytes {
        let mut payload = req.take_payload();
        let mut body = BytesMut::new();
        while let Some(chunk) = payload.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        body.freeze()
    }

    #[actix_rt::test]
    async fn test_captures_json_and_preserves_payload() {
        let mut req = TestRequest::post()
            .uri("/api/users")
            .insert_header((CONTENT_TYPE, "application/json"))
            .set_payload(r#"{"name":"test"}"#)
            .to_srv_request();

        let captured = capture_request_body(&mut req, 1024).await;
        assert_eq!(captured.as_deref(), Some(r#"{"name":"test"}"#));

        let body = read_all(&mut req).await;
        assert_eq!(&body[..], br#"{"name":"test"}"#);
    }

    #[actix_rt::test]
    async fn test_undeclared_large_body_is_capped_but_fully_replayed() {
        let mut req = TestRequest::post()
            .uri("/upload")
            .insert_header((CONTENT_TYPE, "text/plain"))
            .to_srv_request();
        req.headers_mut().remove(CONTENT_LENGTH);
        let chunks: Vec<Result<Bytes, PayloadError>> =
            (0..10).map(|_| Ok(Bytes::from("a".repeat(1_000)))).collect();
        let payload: Pin<Box<dyn Stream<Item = Result<Bytes, PayloadError>>>> = Box::pin(stream::iter(chunks));
        req.set_payload(Payload::Stream { payload });

        let captured = capture_request_body(&mut req, 10).await.unwrap();
        assert_eq!(captured.len(), 44);

        let body = read_all(&mut req).await;
        assert_eq!(body.len(), 10_000);
    }

    #[actix_rt::test]
    async fn test_oversized_declared_length_is_not_read() {
        let payload = "a".repeat(10_000);
        let mut req = TestRequest::post()
            .uri("/upload")
            .insert_header((CONTENT_TYPE, "application/json"))
            .set_payload(payload.clone())
            .to_srv_request();
        req.headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from_static("10000"));

        assert_eq!(capture_request_body(&mut req, 10).await, None);

        let body = read_all(&mut req).await;
        assert_eq!(&body[..], payload.as_bytes());
    }

    #[actix_rt::test]
    async fn test_declared_length_within_budget_is_captured() {
        let mut req = TestRequest::post()
            .uri("/api/users")
            .insert_header((CONTENT_TYPE, "application/json"))
            .set_payload(r#"{"id":1}"#)
            .to_srv_request();
        req.headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from_static("8"));

        assert_eq!(capture_request_body(&mut req, 2).await.as_deref(), Some(r#"{"id":1}"#));
        assert_eq!(read_all(&mut req).await.len(), 8);
    }

    #[actix_rt::test]
    async fn test_skips_binary_payloads() {
        let mut req = TestRequest::post()
            .uri("/upload")
            .insert_header((CONTENT_TYPE, "image/png"))
            .set_payload(vec![0x89, 0x50, 0x4e, 0x47])
            .to_srv_request();

        assert_eq!(capture_request_body(&mut req, 1024).await, None);
        assert_eq!(read_all(&mut req).await.len(), 4);
    }

    #[actix_rt::test]
    async fn test_skips_missing_content_type() {
        let mut req = TestRequest::post()
            .uri("/upload")
            .set_payload("plain")
            .to_srv_request();

        assert_eq!(capture_request_body(&mut req, 1024).await, None);
    }

    #[actix_rt::test]
    async fn test_empty_body_is_absent() {
        let mut req = TestRequest::get()
            .uri("/")
            .insert_header((CONTENT_TYPE, "application/json"))
            .to_srv_request();

        assert_eq!(capture_request_body(&mut req, 1024).await, None);
    }
}
