//! Response body capture for the error capture middleware
//!
//! Only runs for responses that are going to be captured. The body is
//! buffered in full and the response rebuilt from the same bytes, so the
//! client sees exactly what the handler produced.

use actix_web::{
    body::{to_bytes, BoxBody, MessageBody},
    dev::ServiceResponse,
    http::header::CONTENT_TYPE,
};

use crate::policy::is_text_content_type;

/// Buffer a text response body and return it alongside the rebuilt response
///
/// Binary or untyped responses pass through untouched with no capture.
pub async fn capture_response_body<B>(res: ServiceResponse<B>) -> (ServiceResponse<BoxBody>, Option<String>)
where
    B: MessageBody + 'static,
{
    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if !is_text_content_type(content_type) {
        return (res.map_into_boxed_body(), None);
    }

    let (req, res) = res.into_parts();
    let (head, body) = res.into_parts();

    match to_bytes(body).await {
        Ok(bytes) => {
            let captured = (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned());
            let res = head.set_body(bytes).map_into_boxed_body();
            (ServiceResponse::new(req, res), captured)
        }
        Err(e) => {
            let e: Box<dyn std::error::Error> = e.into();
            tracing::warn!(error = %e, "failed to buffer response body for error capture");
            let res = head.set_body(()).map_into_boxed_body();
            (ServiceResponse::new(req, res), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, HttpResponse};

    fn service_response(res: HttpResponse) -> ServiceResponse {
        ServiceResponse::new(test::TestRequest::default().to_http_request(), res)
    }

    #[actix_rt::test]
    async fn test_captures_json_response() {
        let res = service_response(
            HttpResponse::InternalServerError()
                .content_type("application/json")
                .body(r#"{"error":"Internal error"}"#),
        );

        let (res, captured) = capture_response_body(res).await;

        assert_eq!(captured.as_deref(), Some(r#"{"error":"Internal error"}"#));
        assert_eq!(res.status().as_u16(), 500);
        let body = test::read_body(res).await;
        assert_eq!(&body[..], br#"{"error":"Internal error"}"#);
    }

    #[actix_rt::test]
    async fn test_skips_binary_response() {
        let res = service_response(
            HttpResponse::BadRequest()
                .content_type("application/octet-stream")
                .body(vec![0u8, 1, 2]),
        );

        let (res, captured) = capture_response_body(res).await;

        assert_eq!(captured, None);
        assert_eq!(test::read_body(res).await.len(), 3);
    }

    #[actix_rt::test]
    async fn test_skips_missing_content_type() {
        let res = service_response(HttpResponse::NotFound().finish());

        let (_, captured) = capture_response_body(res).await;
        assert_eq!(captured, None);
    }

    #[actix_rt::test]
    async fn test_empty_text_body_is_absent() {
        let res = service_response(HttpResponse::NotFound().content_type("text/plain").finish());

        let (res, captured) = capture_response_body(res).await;
        assert_eq!(captured, None);
        assert_eq!(res.status().as_u16(), 404);
    }
}
