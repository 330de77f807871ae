//! Middleware for logging requests and responses.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use crate::trigger::API_KEY_HEADER;

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If the response body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is
/// truncated and logged at the `debug` level. The scheduler's API key header
/// is redacted before logging.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (headers, body_text) = extract_header_and_body_text_from_request(request).await;

    log_request(&redact_api_key(&headers), &body_text);

    let request = Request::from_parts(headers, body_text.into());
    let response = next.run(request).await;

    let (headers, body_text) = extract_header_and_body_text_from_response(response).await;
    log_response(&headers, &body_text);

    Response::from_parts(headers, body_text.into())
}

/// Replace the API key header's value with asterisks for display.
fn redact_api_key(headers: &axum::http::request::Parts) -> axum::http::request::Parts {
    let mut display_headers = headers.clone();

    if display_headers.headers.contains_key(API_KEY_HEADER) {
        display_headers
            .headers
            .insert(API_KEY_HEADER, HeaderValue::from_static("********"));
    }

    display_headers
}

async fn extract_header_and_body_text_from_request(
    request: Request,
) -> (axum::http::request::Parts, String) {
    let (headers, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();

    (headers, String::from_utf8_lossy(&body_bytes).to_string())
}

async fn extract_header_and_body_text_from_response(
    response: Response,
) -> (axum::http::response::Parts, String) {
    let (headers, body) = response.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();

    (headers, String::from_utf8_lossy(&body_bytes).to_string())
}

const LOG_BODY_LENGTH_LIMIT: usize = 64;

fn log_request(headers: &axum::http::request::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Received request: {headers:#?}\nbody: {:}...",
            &body[..LOG_BODY_LENGTH_LIMIT]
        );
        tracing::debug!("Full request body: {body:?}");
    } else {
        tracing::info!("Received request: {headers:#?}\nbody: {body:?}");
    }
}

fn log_response(headers: &axum::http::response::Parts, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Sending response: {headers:#?}\nbody: {:}...",
            &body[..LOG_BODY_LENGTH_LIMIT]
        );
        tracing::debug!("Full response body: {body:?}");
    } else {
        tracing::info!("Sending response: {headers:#?}\nbody: {body:?}");
    }
}

#[cfg(test)]
mod redact_tests {
    use axum::{body::Body, extract::Request};

    use crate::{logging::redact_api_key, trigger::API_KEY_HEADER};

    #[test]
    fn api_key_header_is_redacted_for_display() {
        let request = Request::builder()
            .uri("/api/recurring/run")
            .header(API_KEY_HEADER, "hunter2")
            .body(Body::empty())
            .unwrap();
        let (parts, _) = request.into_parts();

        let display_parts = redact_api_key(&parts);

        assert_eq!(
            display_parts.headers.get(API_KEY_HEADER).unwrap(),
            "********"
        );
        // The original is untouched; only the logged copy changes.
        assert_eq!(parts.headers.get(API_KEY_HEADER).unwrap(), "hunter2");
    }

    #[test]
    fn requests_without_the_header_pass_through() {
        let request = Request::builder()
            .uri("/api/recurring/run")
            .body(Body::empty())
            .unwrap();
        let (parts, _) = request.into_parts();

        let display_parts = redact_api_key(&parts);

        assert!(!display_parts.headers.contains_key(API_KEY_HEADER));
    }
}
