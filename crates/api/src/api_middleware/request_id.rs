//! Request ID middleware: extracts an id from the usual tracing headers or
//! generates one, and echoes it on the response for client-side correlation.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = extract_or_generate(&request);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn extract_or_generate(request: &Request) -> String {
    for header in [REQUEST_ID_HEADER, "x-correlation-id", "x-trace-id"] {
        if let Some(id) = request
            .headers()
            .get(header)
            .and_then(|v| v.to_str().ok())
            .filter(|id| is_valid(id))
        {
            return id.to_string();
        }
    }
    Uuid::new_v4().to_string()
}

fn is_valid(id: &str) -> bool {
    (8..=128).contains(&id.len())
        && id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    #[test]
    fn existing_id_is_preserved() {
        let request = HttpRequest::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, "trace-12345678")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_or_generate(&request), "trace-12345678");
    }

    #[test]
    fn invalid_id_is_replaced() {
        let request = HttpRequest::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, "bad id!")
            .body(Body::empty())
            .unwrap();
        let id = extract_or_generate(&request);
        assert_ne!(id, "bad id!");
        assert!(is_valid(&id));
    }
}
