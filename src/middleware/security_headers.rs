//! HTTP security headers middleware
//!
//! Adds standard security headers to every response, including the installer
//! pages, to protect against clickjacking, MIME sniffing, and technology
//! disclosure.

use axum::{extract::Request, middleware::Next, response::Response};
use http::HeaderValue;

/// Middleware that injects HTTP security headers into every response.
///
/// Headers applied:
/// - `X-Frame-Options: DENY` — prevents clickjacking
/// - `X-Content-Type-Options: nosniff` — prevents MIME-type sniffing
/// - `Referrer-Policy: strict-origin-when-cross-origin` — limits referrer info
/// - `Server` and `X-Powered-By` are removed — no technology disclosure
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.remove("server");
    headers.remove("x-powered-by");

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn dummy_handler() -> &'static str {
        "ok"
    }

    fn test_app() -> Router {
        Router::new()
            .route("/test", get(dummy_handler))
            .layer(middleware::from_fn(security_headers))
    }

    #[tokio::test]
    async fn test_x_frame_options_deny() {
        let app = test_app();
        let response = app
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn test_nosniff_and_referrer_policy() {
        let app = test_app();
        let response = app
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(
            response.headers().get("referrer-policy").unwrap(),
            "strict-origin-when-cross-origin"
        );
    }

    #[tokio::test]
    async fn test_no_technology_disclosure() {
        let app = test_app();
        let response = app
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().get("server").is_none());
        assert!(response.headers().get("x-powered-by").is_none());
    }
}
