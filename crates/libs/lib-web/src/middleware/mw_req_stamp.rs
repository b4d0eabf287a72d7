//! # Request Stamping Middleware
//!
//! Tags each HTTP request with an id that shows up in its trace span and in
//! the `X-Request-ID` response header.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct RequestStamp {
    pub id: String,
}

impl RequestStamp {
    /// Reuse a caller-supplied id (from a proxy) when present.
    fn for_request(req: &Request) -> Self {
        let id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && v.len() <= 64)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self { id }
    }
}

pub async fn stamp_req(mut req: Request, next: Next) -> Response {
    let stamp = RequestStamp::for_request(&req);
    req.extensions_mut().insert(stamp.clone());

    let mut res = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&stamp.id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}
