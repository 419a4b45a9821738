use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Echoes the client's `x-request-id` or assigns a fresh UUID, on both request and response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let value = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let Some(value) = value else {
        return next.run(req).await;
    };

    req.headers_mut().insert(REQUEST_ID_HEADER.clone(), value.clone());

    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    response
}
