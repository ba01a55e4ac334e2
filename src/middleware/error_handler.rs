use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};

const MAX_LOGGED_BODY: usize = 16 * 1024;

/// Logs 5xx answers with the first 16 KiB of their body, and timeouts /
/// quota exhaustion as warnings. The response itself goes out unchanged.
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    let status = response.status();

    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        warn!("{} {} answered {}", method, uri, status);
        return response;
    }

    if !status.is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            error!("{} {} answered {}, body unreadable: {}", method, uri, status, e);
            parts.headers.remove(axum::http::header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let logged = &bytes[..bytes.len().min(MAX_LOGGED_BODY)];
    error!(
        "{} {} answered {} - body ({} bytes): {}",
        method,
        uri,
        status,
        bytes.len(),
        String::from_utf8_lossy(logged)
    );

    // body is rebuilt from the buffered bytes
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
