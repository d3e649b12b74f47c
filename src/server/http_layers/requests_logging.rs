//! Request logging middleware

use super::super::state::ServerState;
use crate::server::metrics::record_http_request;
use axum::extract::{MatchedPath, State};
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, Request, Response},
    middleware::Next,
    response::IntoResponse,
};
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

const MAX_LOGGABLE_BODY_LENGTH: usize = 1024;

/// Header values never written to the log.
const REDACTED_HEADERS: [HeaderName; 3] = [
    header::AUTHORIZATION,
    header::COOKIE,
    header::SET_COOKIE,
];

/// Routes whose bodies carry OAuth tokens.
const UNLOGGED_BODY_PREFIX: &str = "/v1/accounts";

/// Size of a body worth logging, or why it is skipped.
fn loggable_body_size(headers: &HeaderMap) -> Result<usize, String> {
    let size = headers
        .get(header::CONTENT_LENGTH)
        .ok_or_else(|| "Content-length not set.".to_string())?
        .to_str()
        .map_err(|_| "Unreadable Content-length.".to_string())?
        .parse::<usize>()
        .map_err(|_| "Unparsable Content-length.".to_string())?;
    if size >= MAX_LOGGABLE_BODY_LENGTH {
        return Err(format!("Too big to log ({:#})", byte_unit::Byte::from(size)));
    }
    Ok(size)
}

fn log_headers(direction: &str, headers: &HeaderMap) {
    info!("  {} Headers:", direction);
    for (name, value) in headers.iter() {
        if REDACTED_HEADERS.contains(name) {
            info!("    {:?}: <redacted>", name);
        } else {
            info!("    {:?}: {:?}", name, value);
        }
    }
}

/// Reads the whole body for logging. The caller rebuilds the message from the bytes.
async fn buffer_body(direction: &str, body: Body, size: usize) -> Option<Bytes> {
    match axum::body::to_bytes(body, size).await {
        Ok(bytes) => {
            info!("  {} Body:\n{}", direction, String::from_utf8_lossy(&bytes));
            Some(bytes)
        }
        Err(err) => {
            error!("Failed to read {} body: {:?}", direction.to_lowercase(), err);
            None
        }
    }
}

fn internal_error() -> Response<Body> {
    let mut response = Response::new(Body::from("Internal Server Error"));
    *response.status_mut() = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
    response
}

pub async fn log_requests(
    State(state): State<ServerState>,
    mut request: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let level = state.config.requests_logging_level.clone();
    let start = Instant::now();

    let method = request.method().to_string();
    // Route templates keep the metric label set bounded.
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let log_bodies =
        level >= RequestsLoggingLevel::Body && !path.starts_with(UNLOGGED_BODY_PREFIX);

    if level > RequestsLoggingLevel::None {
        // The path only: query strings may carry user ids.
        info!(">>> {} {}", method, request.uri().path());
    }
    if level >= RequestsLoggingLevel::Headers {
        log_headers("Req", request.headers());
    }
    if log_bodies {
        match loggable_body_size(request.headers()) {
            Err(reason) => info!("  Req Body: {}", reason),
            Ok(size) => {
                let (parts, body) = request.into_parts();
                let Some(bytes) = buffer_body("Req", body, size).await else {
                    return internal_error();
                };
                request = Request::from_parts(parts, Body::from(bytes));
            }
        }
    }

    let mut response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        log_headers("Resp", response.headers());
    }
    if log_bodies {
        match loggable_body_size(response.headers()) {
            Err(reason) => info!("  Resp Body: {}", reason),
            Ok(size) => {
                let (parts, body) = response.into_parts();
                let Some(bytes) = buffer_body("Resp", body, size).await else {
                    return internal_error();
                };
                response = Response::from_parts(parts, Body::from(bytes));
            }
        }
    }

    let status = response.status().as_u16();
    let duration = start.elapsed();
    if level > RequestsLoggingLevel::None {
        info!("<<< {} {} ({}ms)", status, path, duration.as_millis());
    }
    record_http_request(&method, &path, status, duration);

    response
}
