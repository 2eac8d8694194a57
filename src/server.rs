//! HTTP interface for the counter.
//!
//! `GET /` records one request and replies with the number of requests seen
//! within the window.

use crate::counter::Counter;
use crate::state::Tally;

use chrono::{DateTime, SecondsFormat, Utc};
use dropshot::endpoint;
use dropshot::{Body, HttpError, RequestContext};
use http::{header, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{event, Level};

/// Source of request timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system's wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Server-wide state shared with every request handler.
pub struct ServerContext {
    counter: Arc<Counter>,
    clock: Box<dyn Clock>,
}

impl ServerContext {
    pub fn new(counter: Arc<Counter>) -> Self {
        Self::with_clock(counter, SystemClock)
    }

    pub fn with_clock<C: Clock>(counter: Arc<Counter>, clock: C) -> Self {
        Self {
            counter,
            clock: Box::new(clock),
        }
    }
}

/// Describes the HTTP API served for a counter.
pub fn api() -> dropshot::ApiDescription<ServerContext> {
    let mut api = dropshot::ApiDescription::new();
    api.register(get_request_count)
        .expect("registering `get_request_count` should succeed");
    api
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CountBody {
    timestamp: String,
    request_count: u64,
}

impl From<&Tally> for CountBody {
    fn from(tally: &Tally) -> Self {
        Self {
            timestamp: tally.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            request_count: tally.total,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_msg: String,
}

fn json_response(status: StatusCode, bytes: Vec<u8>) -> Result<Response<Body>, HttpError> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Body::with_content(bytes))
        .map_err(|e| HttpError::for_internal_error(e.to_string()))
}

fn error_response(status: StatusCode, message: String) -> Result<Response<Body>, HttpError> {
    let bytes = serde_json::to_vec(&ErrorBody { error_msg: message })
        .map_err(|e| HttpError::for_internal_error(e.to_string()))?;
    json_response(status, bytes)
}

fn count_response(tally: &Tally) -> Result<Response<Body>, HttpError> {
    match serde_json::to_vec(&CountBody::from(tally)) {
        Ok(bytes) => json_response(StatusCode::OK, bytes),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

const REQUEST_ID_HEADER: &str = "x-request-id";

// The request id a client supplied, if any. Logged next to dropshot's own id
// so a client can correlate its requests with ours.
fn client_request_id(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
}

#[endpoint {
    method = GET,
    path = "/",
}]
async fn get_request_count(
    rqctx: RequestContext<ServerContext>,
) -> Result<Response<Body>, HttpError> {
    let context = rqctx.context();
    let precision = &context.counter.policy().precision;
    let at = precision.truncate(context.clock.now());
    let client_request_id = client_request_id(rqctx.request.headers());

    match context.counter.record(at).await {
        Ok(tally) => {
            event!(
                Level::DEBUG,
                request_id = %rqctx.request_id,
                client_request_id,
                total = tally.total,
                "Recorded request"
            );
            count_response(&tally)
        }
        Err(err) => {
            event!(
                Level::WARN,
                request_id = %rqctx.request_id,
                client_request_id,
                error = %err,
                "Failed to record request"
            );
            error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    }
}
