//! HTTP API for computing returns.
//!
//! `POST /returns/` prices a holding, `POST /returns-baseline/` prices the
//! same money invested in the baseline fund. Requests without a body get a
//! short usage message.

use crate::core::ReturnsCalculator;
use crate::domain::model::{BaselineRequest, ReturnsRequest};
use crate::utils::error::{ErrorCategory, Result, TrackerError};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

const RETURNS_HELP: &str = "Nothing to see! Specify ticker, start_date, start_value, and start_shares in a JSON body to calculate the total returns.";
const BASELINE_HELP: &str = "Nothing to see! Specify, start_date, and start_value in a JSON body to calculate the total returns.";

pub struct AppState {
    calculator: Arc<dyn ReturnsCalculator>,
    baseline_ticker: String,
}

impl AppState {
    pub fn new(calculator: Arc<dyn ReturnsCalculator>, baseline_ticker: impl Into<String>) -> Self {
        Self {
            calculator,
            baseline_ticker: baseline_ticker.into(),
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn message_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "message": message }))
}

pub fn error_status(err: &TrackerError) -> StatusCode {
    match err {
        TrackerError::NoPriceData { .. } => StatusCode::NOT_FOUND,
        TrackerError::MarketDataError { .. } | TrackerError::ApiError(_) => StatusCode::BAD_GATEWAY,
        _ if err.category() == ErrorCategory::Input => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &TrackerError) -> Response<Full<Bytes>> {
    let status = error_status(err);
    if status.is_server_error() {
        tracing::error!(
            "Request failed: {} (Category: {:?}, Severity: {:?})",
            err,
            err.category(),
            err.severity()
        );
    } else {
        tracing::warn!("Rejected request: {}", err);
    }
    json_response(status, &json!({ "error": err.to_string() }))
}

/// A body with nothing in it: `null`, `{}`, `[]`, `""`, `false` or `0`.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// `None` for an empty or blank body.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>> {
    let text = std::str::from_utf8(body)
        .map_err(|_| TrackerError::validation("request body is not UTF-8"))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(text)?;
    if is_blank(&value) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

async fn returns(state: &AppState, body: &[u8]) -> Result<Response<Full<Bytes>>> {
    match parse_body::<ReturnsRequest>(body)? {
        Some(request) => {
            let result = state.calculator.security_returns(&request).await?;
            Ok(json_response(StatusCode::OK, &result))
        }
        None => Ok(message_response(StatusCode::OK, RETURNS_HELP)),
    }
}

async fn returns_baseline(state: &AppState, body: &[u8]) -> Result<Response<Full<Bytes>>> {
    match parse_body::<BaselineRequest>(body)? {
        Some(request) => {
            let result = state.calculator.baseline_returns(&request).await?;
            Ok(json_response(StatusCode::OK, &result))
        }
        None => Ok(message_response(StatusCode::OK, BASELINE_HELP)),
    }
}

fn index(state: &AppState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "baseline": state.baseline_ticker,
            "endpoints": ["POST /returns/", "POST /returns-baseline/"],
        }),
    )
}

/// Dispatch one request. Trailing slashes on the API paths are optional.
pub async fn route(
    state: &AppState,
    method: &Method,
    path: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let result = match (method, path.trim_end_matches('/')) {
        (&Method::GET, "") => Ok(index(state)),
        (&Method::GET, "/health") => Ok(json_response(StatusCode::OK, &json!({ "status": "ok" }))),
        (&Method::POST, "/returns") => returns(state, body).await,
        (&Method::POST, "/returns-baseline") => returns_baseline(state, body).await,
        (_, "/returns") | (_, "/returns-baseline") => Ok(message_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Use POST with a JSON body",
        )),
        _ => Ok(message_response(StatusCode::NOT_FOUND, "Not found")),
    };

    result.unwrap_or_else(|err| error_response(&err))
}

async fn handle_request(
    state: Arc<AppState>,
    remote_addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let body = req.into_body().collect().await?.to_bytes();

    let response = route(&state, &method, &path, &body).await;
    tracing::info!("{} {} {} -> {}", remote_addr, method, path, response.status());
    Ok(response)
}

/// Accept connections until the task is dropped. No request timeout is applied.
pub async fn serve_listener(state: Arc<AppState>, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Accept error: {}", e);
                continue;
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { handle_request(state, remote_addr, req).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!("Connection error: {}", e);
            }
        });
    }
}

pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    serve_listener(state, listener).await
}
