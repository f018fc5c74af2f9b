//! Fallback handler: every path outside `/-/` is an RPC call.
//!
//! Converts the HTTP request into a [`RawRequest`], runs the dispatcher,
//! and maps the [`RpcResponse`] back onto HTTP.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use rpcgate_core::{Arguments, DispatchError, Value};
use tracing::{debug, warn};

use super::AppState;
use crate::dispatch::{collect_pairs, RawRequest, RpcResponse};
use crate::network::middleware::REQUEST_ID_HEADER;
use crate::network::Phase;

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Client id when neither the peer address nor a forwarded address is known.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, thiserror::Error)]
enum BodyError {
    #[error("request body could not be read: {0}")]
    Read(#[from] axum::Error),
    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub async fn rpc_handler(State(state): State<AppState>, request: Request) -> Response {
    if matches!(state.lifecycle.phase(), Phase::Draining | Phase::Stopped) {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let _in_flight = state.lifecycle.track();

    let (parts, body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let trust_forwarded = state.dispatcher.config().trust_forwarded_for;

    let mut raw = RawRequest {
        path: parts.uri.path().to_string(),
        query: parse_form(parts.uri.query().unwrap_or_default().as_bytes()),
        body: Arguments::new(),
        client_id: client_id(&parts.headers, peer, trust_forwarded),
        request_id: parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    match read_body(body, state.body_limit, &parts.headers).await {
        Ok(args) => raw.body = args,
        Err(err) => {
            let err = DispatchError::InvalidBody {
                reason: err.to_string(),
            };
            return into_http(state.dispatcher.reject(&raw, &err));
        }
    }
    debug!(path = %raw.path, client = %raw.client_id, "rpc request");

    into_http(state.dispatcher.dispatch(&raw))
}

fn parse_form(input: &[u8]) -> Arguments {
    collect_pairs(url::form_urlencoded::parse(input).into_owned())
}

async fn read_body(body: Body, limit: usize, headers: &HeaderMap) -> Result<Arguments, BodyError> {
    let bytes: Bytes = axum::body::to_bytes(body, limit).await?;
    if bytes.is_empty() {
        return Ok(Arguments::new());
    }
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().starts_with("application/json"));
    if !is_json {
        return Ok(parse_form(&bytes));
    }
    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(fields) => Ok(fields.into_iter().collect()),
        // Only named arguments exist; a bare JSON value names nothing.
        other => {
            debug!(kind = json_kind(&other), "ignoring non-object JSON body");
            Ok(Arguments::new())
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// First `x-forwarded-for` entry when trusted, else the peer IP.
fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    let forwarded = trust_forwarded
        .then(|| headers.get(FORWARDED_FOR_HEADER))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(addr), _) => addr.to_string(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

fn into_http(rpc: RpcResponse) -> Response {
    let mut response = Response::new(Body::from(rpc.body));
    *response.status_mut() = rpc.status;

    let headers = response.headers_mut();
    match HeaderValue::from_str(&rpc.content_type) {
        Ok(value) => {
            headers.insert(CONTENT_TYPE, value);
        }
        Err(_) => warn!(content_type = %rpc.content_type, "dropping invalid content type"),
    }
    for (name, value) in rpc.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(header = %name, "skipping diagnostic header that is not valid HTTP"),
        }
    }
    response
}
