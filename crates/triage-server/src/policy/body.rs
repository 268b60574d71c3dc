//! JSON and URL-encoded body admission.
//!
//! Bodies of either type are read up to the configured cap and parsed once.
//! Oversized bodies get 413 and malformed ones 400; neither reaches a route.
//! The parsed value is attached as [`ParsedBody`] and the raw bytes are put
//! back so ordinary extractors still work.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use futures::StreamExt;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Parsed request body, available to handlers as a request extension.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedBody(pub Value);

#[derive(Clone, Copy, Debug)]
pub struct BodyLimit(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

fn body_kind(request: &Request) -> Option<BodyKind> {
    let content_type = request.headers().get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence == "application/json" || essence.ends_with("+json") {
        Some(BodyKind::Json)
    } else if essence == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

fn declared_length(request: &Request) -> Option<usize> {
    request
        .headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

async fn read_capped(body: Body, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::bad_request(format!("failed to read body: {e}")))?;
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::payload_too_large());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

pub fn parse_json(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

/// Split a bracketed key: `case[tags][]` becomes `["case", "tags", ""]`.
/// Flat keys and keys whose brackets do not pair up give `None`.
fn key_path(key: &str) -> Option<Vec<&str>> {
    let open = key.find('[').filter(|&i| i > 0)?;
    let mut path = vec![&key[..open]];
    let mut rest = &key[open..];
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        path.push(&inner[..close]);
        rest = &inner[close + 1..];
    }
    // `[]` (append) only makes sense as the last segment.
    if path[1..path.len() - 1].iter().any(|seg| seg.is_empty()) {
        return None;
    }
    Some(path)
}

/// Repeated keys collect into an array.
fn insert_flat(map: &mut Map<String, Value>, key: &str, value: Value) {
    match map.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key.to_string(), value);
        }
    }
}

/// Hands the value back if the path runs into an existing value of another
/// shape. Nothing is created on that path in that case.
fn insert_nested(map: &mut Map<String, Value>, path: &[&str], value: Value) -> Result<(), Value> {
    let Some((head, rest)) = path.split_first() else {
        return Err(value);
    };
    match rest {
        [] => {
            insert_flat(map, head, value);
            Ok(())
        }
        [""] => match map
            .entry(head.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => {
                items.push(value);
                Ok(())
            }
            _ => Err(value),
        },
        _ => match map
            .entry(head.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            Value::Object(inner) => insert_nested(inner, rest, value),
            _ => Err(value),
        },
    }
}

/// Decode an urlencoded body into a JSON object.
///
/// `a=1&b=2&b=3` gives `{"a":"1","b":["2","3"]}`. Bracketed keys nest:
/// `case[title]=X&case[tags][]=a` gives `{"case":{"title":"X","tags":["a"]}}`.
/// Index segments (`a[0]`) are object keys, not array positions. A bracketed
/// key that collides with an existing value of another shape is kept
/// verbatim as a flat key.
pub fn parse_form(bytes: &[u8]) -> Result<Value, ApiError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ApiError::bad_request("invalid urlencoded body: not UTF-8"))?;
    let mut out = Map::new();
    for (key, value) in url::form_urlencoded::parse(text.as_bytes()) {
        let value = Value::String(value.into_owned());
        let unplaced = match key_path(&key) {
            Some(path) => insert_nested(&mut out, &path, value).err(),
            None => Some(value),
        };
        if let Some(value) = unplaced {
            insert_flat(&mut out, &key, value);
        }
    }
    Ok(Value::Object(out))
}
