//! Per-request access log in the Apache combined format.

use axum::extract::Request;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};

/// Fields of one combined-format access log line.
#[derive(Clone, Debug)]
pub struct AccessRecord {
    pub remote_addr: Option<String>,
    pub time: DateTime<Utc>,
    pub method: String,
    pub uri: String,
    pub version: String,
    pub status: u16,
    pub content_length: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

impl AccessRecord {
    /// `addr - - [date] "METHOD uri HTTP/x" status length "referrer" "agent"`
    pub fn combined(&self) -> String {
        format!(
            "{} - - [{}] \"{} {} {}\" {} {} \"{}\" \"{}\"",
            self.remote_addr.as_deref().unwrap_or("-"),
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.uri,
            self.version,
            self.status,
            self.content_length.as_deref().unwrap_or("-"),
            self.referrer.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Never rejects; records one INFO event under target `access` per request.
pub async fn access_log(request: Request, next: Next) -> Response {
    let remote_addr = super::client_ip(&request).map(|ip| ip.to_string());
    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let version = format!("{:?}", request.version());
    let referrer = header_str(request.headers(), header::REFERER);
    let user_agent = header_str(request.headers(), header::USER_AGENT);

    let response = next.run(request).await;

    let record = AccessRecord {
        remote_addr,
        time: Utc::now(),
        method,
        uri,
        version,
        status: response.status().as_u16(),
        content_length: header_str(response.headers(), header::CONTENT_LENGTH),
        referrer,
        user_agent,
    };
    tracing::info!(
        target: "access",
        method = %record.method,
        status = record.status,
        "{}",
        record.combined()
    );
    response
}
