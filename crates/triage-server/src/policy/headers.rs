//! Security response headers applied to every response.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

/// Ordered CSP directives, rendered as `name src src; name src; ...`.
#[derive(Clone, Debug)]
pub struct ContentSecurityPolicy {
    directives: Vec<(String, Vec<String>)>,
}

impl ContentSecurityPolicy {
    pub fn empty() -> Self {
        Self {
            directives: Vec::new(),
        }
    }

    /// Set a directive, replacing any earlier value for the same name.
    pub fn directive(mut self, name: &str, sources: &[&str]) -> Self {
        let sources: Vec<String> = sources.iter().map(|s| (*s).to_string()).collect();
        match self.directives.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = sources,
            None => self.directives.push((name.to_string(), sources)),
        }
        self
    }

    pub fn sources(&self, name: &str) -> Option<&[String]> {
        self.directives
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.as_slice())
    }

    pub fn render(&self) -> String {
        self.directives
            .iter()
            .map(|(name, sources)| {
                if sources.is_empty() {
                    name.clone()
                } else {
                    format!("{name} {}", sources.join(" "))
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Default for ContentSecurityPolicy {
    /// Self-origin scripts and styles, Google Fonts for styles and fonts, no
    /// third-party script origins.
    fn default() -> Self {
        Self::empty()
            .directive("default-src", &["'self'"])
            .directive(
                "style-src",
                &["'self'", "'unsafe-inline'", "https://fonts.googleapis.com"],
            )
            .directive("font-src", &["'self'", "https://fonts.gstatic.com"])
            .directive("script-src", &["'self'", "'unsafe-inline'", "'unsafe-eval'"])
            .directive("img-src", &["'self'", "data:", "https:"])
            .directive("base-uri", &["'self'"])
            .directive("form-action", &["'self'"])
            .directive("frame-ancestors", &["'self'"])
            .directive("object-src", &["'none'"])
            .directive("script-src-attr", &["'none'"])
            .directive("upgrade-insecure-requests", &[])
    }
}

/// The fixed header set stamped onto responses.
#[derive(Clone, Debug)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn new(csp: &ContentSecurityPolicy) -> Result<Self, axum::http::header::InvalidHeaderValue> {
        let mut headers = vec![(
            HeaderName::from_static("content-security-policy"),
            HeaderValue::from_str(&csp.render())?,
        )];
        for (name, value) in [
            ("cross-origin-opener-policy", "same-origin"),
            ("cross-origin-resource-policy", "same-origin"),
            ("origin-agent-cluster", "?1"),
            ("referrer-policy", "no-referrer"),
            ("strict-transport-security", "max-age=31536000; includeSubDomains"),
            ("x-content-type-options", "nosniff"),
            ("x-dns-prefetch-control", "off"),
            ("x-download-options", "noopen"),
            ("x-frame-options", "SAMEORIGIN"),
            ("x-permitted-cross-domain-policies", "none"),
            ("x-xss-protection", "0"),
        ] {
            headers.push((HeaderName::from_static(name), HeaderValue::from_static(value)));
        }
        Ok(Self { headers })
    }

    pub fn iter(&self) -> impl Iterator<Item = &(HeaderName, HeaderValue)> {
        self.headers.iter()
    }
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        // The default policy renders to plain ASCII.
        Self::new(&ContentSecurityPolicy::default()).unwrap_or(Self {
            headers: Vec::new(),
        })
    }
}

/// Never rejects. Headers already set by an inner stage are left alone.
pub async fn security_headers(
    State(headers): State<Arc<SecurityHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let out = response.headers_mut();
    for (name, value) in headers.iter() {
        if !out.contains_key(name) {
            out.insert(name.clone(), value.clone());
        }
    }
    response
}
