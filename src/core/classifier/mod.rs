//! Request classification for the deception layer.
//!
//! Two independent signals mark a request as hostile:
//! - SQL injection payloads anywhere in the query, body, path or cookie
//! - A `User-Agent` belonging to a known offensive tool
//!
//! Either one alone is conclusive. Classification never fails: missing or oddly
//! shaped input simply does not match.

pub mod scanner;
pub mod sql_injection;

use axum::http::{HeaderMap, Method, Uri, header};
use serde_json::Value;
pub use scanner::detect_scanner;
pub use sql_injection::detect_sql_injection;

/// Everything the classifier is allowed to look at, decoupled from the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestSurface {
    pub method: Method,
    /// Raw (still percent-encoded) path
    pub path: String,
    /// Decoded query pairs, in order of appearance
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    /// Parsed body. JSON bodies keep their structure, form bodies become an
    /// object of strings, any other UTF-8 body becomes a single string.
    pub body: Option<Value>,
}

impl RequestSurface {
    /// Build a surface from request parts and a buffered body.
    pub fn from_parts(method: Method, uri: &Uri, headers: HeaderMap, body: &[u8]) -> Self {
        let query = uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        let body = Self::parse_body(&headers, body);

        Self {
            method,
            path: uri.path().to_string(),
            query,
            headers,
            body,
        }
    }

    fn parse_body(headers: &HeaderMap, body: &[u8]) -> Option<Value> {
        if body.is_empty() {
            return None;
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let fields = url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect();
            return Some(Value::Object(fields));
        }

        if let Ok(value) = serde_json::from_slice::<Value>(body) {
            return Some(value);
        }

        std::str::from_utf8(body)
            .ok()
            .map(|text| Value::String(text.to_string()))
    }

    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// A header value, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }
}

/// Why a request was judged hostile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostileSignal {
    /// An injection payload matched
    SqlPayload,
    /// The User-Agent names an offensive tool
    ScannerUserAgent(&'static str),
}

impl HostileSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostileSignal::SqlPayload => "SQL_INJECTION",
            HostileSignal::ScannerUserAgent(_) => "SCANNER_USER_AGENT",
        }
    }
}

/// Classifier verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Benign,
    Hostile(HostileSignal),
}

impl Classification {
    pub fn is_hostile(&self) -> bool {
        matches!(self, Classification::Hostile(_))
    }
}

/// Combine payload matching and scanner fingerprinting.
///
/// Payload matches are reported first so incidents name the stronger evidence.
pub fn classify(surface: &RequestSurface) -> Classification {
    if detect_sql_injection(surface) {
        return Classification::Hostile(HostileSignal::SqlPayload);
    }

    if let Some(tool) = detect_scanner(surface) {
        return Classification::Hostile(HostileSignal::ScannerUserAgent(tool));
    }

    Classification::Benign
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn surface(uri: &str, body: &[u8]) -> RequestSurface {
        let uri: Uri = uri.parse().expect("valid uri");
        RequestSurface::from_parts(Method::GET, &uri, HeaderMap::new(), body)
    }

    #[test]
    fn test_query_pairs_are_decoded() {
        let s = surface("/search?q=hello%20world&page=2", b"");
        assert_eq!(s.query_param("q"), Some("hello world"));
        assert_eq!(s.query_param("page"), Some("2"));
        assert_eq!(s.query_param("missing"), None);
    }

    #[test]
    fn test_body_shapes() {
        let json = surface("/", br#"{"name": "x"}"#);
        assert!(json.body.as_ref().is_some_and(Value::is_object));

        let text = surface("/", b"just text");
        assert_eq!(text.body, Some(Value::String("just text".to_string())));

        let binary = surface("/", &[0xff, 0xfe, 0x00]);
        assert_eq!(binary.body, None);

        let empty = surface("/", b"");
        assert_eq!(empty.body, None);
    }

    #[test]
    fn test_form_body_becomes_object() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let uri: Uri = "/login".parse().expect("valid uri");
        let s = RequestSurface::from_parts(Method::POST, &uri, headers, b"user=bob&pass=x%27y");
        let body = s.body.expect("form body");
        assert_eq!(body["pass"], Value::String("x'y".to_string()));
    }

    #[test]
    fn test_classify_prefers_payload_signal() {
        let mut s = surface("/?id=1%20UNION%20SELECT%20password%20FROM%20users", b"");
        s.headers
            .insert("user-agent", HeaderValue::from_static("sqlmap/1.6"));
        assert_eq!(
            classify(&s),
            Classification::Hostile(HostileSignal::SqlPayload)
        );
    }

    #[test]
    fn test_classify_scanner_only() {
        let mut s = surface("/", b"");
        s.headers
            .insert("user-agent", HeaderValue::from_static("sqlmap/1.6#stable"));
        assert_eq!(
            classify(&s),
            Classification::Hostile(HostileSignal::ScannerUserAgent("sqlmap"))
        );
    }

    #[test]
    fn test_classify_benign() {
        let s = surface("/blog?tag=rust", b"");
        assert_eq!(classify(&s), Classification::Benign);
        assert!(!classify(&s).is_hostile());
    }
}
