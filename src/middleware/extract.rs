// Tenant identifier extraction.
//
// Sources in precedence order: explicit header, host subdomain, query
// parameter, JSON body field. Values are trimmed and empty values ignored;
// case normalization happens in the resolver.

use axum::http::{header, request::Parts, HeaderMap};
use serde_json::Value;
use std::net::Ipv4Addr;

use crate::config::ResolutionConfig;

/// Identifier from the header, host, or query string, in that order
pub fn from_parts(parts: &Parts, config: &ResolutionConfig) -> Option<String> {
    from_header(&parts.headers, &config.header)
        .or_else(|| {
            let host = parts
                .headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .or_else(|| parts.uri.host())?;
            from_host(host)
        })
        .or_else(|| from_query(parts.uri.query()?, &config.query_param))
}

pub fn from_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(non_empty)
}

/// First label of a host with more than two dot-separated labels.
/// `acme.example.com:8080` → `acme`; `example.com`, `localhost` and IP
/// literals yield nothing.
pub fn from_host(host: &str) -> Option<String> {
    if host.starts_with('[') {
        return None;
    }
    let host = host.split(':').next()?;
    if host.parse::<Ipv4Addr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return None;
    }
    non_empty(labels[0])
}

pub fn from_query(query: &str, param: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == param)
        .and_then(|(_, value)| non_empty(&value))
}

/// String-valued top-level field of a JSON object body
pub fn from_body(body: &[u8], field: &str) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get(field).and_then(Value::as_str).and_then(non_empty)
}

/// Whether the body is worth buffering for the body-field source
pub fn has_json_body(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn header_wins_over_everything() {
        let parts = parts(
            "/api/tenant?tenant=query",
            &[("x-tenant-id", "Header"), ("host", "sub.example.com")],
        );
        assert_eq!(
            from_parts(&parts, &ResolutionConfig::default()),
            Some("Header".to_string())
        );
    }

    #[test]
    fn subdomain_wins_over_query() {
        let parts = parts("/api/tenant?tenant=query", &[("host", "acme.example.com:8080")]);
        assert_eq!(
            from_parts(&parts, &ResolutionConfig::default()),
            Some("acme".to_string())
        );
    }

    #[test]
    fn query_used_when_host_has_no_subdomain() {
        let parts = parts("/api/tenant?other=1&tenant=globex", &[("host", "example.com")]);
        assert_eq!(
            from_parts(&parts, &ResolutionConfig::default()),
            Some("globex".to_string())
        );
    }

    #[test]
    fn nothing_found_means_none() {
        let parts = parts("/api/tenant", &[("host", "localhost:3000")]);
        assert_eq!(from_parts(&parts, &ResolutionConfig::default()), None);
    }

    #[test]
    fn blank_header_falls_through() {
        let parts = parts("/api/tenant?tenant=globex", &[("x-tenant-id", "   ")]);
        assert_eq!(
            from_parts(&parts, &ResolutionConfig::default()),
            Some("globex".to_string())
        );
    }

    #[test]
    fn host_subdomain_rules() {
        assert_eq!(from_host("acme.example.com"), Some("acme".to_string()));
        assert_eq!(from_host("acme.eu.example.com"), Some("acme".to_string()));
        assert_eq!(from_host("example.com"), None);
        assert_eq!(from_host("localhost"), None);
        assert_eq!(from_host("127.0.0.1:3000"), None);
        assert_eq!(from_host("[::1]:3000"), None);
        assert_eq!(from_host(".example.com.au"), None);
    }

    #[test]
    fn body_field_extraction() {
        assert_eq!(
            from_body(br#"{"tenant": "Acme", "username": "root"}"#, "tenant"),
            Some("Acme".to_string())
        );
        assert_eq!(from_body(br#"{"tenant": 42}"#, "tenant"), None);
        assert_eq!(from_body(br#"["tenant"]"#, "tenant"), None);
        assert_eq!(from_body(b"not json", "tenant"), None);
        assert_eq!(from_body(b"", "tenant"), None);
    }

    #[test]
    fn json_content_type_detection() {
        let json = parts("/", &[("content-type", "application/json; charset=utf-8")]);
        let form = parts("/", &[("content-type", "application/x-www-form-urlencoded")]);
        assert!(has_json_body(&json.headers));
        assert!(!has_json_body(&form.headers));
    }
}
