//! Structured view over the inbound check request
//!
//! The transport hands the pipeline an Envoy `CheckRequest`; everything the
//! evaluators need from it (method, path, host, headers, source address) is
//! extracted once into a [`CheckInput`]. Header lookup is case-insensitive.
//! Bearer-token extraction is centralised here so every identity backend
//! shares the same, strict parsing.

use std::collections::HashMap;

use envoy_types::ext_authz::v3::pb::CheckRequest;
use envoy_types::pb::envoy::config::core::v3::address::Address as CoreAddress;
use envoy_types::pb::envoy::config::core::v3::socket_address::PortSpecifier;

use crate::error::EvalError;

/// Read-only HTTP attributes of the check under evaluation.
#[derive(Debug, Clone, Default)]
pub struct CheckInput {
    method: String,
    scheme: String,
    path: String,
    host: String,
    headers: HashMap<String, String>,
    source_address: Option<String>,
}

impl CheckInput {
    /// Build a view with explicit attributes. Header names are folded to
    /// lowercase on insertion.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            scheme: "http".to_string(),
            path: path.into(),
            host: host.into(),
            headers: HashMap::new(),
            source_address: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_source_address(mut self, addr: impl Into<String>) -> Self {
        self.source_address = Some(addr.into());
        self
    }

    /// Extract the HTTP attributes of an Envoy check request. Missing pieces
    /// fall back to empty values; the host additionally falls back to the
    /// `host` / `:authority` headers.
    pub fn from_check_request(req: &CheckRequest) -> Self {
        let http = req
            .attributes
            .as_ref()
            .and_then(|a| a.request.as_ref())
            .and_then(|r| r.http.as_ref());

        let mut headers = HashMap::new();
        if let Some(http) = http {
            for (name, value) in &http.headers {
                headers.insert(name.to_ascii_lowercase(), value.clone());
            }
        }

        let host = http
            .map(|h| h.host.clone())
            .filter(|h| !h.is_empty())
            .or_else(|| headers.get("host").cloned())
            .or_else(|| headers.get(":authority").cloned())
            .unwrap_or_default();

        let source_address = req
            .attributes
            .as_ref()
            .and_then(|a| a.source.as_ref())
            .and_then(|peer| peer.address.as_ref())
            .and_then(|addr| addr.address.as_ref())
            .and_then(|addr| match addr {
                CoreAddress::SocketAddress(sa) => {
                    let port = match sa.port_specifier {
                        Some(PortSpecifier::PortValue(p)) => p,
                        _ => 0,
                    };
                    Some(format!("{}:{}", sa.address, port))
                }
                _ => None,
            });

        Self {
            method: http.map(|h| h.method.clone()).unwrap_or_default(),
            scheme: http.map(|h| h.scheme.clone()).unwrap_or_default(),
            path: http.map(|h| h.path.clone()).unwrap_or_default(),
            host,
            headers,
            source_address,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn source_address(&self) -> Option<&str> {
        self.source_address.as_deref()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// The bearer portion of the `authorization` header.
    ///
    /// Succeeds iff the header is exactly `Bearer <token>` with a single
    /// space and a non-empty token; anything else (absent header, lowercase
    /// scheme, empty token) is a malformed credential.
    pub fn bearer_token(&self) -> Result<&str, EvalError> {
        let header = self
            .header("authorization")
            .ok_or(EvalError::MalformedCredential)?;
        match header.strip_prefix("Bearer ") {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(EvalError::MalformedCredential),
        }
    }
}

#[cfg(test)]
mod tests {
    use envoy_types::pb::envoy::config::core::v3::{Address, SocketAddress};
    use envoy_types::pb::envoy::service::auth::v3::attribute_context::{
        HttpRequest, Peer, Request as AttrRequest,
    };
    use envoy_types::pb::envoy::service::auth::v3::AttributeContext;

    use super::*;

    fn check_request(method: &str, path: &str, host: &str, source: Option<(&str, u32)>) -> CheckRequest {
        let source = source.map(|(ip, port)| Peer {
            address: Some(Address {
                address: Some(CoreAddress::SocketAddress(SocketAddress {
                    address: ip.to_string(),
                    port_specifier: Some(PortSpecifier::PortValue(port)),
                    ..Default::default()
                })),
            }),
            ..Default::default()
        });
        CheckRequest {
            attributes: Some(AttributeContext {
                source,
                request: Some(AttrRequest {
                    http: Some(HttpRequest {
                        method: method.to_string(),
                        path: path.to_string(),
                        host: host.to_string(),
                        scheme: "https".to_string(),
                        headers: [("X-Thing".to_string(), "yes".to_string())]
                            .into_iter()
                            .collect(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn extracts_http_attributes() {
        let req = check_request("GET", "/toys/1", "toystore.example.com", Some(("10.0.0.9", 52044)));
        let input = CheckInput::from_check_request(&req);
        assert_eq!(input.method(), "GET");
        assert_eq!(input.path(), "/toys/1");
        assert_eq!(input.host(), "toystore.example.com");
        assert_eq!(input.scheme(), "https");
        assert_eq!(input.source_address(), Some("10.0.0.9:52044"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = check_request("GET", "/", "h", None);
        let input = CheckInput::from_check_request(&req);
        assert_eq!(input.header("x-thing"), Some("yes"));
        assert_eq!(input.header("X-THING"), Some("yes"));
        assert_eq!(input.header("x-other"), None);
    }

    #[test]
    fn empty_check_request_yields_empty_view() {
        let input = CheckInput::from_check_request(&CheckRequest::default());
        assert_eq!(input.method(), "");
        assert_eq!(input.host(), "");
        assert!(input.source_address().is_none());
    }

    #[test]
    fn bearer_token_happy_path() {
        let input = CheckInput::new("GET", "/", "h").with_header("Authorization", "Bearer abc");
        assert_eq!(input.bearer_token().unwrap(), "abc");
    }

    #[test]
    fn bearer_token_rejects_lowercase_scheme() {
        let input = CheckInput::new("GET", "/", "h").with_header("authorization", "bearer abc");
        assert_eq!(input.bearer_token(), Err(EvalError::MalformedCredential));
    }

    #[test]
    fn bearer_token_rejects_empty_token() {
        let input = CheckInput::new("GET", "/", "h").with_header("authorization", "Bearer ");
        assert_eq!(input.bearer_token(), Err(EvalError::MalformedCredential));
    }

    #[test]
    fn bearer_token_rejects_absent_header() {
        let input = CheckInput::new("GET", "/", "h");
        assert_eq!(input.bearer_token(), Err(EvalError::MalformedCredential));
    }
}
