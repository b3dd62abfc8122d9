//! API-key identity backend
//!
//! Matches a key presented in a configurable request header against a
//! configured set. Keys are configured and compared as SHA-256 digests, so
//! raw secrets never appear in config files or logs, and the lookup scans
//! the whole set with a non-short-circuiting comparison so its timing is
//! independent of which entry (if any) matches.

use async_trait::async_trait;
use pipeline_core::{AuthContext, AuthObject, Evaluate, EvalError};
use serde_json::json;

/// A named key entry: the digest grants, the name identifies the consumer.
#[derive(Debug, Clone)]
pub struct ApiKeyEntry {
    pub name: String,
    pub sha256: String,
}

pub struct ApiKeyEvaluator {
    header: String,
    keys: Vec<ApiKeyEntry>,
}

impl ApiKeyEvaluator {
    pub fn new(header: impl Into<String>, keys: Vec<ApiKeyEntry>) -> Self {
        let keys = keys
            .into_iter()
            .map(|entry| ApiKeyEntry {
                sha256: entry.sha256.to_ascii_lowercase(),
                ..entry
            })
            .collect();
        Self {
            header: header.into(),
            keys,
        }
    }
}

#[async_trait]
impl Evaluate for ApiKeyEvaluator {
    async fn call(&self, ctx: &AuthContext) -> Result<AuthObject, EvalError> {
        let presented = ctx
            .request()
            .header(&self.header)
            .ok_or(EvalError::MalformedCredential)?;
        let digest = sha256_hex(presented);
        // scan every entry so lookup time does not depend on the match position
        let mut matched: Option<&ApiKeyEntry> = None;
        for entry in &self.keys {
            if ct_eq(&entry.sha256, &digest) {
                matched = Some(entry);
            }
        }
        let entry = matched
            .ok_or_else(|| EvalError::InvalidCredential("unknown api key".to_string()))?;
        Ok(AuthObject::Identity(json!({
            "name": entry.name,
            "source": "apiKey",
        })))
    }
}

/// Byte-wise equality without an early return on the first mismatch.
fn ct_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// SHA-256 of the input, lowercase hex.
pub fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let out = hasher.finalize();
    base16ct::lower::encode_string(&out)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc as StdArc;

    use pipeline_core::{ApiConfig, CheckInput};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn context(headers: &[(&str, &str)]) -> AuthContext {
        let mut input = CheckInput::new("GET", "/", "api.test");
        for (name, value) in headers {
            input = input.with_header(name, *value);
        }
        let api = StdArc::new(ApiConfig {
            name: "test".into(),
            hosts: vec!["api.test".into()],
            identity: vec![],
            metadata: vec![],
            authorization: vec![],
        });
        AuthContext::new(CancellationToken::new(), input, api)
    }

    fn evaluator() -> ApiKeyEvaluator {
        ApiKeyEvaluator::new(
            "x-api-key",
            vec![ApiKeyEntry {
                name: "friends".into(),
                sha256: sha256_hex("ndyRs2TAnTzPzyqhDWHh").to_ascii_uppercase(),
            }],
        )
    }

    #[tokio::test]
    async fn matches_known_key() {
        let ctx = context(&[("x-api-key", "ndyRs2TAnTzPzyqhDWHh")]);
        let object = evaluator().call(&ctx).await.unwrap();
        assert_eq!(object.as_json()["name"], "friends");
    }

    #[tokio::test]
    async fn rejects_unknown_key() {
        let ctx = context(&[("x-api-key", "wrong")]);
        assert!(matches!(
            evaluator().call(&ctx).await,
            Err(EvalError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn missing_header_is_malformed() {
        let ctx = context(&[]);
        assert_eq!(
            evaluator().call(&ctx).await.unwrap_err(),
            EvalError::MalformedCredential
        );
    }

    #[test]
    fn ct_eq_compares_content_and_length() {
        assert!(ct_eq("abc123", "abc123"));
        assert!(!ct_eq("abc123", "abc124"));
        assert!(!ct_eq("abc123", "abc12"));
        assert!(!ct_eq("", "a"));
        assert!(ct_eq("", ""));
    }

    #[test]
    fn sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
