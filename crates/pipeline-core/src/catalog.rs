//! Host-indexed registry of protected APIs
//!
//! The catalog maps request hosts to immutable [`ApiConfig`]s. The control
//! plane replaces the whole set atomically; in-flight requests keep the
//! `Arc<ApiConfig>` they resolved at entry, so a swap never changes a
//! decision mid-request.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::evaluator::Evaluator;

/// Declarative configuration of one protected API: the hostnames it matches
/// and the ordered evaluator lists for each phase. Immutable once installed.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub name: String,
    pub hosts: Vec<String>,
    pub identity: Vec<Arc<Evaluator>>,
    pub metadata: Vec<Arc<Evaluator>>,
    pub authorization: Vec<Arc<Evaluator>>,
}

/// Shared host → [`ApiConfig`] lookup with atomic full replacement.
#[derive(Clone, Default)]
pub struct Catalog {
    inner: Arc<RwLock<HashMap<String, Arc<ApiConfig>>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1) lookup of the config protecting `host`. The host is folded to
    /// lowercase and any `:port` suffix is ignored, matching how Envoy
    /// forwards the authority.
    pub fn resolve(&self, host: &str) -> Option<Arc<ApiConfig>> {
        let host = normalize_host(host);
        self.inner.read().expect("catalog poisoned").get(&host).cloned()
    }

    /// Install a new catalog generation, replacing the previous one in a
    /// single write. Returns the number of host entries installed.
    pub fn replace(&self, configs: impl IntoIterator<Item = Arc<ApiConfig>>) -> usize {
        let mut next = HashMap::new();
        for config in configs {
            for host in &config.hosts {
                next.insert(normalize_host(host), config.clone());
            }
        }
        let installed = next.len();
        *self.inner.write().expect("catalog poisoned") = next;
        installed
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("catalog poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All hosts currently served, unordered.
    pub fn hosts(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("catalog poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

/// Lowercase the host and strip a trailing `:port`, leaving bracketed and
/// bare IPv6 literals intact.
fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    if let Some(end) = host.strip_prefix('[').and_then(|h| h.find(']')) {
        return host[..end + 2].to_string();
    }
    match host.rsplit_once(':') {
        Some((name, port))
            if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            name.to_string()
        }
        _ => host,
    }
}
