//! Per-request evaluation state
//!
//! An [`AuthContext`] lives for exactly one check: it carries the caller's
//! cancellation token, the inbound request view, the resolved [`ApiConfig`],
//! and the result map of each phase. The pipeline is the only writer; the
//! locks exist because sibling tasks of the running phase still hold shared
//! references while the consumer commits results. Phase ordering provides
//! the happens-before edges between maps.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::catalog::ApiConfig;
use crate::error::EvalError;
use crate::evaluator::{AuthObject, EvaluatorHandle, EvaluatorType, Phase};
use crate::request::CheckInput;

type ResultMap = HashMap<EvaluatorHandle, Value>;

pub struct AuthContext {
    cancel: CancellationToken,
    request: CheckInput,
    api: Arc<ApiConfig>,
    identity: RwLock<ResultMap>,
    metadata: RwLock<ResultMap>,
    authorization: RwLock<ResultMap>,
}

impl AuthContext {
    pub fn new(cancel: CancellationToken, request: CheckInput, api: Arc<ApiConfig>) -> Self {
        Self {
            cancel,
            request,
            api,
            identity: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
            authorization: RwLock::new(HashMap::new()),
        }
    }

    /// The caller's cancellation token; honoured at every suspension point.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn request(&self) -> &CheckInput {
        &self.request
    }

    /// The bearer portion of the request's `authorization` header.
    pub fn authorization_token(&self) -> Result<&str, EvalError> {
        self.request.bearer_token()
    }

    pub fn api(&self) -> &Arc<ApiConfig> {
        &self.api
    }

    pub fn identity_results(&self) -> RwLockReadGuard<'_, ResultMap> {
        self.identity.read().expect("identity results poisoned")
    }

    pub fn metadata_results(&self) -> RwLockReadGuard<'_, ResultMap> {
        self.metadata.read().expect("metadata results poisoned")
    }

    pub fn authorization_results(&self) -> RwLockReadGuard<'_, ResultMap> {
        self.authorization.read().expect("authorization results poisoned")
    }

    /// Commit a successful result to the map of the phase that produced it.
    /// The object's tag picks the map, so a handle can never land outside
    /// its phase.
    pub(crate) fn commit(&self, evaluator: EvaluatorHandle, object: AuthObject) {
        let map = match object.phase() {
            Phase::Identity => &self.identity,
            Phase::Metadata => &self.metadata,
            Phase::Authorization => &self.authorization,
        };
        map.write().expect("result map poisoned").insert(evaluator, object.into_json());
    }

    /// The verified identity object, if the identity phase has committed one.
    pub fn identity(&self) -> Option<Value> {
        self.identity_results().values().next().cloned()
    }

    /// The identity result produced by the identity evaluator named `name`.
    pub fn find_identity_by_name(&self, name: &str) -> Result<Value, EvalError> {
        self.identity_results()
            .iter()
            .find(|(handle, _)| handle.name == name)
            .map(|(_, object)| object.clone())
            .ok_or(EvalError::IdentityNotFound)
    }

    /// Immutable view of the metadata results grouped by evaluator type tag.
    /// Evaluators sharing a type contribute separate entries to the group.
    pub fn metadata_view(&self) -> HashMap<EvaluatorType, Vec<Value>> {
        let mut view: HashMap<EvaluatorType, Vec<Value>> = HashMap::new();
        for (handle, object) in self.metadata_results().iter() {
            view.entry(handle.kind).or_default().push(object.clone());
        }
        view
    }
}
