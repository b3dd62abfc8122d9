//! Claim-set matcher (authorization backend)
//!
//! Evaluates a list of `{selector, operator, value}` rules against the
//! verified identity object. The selector is a dot-separated path into the
//! claim JSON; every rule must hold for the request to pass.

use async_trait::async_trait;
use pipeline_core::{AuthContext, AuthObject, Evaluate, EvalError};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternOperator {
    /// Claim equals the value.
    Eq,
    /// Claim differs from the value (holds when the claim is absent).
    Neq,
    /// Claim is an array containing the value.
    Incl,
    /// Claim is an array not containing the value (holds when absent).
    Excl,
    /// Claim matches the value as a regular expression.
    Matches,
}

#[derive(Debug)]
pub struct PatternRule {
    selector: String,
    operator: PatternOperator,
    value: String,
    regex: Option<Regex>,
}

impl PatternRule {
    pub fn new(
        selector: impl Into<String>,
        operator: PatternOperator,
        value: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let value = value.into();
        let regex = match operator {
            PatternOperator::Matches => Some(Regex::new(&value)?),
            _ => None,
        };
        Ok(Self {
            selector: selector.into(),
            operator,
            value,
            regex,
        })
    }

    fn holds(&self, claims: &Value) -> bool {
        let found = select(claims, &self.selector);
        match self.operator {
            PatternOperator::Eq => found.is_some_and(|v| as_comparable(v) == self.value),
            PatternOperator::Neq => !found.is_some_and(|v| as_comparable(v) == self.value),
            PatternOperator::Incl => found
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|v| as_comparable(v) == self.value)),
            PatternOperator::Excl => !found
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|v| as_comparable(v) == self.value)),
            PatternOperator::Matches => found.is_some_and(|v| {
                self.regex
                    .as_ref()
                    .is_some_and(|re| re.is_match(&as_comparable(v)))
            }),
        }
    }
}

pub struct PatternsEvaluator {
    rules: Vec<PatternRule>,
}

impl PatternsEvaluator {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl Evaluate for PatternsEvaluator {
    async fn call(&self, ctx: &AuthContext) -> Result<AuthObject, EvalError> {
        let claims = ctx.identity().ok_or(EvalError::IdentityNotFound)?;
        for rule in &self.rules {
            if !rule.holds(&claims) {
                return Err(EvalError::Denied(format!(
                    "claim {:?} did not satisfy {:?}",
                    rule.selector, rule.operator
                )));
            }
        }
        Ok(AuthObject::Verdict(json!({
            "matchedRules": self.rules.len(),
        })))
    }
}

/// Walk a dot-separated path into a claim object.
fn select<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Strings compare by content, everything else by its JSON rendering.
fn as_comparable(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
