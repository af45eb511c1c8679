// Status classification.
// Maps a completed response to a fetch outcome through ordered, first-match-wins rules.

use serde::de::DeserializeOwned;

use crate::downstream::RawResponse;
use crate::error::FetchError;

use super::FetchOutcome;

type Predicate = Box<dyn Fn(u16) -> bool + Send + Sync>;
type Mapper = Box<dyn Fn(u16) -> FetchError + Send + Sync>;

/// One `(predicate, mapper)` pair.
pub struct StatusRule {
    name: &'static str,
    predicate: Predicate,
    mapper: Mapper,
}

impl StatusRule {
    pub fn new(
        name: &'static str,
        predicate: impl Fn(u16) -> bool + Send + Sync + 'static,
        mapper: impl Fn(u16) -> FetchError + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            predicate: Box::new(predicate),
            mapper: Box::new(mapper),
        }
    }

    /// 5xx responses become `Server` failures tagged code-11111.
    pub fn server_error() -> Self {
        Self::new(
            "server_error",
            |status| (500..=599).contains(&status),
            |status| FetchError::Server {
                code: status,
                message: format!("{} error code-11111", status),
            },
        )
    }

    /// Every other non-2xx becomes a `ClientOrOther` failure tagged code-22222.
    pub fn any_error() -> Self {
        Self::new(
            "any_error",
            |status| !(200..=299).contains(&status),
            |status| FetchError::ClientOrOther {
                code: status,
                message: format!("{} error code-22222", status),
            },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for StatusRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusRule").field("name", &self.name).finish()
    }
}

/// Ordered status rules. Rules are checked in registration order and the
/// first matching rule decides the failure.
#[derive(Debug)]
pub struct StatusClassifier {
    rules: Vec<StatusRule>,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self {
            rules: vec![StatusRule::server_error(), StatusRule::any_error()],
        }
    }
}

impl StatusClassifier {
    /// A classifier with no rules: every status decodes the body.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register a rule after the existing ones.
    pub fn with_rule(mut self, rule: StatusRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Register a rule ahead of the existing ones.
    pub fn prepend_rule(mut self, rule: StatusRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(StatusRule::name).collect()
    }

    /// Classify a completed response.
    pub fn classify<T: DeserializeOwned>(&self, response: &RawResponse) -> FetchOutcome<T> {
        let status = response.status;

        if let Some(rule) = self.rules.iter().find(|rule| (rule.predicate)(status)) {
            tracing::warn!(status, rule = rule.name, "downstream returned an error status");
            return Err((rule.mapper)(status));
        }

        serde_json::from_slice(&response.body).map_err(|e| {
            tracing::warn!(status, error = %e, "failed to decode response body");
            FetchError::Decode(e.to_string())
        })
    }
}
