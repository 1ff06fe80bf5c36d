//! Request, answer and mode types shared by every tiera crate

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub use serde_json::Value;

/// Options configured for one stage, keyed by option name.
pub type OptionBag = BTreeMap<String, Value>;

/// Caller-supplied variables used to render option templates.
pub type Scope = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// RequestContext
// ---------------------------------------------------------------------------

/// One query: the key to find, the namespace it lives in, and the scope.
///
/// Built once per resolution and only handed out by reference, so every
/// stage of a resolution sees the same request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    id: Uuid,
    key: String,
    namespace: String,
    #[serde(default)]
    scope: Scope,
}

impl RequestContext {
    pub fn new(key: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            namespace: namespace.into(),
            scope: Scope::new(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Add a single scope variable.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope.insert(name.into(), value.into());
        self
    }

    /// Correlation id, logged with every stage of the resolution.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn scope_var(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.namespace, self.key)
    }
}

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

/// Which stage produced an answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub policy: String,
    pub stage: String,
    pub stage_index: usize,
    pub datasource: String,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}[{}] ({})",
            self.policy, self.stage, self.stage_index, self.datasource
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub value: Value,
    pub provenance: Provenance,
}

impl Answer {
    pub fn new(value: Value, provenance: Provenance) -> Self {
        Self { value, provenance }
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// How a stage's answers feed the cascade.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CascadeMode {
    /// Stop the whole resolution at the first answer.
    #[default]
    FirstMatch,
    /// Collect every answer and keep going.
    Merge,
}

impl fmt::Display for CascadeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstMatch => f.write_str("first-match"),
            Self::Merge => f.write_str("merge"),
        }
    }
}

/// How merged answers fold into a single value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Flatten arrays and append scalars, in stage order.
    #[default]
    Array,
    /// Deep-merge objects; earlier answers win on conflicting keys.
    Hash,
    /// Keep the first answer only.
    First,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array => f.write_str("array"),
            Self::Hash => f.write_str("hash"),
            Self::First => f.write_str("first"),
        }
    }
}
