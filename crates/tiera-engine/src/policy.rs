//! Policy graph: named, ordered lookup stages.
//!
//! Policies are declared as `PolicyDefinition`s (plain serde data) and turned
//! into a `PolicyGraph` in one pass that resolves every datasource, validates
//! its options, trial-configures it and compiles stage filters. If any stage
//! of any policy is invalid the whole load fails and nothing is activated.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tiera_core::{CascadeMode, Error, MergeStrategy, OptionBag, Result};
use tiera_datasource::{DatasourceDescriptor, DatasourceRegistry};
use tracing::info;

// ---------------------------------------------------------------------------
// Definitions (as written in config)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    pub id: String,
    /// How answers from merge stages fold into one value.
    #[serde(default)]
    pub merge: MergeStrategy,
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Defaults to `stage-<index>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub datasource: String,
    #[serde(default)]
    pub options: OptionBag,
    #[serde(default)]
    pub mode: CascadeMode,
    /// Only run for namespaces matching one of these patterns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confine: Vec<String>,
    /// Never run for namespaces matching one of these patterns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl StageDefinition {
    pub fn new(datasource: impl Into<String>, options: OptionBag) -> Self {
        Self {
            name: None,
            datasource: datasource.into(),
            options,
            mode: CascadeMode::default(),
            confine: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn mode(mut self, mode: CascadeMode) -> Self {
        self.mode = mode;
        self
    }
}

// ---------------------------------------------------------------------------
// Validated policies
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Stage {
    name: String,
    datasource: Arc<DatasourceDescriptor>,
    options: OptionBag,
    mode: CascadeMode,
    confine: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl Stage {
    fn build(index: usize, def: &StageDefinition, registry: &DatasourceRegistry) -> Result<Self> {
        let datasource = registry.resolve(&def.datasource)?;
        let options = datasource.validate_options(&def.options)?;
        // Template placeholders are still unrendered here, which is enough to
        // catch shape errors before the policy goes live.
        datasource.configure(&options)?;

        let compile = |field: &str, patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| Error::validation(&def.datasource, field, e.to_string()))
                })
                .collect()
        };

        Ok(Self {
            name: def.name.clone().unwrap_or_else(|| format!("stage-{}", index)),
            options,
            mode: def.mode,
            confine: compile("confine", &def.confine)?,
            exclude: compile("exclude", &def.exclude)?,
            datasource,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datasource(&self) -> &DatasourceDescriptor {
        &self.datasource
    }

    pub fn datasource_id(&self) -> &str {
        self.datasource.id()
    }

    /// Validated options with defaults applied, templates unrendered.
    pub fn options(&self) -> &OptionBag {
        &self.options
    }

    pub fn mode(&self) -> CascadeMode {
        self.mode
    }

    /// Whether the stage's filters let this namespace through.
    pub fn applies_to(&self, namespace: &str) -> bool {
        let confined = self.confine.is_empty() || self.confine.iter().any(|r| r.is_match(namespace));
        confined && !self.exclude.iter().any(|r| r.is_match(namespace))
    }
}

#[derive(Debug)]
pub struct Policy {
    id: String,
    merge: MergeStrategy,
    stages: Vec<Stage>,
}

impl Policy {
    fn build(def: &PolicyDefinition, registry: &DatasourceRegistry) -> Result<Self> {
        if def.stages.is_empty() {
            return Err(Error::invalid_policy(&def.id, "policy has no stages"));
        }
        let stages = def
            .stages
            .iter()
            .enumerate()
            .map(|(i, s)| Stage::build(i, s, registry))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: def.id.clone(),
            merge: def.merge,
            stages,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn merge(&self) -> MergeStrategy {
        self.merge
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PolicyGraph {
    policies: HashMap<String, Arc<Policy>>,
}

impl PolicyGraph {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate and build every policy. All-or-nothing.
    pub fn load(definitions: &[PolicyDefinition], registry: &DatasourceRegistry) -> Result<Self> {
        let mut policies = HashMap::with_capacity(definitions.len());
        for def in definitions {
            if policies.contains_key(&def.id) {
                return Err(Error::DuplicatePolicy(def.id.clone()));
            }
            let policy = Policy::build(def, registry)?;
            policies.insert(def.id.clone(), Arc::new(policy));
        }
        info!("Loaded {} policies", policies.len());
        Ok(Self { policies })
    }

    pub fn get(&self, id: &str) -> Option<Arc<Policy>> {
        self.policies.get(id).cloned()
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<Policy>> {
        self.get(id).ok_or_else(|| Error::UnknownPolicy(id.to_string()))
    }

    /// Policy ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.policies.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
