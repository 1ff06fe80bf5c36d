//! Cascade engine: walks a policy's stages and collects answers.
//!
//! One resolution runs its stages strictly in order:
//!
//! ```text
//! Pending → RunningStage(0) → RunningStage(1) → … → Resolved | Exhausted
//! ```
//!
//! A `first-match` stage that yields an answer resolves immediately and the
//! remaining stages never run. A `merge` stage contributes all its answers
//! and the cascade continues. A stage that fails at query time is logged and
//! counted as empty, so one broken backend never takes a lookup down.

use crate::merge::merge_answers;
use crate::policy::{Policy, PolicyDefinition, PolicyGraph, Stage};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tiera_core::template;
use tiera_core::{
    Answer, CascadeMode, Error, MergeStrategy, Provenance, RequestContext, Result, Scope, Value,
};
use tiera_datasource::{AnswerChannel, DatasourceRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Engine tunables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on channel cycles per stage. `None` drives a stage until
    /// its datasource closes the channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cycles_per_stage: Option<usize>,
    /// Return stage failures instead of cascading past them.
    pub fail_on_stage_error: bool,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Pending,
    RunningStage(usize),
    Resolved,
    Exhausted,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::RunningStage(i) => write!(f, "running-stage({})", i),
            Self::Resolved => f.write_str("resolved"),
            Self::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// Outcome of one resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A single answer from a first-match stage.
    Found(Answer),
    /// Answers from merge stages (plus a closing first-match answer, if
    /// any), in stage order.
    Merged {
        answers: Vec<Answer>,
        strategy: MergeStrategy,
    },
    NotFound,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    pub fn answers(&self) -> &[Answer] {
        match self {
            Self::Found(answer) => std::slice::from_ref(answer),
            Self::Merged { answers, .. } => answers,
            Self::NotFound => &[],
        }
    }

    pub fn first(&self) -> Option<&Answer> {
        self.answers().first()
    }

    /// The resolved value, with merged answers folded per the policy's strategy.
    pub fn value(&self) -> Option<Value> {
        match self {
            Self::Found(answer) => Some(answer.value.clone()),
            Self::Merged { answers, strategy } => merge_answers(answers, *strategy),
            Self::NotFound => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Query entry point. Cheap to share behind an `Arc`; every resolution
/// configures its own datasource instances.
#[derive(Debug)]
pub struct Resolver {
    registry: Arc<DatasourceRegistry>,
    policies: ArcSwap<PolicyGraph>,
    config: EngineConfig,
}

impl Resolver {
    pub fn new(registry: Arc<DatasourceRegistry>, policies: PolicyGraph, config: EngineConfig) -> Self {
        Self {
            registry,
            policies: ArcSwap::from_pointee(policies),
            config,
        }
    }

    /// Load policies against the registry and build a resolver.
    pub fn from_definitions(
        registry: Arc<DatasourceRegistry>,
        definitions: &[PolicyDefinition],
        config: EngineConfig,
    ) -> Result<Self> {
        let policies = PolicyGraph::load(definitions, &registry)?;
        Ok(Self::new(registry, policies, config))
    }

    /// Replace the policy graph. The new graph is fully validated first;
    /// on error the current graph stays active.
    pub fn reload(&self, definitions: &[PolicyDefinition]) -> Result<()> {
        let graph = PolicyGraph::load(definitions, &self.registry)?;
        info!("Reloaded policy graph ({} policies)", graph.len());
        self.policies.store(Arc::new(graph));
        Ok(())
    }

    pub fn policies(&self) -> Arc<PolicyGraph> {
        self.policies.load_full()
    }

    pub fn registry(&self) -> &DatasourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn resolve(
        &self,
        policy_id: &str,
        key: &str,
        namespace: &str,
        scope: Scope,
    ) -> Result<Resolution> {
        let request = RequestContext::new(key, namespace).with_scope(scope);
        self.resolve_request(policy_id, &request, &CancellationToken::new())
            .await
    }

    /// Resolve a prepared request. Cancellation is honoured before every
    /// stage and while a stage is waiting on its datasource.
    pub async fn resolve_request(
        &self,
        policy_id: &str,
        request: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let policy = self.policies.load_full().resolve(policy_id)?;
        debug!(request = %request.id(), policy = policy_id, "resolving {}", request);

        let mut state = ResolutionState::Pending;
        let mut collected: Vec<Answer> = Vec::new();
        let mut merged_any = false;

        for (index, stage) in policy.stages().iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            state = ResolutionState::RunningStage(index);
            debug!(request = %request.id(), stage = stage.name(), "{}", state);

            let values = match self.run_stage(stage, request, cancel).await {
                Ok(values) => values,
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    let err = Error::DatasourceRuntime {
                        policy: policy.id().to_string(),
                        stage: stage.name().to_string(),
                        datasource: stage.datasource_id().to_string(),
                        source: Box::new(e),
                    };
                    if self.config.fail_on_stage_error {
                        return Err(err);
                    }
                    warn!(
                        request = %request.id(),
                        policy = policy.id(),
                        stage = stage.name(),
                        datasource = stage.datasource_id(),
                        "{}; continuing cascade",
                        err
                    );
                    continue;
                }
            };

            if values.is_empty() {
                continue;
            }

            let provenance = provenance(&policy, index, stage);
            match stage.mode() {
                CascadeMode::FirstMatch => {
                    if let Some(value) = values.into_iter().next() {
                        collected.push(Answer::new(value, provenance));
                    }
                    state = ResolutionState::Resolved;
                    break;
                }
                CascadeMode::Merge => {
                    merged_any = true;
                    collected.extend(
                        values
                            .into_iter()
                            .map(|v| Answer::new(v, provenance.clone())),
                    );
                }
            }
        }

        if state != ResolutionState::Resolved {
            state = if collected.is_empty() {
                ResolutionState::Exhausted
            } else {
                ResolutionState::Resolved
            };
        }
        debug!(request = %request.id(), answers = collected.len(), "{}", state);

        Ok(match state {
            ResolutionState::Resolved if !merged_any && collected.len() == 1 => {
                Resolution::Found(collected.remove(0))
            }
            ResolutionState::Resolved => Resolution::Merged {
                answers: collected,
                strategy: policy.merge(),
            },
            _ => Resolution::NotFound,
        })
    }

    /// Drive one stage's datasource until it closes, the stage has enough
    /// answers, or the cycle limit is hit.
    async fn run_stage(
        &self,
        stage: &Stage,
        request: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>> {
        if !stage.applies_to(request.namespace()) {
            debug!(stage = stage.name(), "namespace {} filtered out", request.namespace());
            return Ok(Vec::new());
        }

        let options = template::render_options(stage.options(), request.scope())?;
        let mut datasource = stage.datasource().configure(&options)?;
        let mut channel = AnswerChannel::new(stage.mode());

        while channel.wants_more() {
            if let Some(max) = self.config.max_cycles_per_stage {
                if channel.cycle() >= max {
                    debug!(stage = stage.name(), "cycle limit {} reached", max);
                    break;
                }
            }
            channel.begin_cycle();
            tokio::select! {
                result = datasource.lookup(request, &mut channel) => result?,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }

        Ok(channel.into_answers())
    }
}

fn provenance(policy: &Policy, index: usize, stage: &Stage) -> Provenance {
    Provenance {
        policy: policy.id().to_string(),
        stage: stage.name().to_string(),
        stage_index: index,
        datasource: stage.datasource_id().to_string(),
    }
}
