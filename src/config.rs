//! tiera configuration
//!
//! Engine tunables, logging, and policy definitions in one TOML file.
//! Policies can be inlined as `[[policies]]` tables or kept in separate
//! JSON/TOML files listed under `policy_files`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tiera_core::{CascadeMode, MergeStrategy, OptionBag};
use tiera_datasource::create_default_registry;
use tiera_engine::{EngineConfig, PolicyDefinition, Resolver, StageDefinition};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieraConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    /// Extra policy files. Relative paths are resolved against the config
    /// file's directory.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policy_files: Vec<PathBuf>,
    pub policies: Vec<PolicyDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "tiera=info".into(),
            json: false,
        }
    }
}

/// Shape of a standalone policy file.
#[derive(Debug, Clone, Default, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<PolicyDefinition>,
}

impl TieraConfig {
    /// Load config from a TOML file. Unlike most settings files a missing
    /// or broken config is an error: serving with half a policy set is worse
    /// than not serving.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for file in &mut config.policy_files {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Inline policies followed by those from `policy_files`, in file order.
    pub fn policy_definitions(&self) -> anyhow::Result<Vec<PolicyDefinition>> {
        let mut all = self.policies.clone();
        for path in &self.policy_files {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read policy file {}", path.display()))?;
            let file: PolicyFile = match path.extension().and_then(|e| e.to_str()) {
                Some("json") => serde_json::from_str(&content)?,
                _ => toml::from_str(&content)?,
            };
            all.extend(file.policies);
        }
        Ok(all)
    }

    /// Build a resolver over the builtin datasources and every policy.
    pub fn build_resolver(&self) -> anyhow::Result<Resolver> {
        let registry = std::sync::Arc::new(create_default_registry()?);
        let definitions = self.policy_definitions()?;
        Ok(Resolver::from_definitions(
            registry,
            &definitions,
            self.engine.clone(),
        )?)
    }

    /// Starter config: the classic environment file followed by a global file.
    pub fn example() -> Self {
        let options = OptionBag::from([
            ("files".to_string(), json!(["{environment}.json", "global.json"])),
            ("docroot".to_string(), json!("/etc/tiera/data")),
        ]);

        Self {
            policies: vec![PolicyDefinition {
                id: "default".into(),
                merge: MergeStrategy::Array,
                stages: vec![StageDefinition::new("file", options)
                    .named("main")
                    .mode(CascadeMode::FirstMatch)],
            }],
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_sections_missing() {
        let config = TieraConfig::from_toml("").unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.logging.filter, "tiera=info");
        assert!(config.policies.is_empty());
    }

    #[test]
    fn parses_inline_policies() {
        let config = TieraConfig::from_toml(
            r#"
            [engine]
            max_cycles_per_stage = 32

            [[policies]]
            id = "default"
            merge = "hash"

            [[policies.stages]]
            name = "main"
            datasource = "file"
            mode = "merge"
            confine = ["^web"]
            options = { files = ["{environment}.json", "global.json"] }
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.max_cycles_per_stage, Some(32));
        let policy = &config.policies[0];
        assert_eq!(policy.merge, MergeStrategy::Hash);
        let stage = &policy.stages[0];
        assert_eq!(stage.name.as_deref(), Some("main"));
        assert_eq!(stage.mode, CascadeMode::Merge);
        assert_eq!(stage.confine, vec!["^web".to_string()]);
        assert_eq!(stage.options["files"], json!(["{environment}.json", "global.json"]));
    }

    #[test]
    fn example_round_trips_through_toml() {
        let example = TieraConfig::example();
        let text = example.to_toml();
        assert!(text.contains("{environment}.json"));
        let back = TieraConfig::from_toml(&text).unwrap();
        assert_eq!(back, example);
    }

    #[test]
    fn example_declares_the_environment_hierarchy() {
        let example = TieraConfig::example();
        let stage = &example.policies[0].stages[0];
        assert_eq!(stage.datasource, "file");
        assert_eq!(stage.options["files"], json!(["{environment}.json", "global.json"]));
        assert_eq!(stage.options["docroot"], json!("/etc/tiera/data"));
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = TieraConfig::from_toml(
            r#"
            [[policies]]
            id = "default"
            [[policies.stages]]
            datasource = "file"
            mode = "cascade"
            "#,
        );
        assert!(err.is_err());
    }
}
