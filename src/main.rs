//! tiera: hierarchical key lookup CLI
//!
//! Usage:
//!   tiera lookup color -n prod -s environment=prod   → resolve one key
//!   tiera check                                      → validate every policy
//!   tiera datasources                                → list builtin datasources
//!   tiera init > tiera.toml                          → print a starter config
//!
//! Exit status: 0 found, 1 not found, 2 error.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tiera::{init_tracing, LoggingConfig, TieraConfig};
use tiera_core::{RequestContext, Scope};
use tiera_datasource::create_default_registry;
use tiera_engine::Resolution;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "tiera",
    version = env!("CARGO_PKG_VERSION"),
    about = "Hierarchical key lookup over pluggable datasources"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (TOML)
    #[arg(short, long, global = true, default_value = "tiera.toml")]
    config: PathBuf,

    /// Log as JSON lines (overrides config)
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a key through a policy
    Lookup {
        /// Key to look up
        key: String,

        /// Namespace the key lives in
        #[arg(short, long)]
        namespace: String,

        /// Policy to resolve through
        #[arg(short, long, default_value = "default")]
        policy: String,

        /// Scope variable as name=value (repeatable). Values parse as JSON
        /// when they can, otherwise as plain strings.
        #[arg(short, long = "scope", value_parser = parse_scope_var)]
        scope: Vec<(String, Value)>,

        /// Print the full resolution, with provenance, as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Load and validate every policy, then list them
    Check,
    /// List registered datasources and their options
    Datasources,
    /// Print a starter config
    Init,
}

fn parse_scope_var(s: &str) -> Result<(String, Value), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    if name.is_empty() {
        return Err(format!("empty scope variable name in '{}'", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Init => {
            print!("{}", TieraConfig::example().to_toml());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Datasources => {
            init_tracing(&logging(&LoggingConfig::default(), cli.log_json));
            let registry = create_default_registry()?;
            for d in registry.descriptors() {
                println!("{} - {}", d.id(), d.description());
                for o in d.options() {
                    let mut flags = Vec::new();
                    if o.required {
                        flags.push("required".to_string());
                    }
                    if let Some(default) = &o.default {
                        flags.push(format!("default {}", default));
                    }
                    println!("    {:<10} [{}] {}", o.name, flags.join(", "), o.description);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => {
            let config = TieraConfig::load(&cli.config)?;
            init_tracing(&logging(&config.logging, cli.log_json));
            let resolver = config.build_resolver()?;
            let graph = resolver.policies();
            for id in graph.ids() {
                let Some(policy) = graph.get(id) else { continue };
                println!("{} (merge: {})", policy.id(), policy.merge());
                for (i, stage) in policy.stages().iter().enumerate() {
                    println!(
                        "    [{}] {} - {} ({})",
                        i,
                        stage.name(),
                        stage.datasource_id(),
                        stage.mode()
                    );
                }
            }
            println!("{} policies OK", graph.len());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Lookup {
            key,
            namespace,
            policy,
            scope,
            json,
        } => {
            let config = TieraConfig::load(&cli.config)?;
            init_tracing(&logging(&config.logging, cli.log_json));
            let resolver = config.build_resolver()?;

            let scope: Scope = scope.into_iter().collect();
            let request = RequestContext::new(key, namespace).with_scope(scope);

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let resolution = resolver.resolve_request(&policy, &request, &cancel).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&render_json(&resolution))?);
            } else if let Some(value) = resolution.value() {
                match value {
                    Value::String(s) => println!("{}", s),
                    other => println!("{}", serde_json::to_string_pretty(&other)?),
                }
            }

            Ok(if resolution.is_found() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
    }
}

fn logging(base: &LoggingConfig, force_json: bool) -> LoggingConfig {
    LoggingConfig {
        json: base.json || force_json,
        ..base.clone()
    }
}

fn render_json(resolution: &Resolution) -> Value {
    json!({
        "found": resolution.is_found(),
        "value": resolution.value(),
        "answers": resolution.answers(),
    })
}
