//! CLI entry point for the Meridian query pipeline.
//!
//! Designed for subprocess invocation from a chat frontend: takes one
//! question per invocation and prints the shaped answer to stdout.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use meridian_core::config::MeridianConfig;
use meridian_core::{Action, Caller, Deadline, Permission, Role};
use meridian_graph::{
    ExecutorConfig, GraphClient, GraphConfig, GraphExecutor, PatternEngine, QueryExecutor,
};
use meridian_query::{HttpCompletionBackend, QueryPipeline, QueryTranslator, TranslatorConfig};
use meridian_schema::{PatternFamily, SchemaRegistry};

#[derive(Parser)]
#[command(name = "meridian-query")]
#[command(about = "Natural-language query pipeline for the Meridian knowledge graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: meridian).
    #[arg(short, long, default_value = "meridian", global = true)]
    config: String,

    /// Override the ontology definition directory.
    #[arg(long, global = true)]
    ontology_dir: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one natural-language question.
    Ask {
        /// The question to translate and execute.
        question: String,
    },
    /// Derive advanced relationships for one ontology pattern family.
    Derive {
        /// Ontology name as registered from the ontology directory.
        #[arg(long)]
        ontology: String,
        /// Pattern family: temporal, hierarchical, similarity, or complex.
        #[arg(long)]
        family: PatternFamily,
    },
    /// Print the merged schema representation.
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = MeridianConfig::load(&cli.config)?;
    if let Some(dir) = &cli.ontology_dir {
        config.ontology_dir = dir.clone();
    }

    let mut registry = SchemaRegistry::new();
    let loaded = registry.load_dir(&config.ontology_dir)?;
    tracing::info!(count = loaded, dir = %config.ontology_dir, "loaded ontologies");
    let registry = Arc::new(registry);

    if let Command::Schema = cli.command {
        println!("{}", registry.schema_representation());
        return Ok(());
    }

    let client = GraphClient::connect(&GraphConfig {
        uri: config.neo4j.uri.clone(),
        user: config.neo4j.user.clone(),
        password: config.neo4j.password.clone(),
        max_connections: config.neo4j.max_connections,
        fetch_size: config.neo4j.fetch_size,
    })
    .await?;

    match cli.command {
        Command::Ask { question } => {
            let backend: Option<Arc<dyn meridian_query::CompletionBackend>> =
                if config.llm.api_key.is_empty() {
                    tracing::info!("no LLM api key configured; fast-path translation only");
                    None
                } else {
                    Some(Arc::new(HttpCompletionBackend::new(&config.llm)?))
                };

            let translator = QueryTranslator::new(
                registry.clone(),
                backend,
                TranslatorConfig {
                    history_window: config.query.history_window,
                    ..TranslatorConfig::default()
                },
            );
            let executor: Arc<dyn QueryExecutor> = Arc::new(GraphExecutor::new(
                client,
                registry.clone(),
                ExecutorConfig {
                    default_result_limit: config.query.default_result_limit,
                    max_result_limit: config.query.max_result_limit,
                },
            ));
            let pipeline = QueryPipeline::new(translator, executor);

            let caller = local_admin(&registry);
            let deadline = Deadline::after(Duration::from_secs(config.query.request_timeout_secs));
            let response = pipeline.answer(&caller, &question, &[], deadline).await;
            println!("{}", response.text);
        }
        Command::Derive { ontology, family } => {
            let engine = PatternEngine::new(client, registry.clone());
            let deadline = Deadline::after(Duration::from_secs(config.query.request_timeout_secs));
            let report = engine.derive(&ontology, family, deadline).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Schema => unreachable!("handled before connecting"),
    }

    Ok(())
}

/// CLI invocations run as a local operator with query rights on every
/// registered label. Callers embedded in a service pass their real roles.
fn local_admin(registry: &SchemaRegistry) -> Caller {
    Caller {
        id: uuid::Uuid::new_v4(),
        name: "local-admin".to_string(),
        roles: vec![Role {
            name: "operator".to_string(),
            permissions: registry
                .all_node_labels()
                .into_iter()
                .map(|label| Permission {
                    action: Action::Query,
                    resource: label,
                })
                .collect(),
        }],
    }
}
