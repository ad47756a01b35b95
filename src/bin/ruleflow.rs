//! `ruleflow` command line: load YAML rules and run scenarios through the
//! offline retriever and reasoner.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use ruleflow::{
    load_rule_dir, ActionRegistry, InMemoryRuleCatalog, JsonMap, RuleService, RuleflowError,
    RuleflowResult, ServiceConfig,
};

#[derive(Parser)]
#[command(name = "ruleflow")]
#[command(about = "Decide which business rules apply to a scenario and execute them")]
#[command(version)]
struct Cli {
    /// Directory of YAML rule files
    #[arg(long, env = "RULEFLOW_RULES_DIR", default_value = "demos/rules")]
    rules_dir: PathBuf,

    /// TOML config file
    #[arg(long, env = "RULEFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse a scenario and print the decision
    Analyze(ScenarioArgs),
    /// Analyse a scenario and execute the applicable rules
    Run(ScenarioArgs),
    /// List catalog rules
    Rules {
        /// Only rules in this domain
        #[arg(long)]
        domain: Option<String>,
        /// Only rules in this category
        #[arg(long)]
        category: Option<String>,
        /// Page size
        #[arg(long, default_value_t = ruleflow::service::DEFAULT_RULE_PAGE)]
        limit: usize,
        /// Rules to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// List the built-in actions
    Actions,
}

#[derive(clap::Args)]
struct ScenarioArgs {
    /// Scenario text
    scenario: String,
    /// Context as a JSON object, e.g. '{"credit_score": 680}'
    #[arg(long)]
    context: Option<String>,
    /// Domain hint
    #[arg(long)]
    domain: Option<String>,
    /// Category hint
    #[arg(long)]
    category: Option<String>,
}

impl ScenarioArgs {
    fn context(&self) -> RuleflowResult<Option<JsonMap>> {
        let Some(raw) = &self.context else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(RuleflowError::internal("--context must be a JSON object")),
            Err(e) => Err(RuleflowError::internal(format!("--context is not valid JSON: {e}"))),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> RuleflowResult<Value> {
    serde_json::to_value(value).map_err(|e| RuleflowError::internal(e.to_string()))
}

fn service(cli: &Cli) -> RuleflowResult<RuleService> {
    let config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    }
    .apply_env()?;

    let rules = load_rule_dir(&cli.rules_dir)?;
    info!(rules = rules.len(), dir = %cli.rules_dir.display(), "loaded rules");
    let catalog = InMemoryRuleCatalog::from_rules(rules)?;
    Ok(RuleService::offline(Arc::new(catalog), &config))
}

fn run(cli: &Cli) -> RuleflowResult<Value> {
    match &cli.command {
        Command::Actions => to_json(&ActionRegistry::with_defaults().supported_actions()),
        Command::Rules {
            domain,
            category,
            limit,
            offset,
        } => to_json(&service(cli)?.list_rules(domain.as_deref(), category.as_deref(), *limit, *offset)?),
        Command::Analyze(args) => {
            let context = args.context()?;
            let decision = service(cli)?.analyze(
                &args.scenario,
                context.as_ref(),
                args.domain.as_deref(),
                args.category.as_deref(),
            );
            to_json(&decision)
        }
        Command::Run(args) => {
            let context = args.context()?;
            let outcome = service(cli)?.analyze_and_execute(
                &args.scenario,
                context.as_ref(),
                args.domain.as_deref(),
                args.category.as_deref(),
            );
            to_json(&outcome)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli).and_then(|v| serde_json::to_string_pretty(&v).map_err(|e| RuleflowError::internal(e.to_string()))) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("ruleflow: {err}");
            ExitCode::FAILURE
        }
    }
}
