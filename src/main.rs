use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value as Json;

use ormplan::config::PlanConfig;
use ormplan::filter::json::{entity_filter_from_json, expression_from_json, order_by_from_json};
use ormplan::filter::EntityFilter;
use ormplan::metadata::Schema;
use ormplan::query_plan::{parse_find_query, FindOptions, SoftDeletes};
use ormplan::rewrite::JoinStrategy;
use ormplan::sql_generator;

/// ormplan - compile an entity filter into SQL for inspection
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Entity schema YAML
    #[arg(long)]
    schema: PathBuf,

    /// Entity type to find
    #[arg(long)]
    entity: String,

    /// Filter JSON: `{ "where": {...}, "conditions": {...}, "orderBy": {...}, "softDeletes": "include" }`
    #[arg(long)]
    filter: PathBuf,

    /// Collection join strategy: exists, lateral, lateral:force or none
    #[arg(long)]
    strategy: Option<JoinStrategy>,

    /// Rewrite every collection join with LATERAL regardless of siblings
    #[arg(long)]
    force_lateral: bool,

    /// Print the plan as JSON instead of SQL
    #[arg(long)]
    json: bool,

    /// Plan configuration YAML (defaults to ORMPLAN_* environment variables)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn read_request(path: &Path) -> Result<(EntityFilter, FindOptions)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading filter {}", path.display()))?;
    let request: Json = serde_json::from_str(&content).context("parsing filter JSON")?;

    let filter = match request.get("where") {
        Some(value) => entity_filter_from_json(value)?,
        None => EntityFilter::new(),
    };
    let mut options = FindOptions::default();
    if let Some(value) = request.get("conditions") {
        options.conditions = Some(expression_from_json(value)?);
    }
    if let Some(value) = request.get("orderBy") {
        options.order_by = order_by_from_json(value)?;
    }
    if request.get("softDeletes").and_then(Json::as_str) == Some("include") {
        options.soft_deletes = SoftDeletes::Include;
    }
    Ok((filter, options))
}

fn main() -> Result<()> {
    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PlanConfig::from_yaml_file(path),
        None => PlanConfig::from_env(),
    }
    .context("loading plan configuration")?;
    let schema = Schema::from_yaml_file(&cli.schema)
        .with_context(|| format!("loading schema {}", cli.schema.display()))?;
    let (filter, mut options) = read_request(&cli.filter)?;

    options.strategy = match (cli.strategy, cli.force_lateral) {
        (_, true) => Some(JoinStrategy::Lateral { force: true }),
        (strategy, false) => strategy,
    };
    log::info!(
        "compiling {} with strategy {}",
        cli.entity,
        options.strategy.unwrap_or(config.default_strategy)
    );

    let plan = parse_find_query(&schema, &config, &cli.entity, &filter, &options)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let rendered = sql_generator::to_sql(&plan)?;
    println!("{}", rendered.sql);
    for (i, value) in rendered.bindings.iter().enumerate() {
        println!("  ${} = {}", i + 1, value);
    }
    Ok(())
}
