use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use fieldmesh_engine::{CancellationToken, EngineConfig, FixtureGateway, Resolver, default_config_path, plan::CompiledStrategy};
use fieldmesh_types::ParameterMap;
use serde_json::{Value, json};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("validate", sub)) => run_validate(sub),
        Some(("resolve", sub)) => run_resolve(sub).await,
        _ => bail!("expected a subcommand; see --help"),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .action(ArgAction::Set)
        .value_name("PATH")
        .help("Engine configuration file (defaults to $FIELDMESH_CONFIG_PATH or the user config dir)");

    Command::new("fieldmesh")
        .about("Resolve entity fields from heterogeneous data providers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("validate")
                .about("Load and validate the engine configuration")
                .arg(config_arg.clone()),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve one entity against a fixture file")
                .arg(Arg::new("entity").required(true).value_name("ENTITY").help("Entity type to resolve"))
                .arg(
                    Arg::new("param")
                        .long("param")
                        .short('p')
                        .action(ArgAction::Append)
                        .value_name("KEY=VALUE")
                        .help("Canonical parameter; repeat for several"),
                )
                .arg(
                    Arg::new("fixtures")
                        .long("fixtures")
                        .short('f')
                        .required(true)
                        .action(ArgAction::Set)
                        .value_name("FILE")
                        .help("YAML/JSON map of endpoint id to raw payload or {\"error\": kind}"),
                )
                .arg(config_arg),
        )
}

fn config_path(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

fn load_config(matches: &ArgMatches) -> Result<EngineConfig> {
    let path = config_path(matches);
    debug!(path = %path.display(), "loading configuration");
    EngineConfig::load(&path).with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn run_validate(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;

    let endpoints: Vec<Value> = config
        .registry()
        .iter()
        .map(|descriptor| {
            json!({
                "id": descriptor.id,
                "provider": descriptor.provider,
                "description": descriptor.description,
                "layout": descriptor.layout,
                "fields": descriptor.fields.keys().collect::<Vec<_>>(),
            })
        })
        .collect();
    let entities: Vec<Value> = config
        .plans()
        .entity_types()
        .filter_map(|entity_type| config.plans().get(entity_type))
        .map(|plan| {
            let strategy = match plan.strategy() {
                CompiledStrategy::Global { .. } => "global_chain",
                CompiledStrategy::PerField { .. } => "per_field_chain",
            };
            json!({
                "entity": plan.entity_type(),
                "strategy": strategy,
                "fields": plan.declared_fields(),
                "max_depth": plan.max_depth(),
            })
        })
        .collect();

    let summary = json!({
        "valid": true,
        "settings": {
            "max_concurrent_fetches": config.settings().max_concurrent_fetches,
            "fetch_timeout_ms": config.settings().fetch_timeout_ms,
        },
        "endpoints": endpoints,
        "entities": entities,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_resolve(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let entity = matches.get_one::<String>("entity").context("missing ENTITY argument")?;
    let fixtures_path = matches.get_one::<String>("fixtures").context("missing --fixtures argument")?;
    let params = parse_params(matches.get_many::<String>("param").into_iter().flatten().map(String::as_str))?;

    let gateway = FixtureGateway::load(Path::new(fixtures_path)).with_context(|| format!("failed to load fixtures from {fixtures_path}"))?;
    let resolver = Resolver::new(config, Arc::new(gateway));

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling resolution");
            ctrl_c_token.cancel();
        }
    });

    let resolution = resolver.resolve_with_cancellation(entity, &params, &token).await?;
    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}

/// Parses repeated `key=value` arguments; values are kept as strings.
fn parse_params<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<ParameterMap> {
    let mut params = ParameterMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid --param '{pair}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid --param '{pair}': key is empty");
        }
        params.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_keep_leading_zeros() {
        let params = parse_params(["symbol=002156", "start_date=20240101"]).expect("params");
        assert_eq!(params.get("symbol"), Some(&json!("002156")));
        assert_eq!(params.get("start_date"), Some(&json!("20240101")));
    }

    #[test]
    fn params_require_key_value_pairs() {
        assert!(parse_params(["symbol"]).is_err());
        assert!(parse_params(["=600000"]).is_err());
        let params = parse_params(["note=a=b"]).expect("value with equals");
        assert_eq!(params.get("note"), Some(&json!("a=b")));
    }

    #[test]
    fn cli_parses_resolve_arguments() {
        let matches = build_cli()
            .try_get_matches_from(["fieldmesh", "resolve", "stock_info", "-p", "symbol=600000", "--fixtures", "f.yaml", "-c", "e.yaml"])
            .expect("matches");
        let (name, sub) = matches.subcommand().expect("subcommand");
        assert_eq!(name, "resolve");
        assert_eq!(config_path(sub), PathBuf::from("e.yaml"));
        assert_eq!(sub.get_one::<String>("entity").map(String::as_str), Some("stock_info"));
    }
}
