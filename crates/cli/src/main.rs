use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use quarry_api::QuarryClient;
use quarry_engine::{EngineSettings, ProviderRegistry, RequiredFields, parse_widget_file, resolve_widget_data};
use quarry_types::{ResultSet, SourceMode, WidgetDefinition, widget_definition_schema};
use quarry_util::UserPreferences;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Resolve widget definitions into tabular data.
#[derive(Parser, Debug)]
#[command(name = "quarry", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a widget definition file (YAML or JSON) and print its rows
    Resolve {
        file: PathBuf,
        /// Variable binding `name=value`; values are parsed as JSON when possible
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
        vars: Vec<(String, Value)>,
        #[arg(long)]
        pretty: bool,
    },
    /// Print the fields each source of a widget will be asked for
    Fields { file: PathBuf },
    /// Fetch a stored widget from the backend API and resolve it
    Widget {
        id: String,
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
        vars: Vec<(String, Value)>,
        #[arg(long)]
        pretty: bool,
    },
    /// Print the widget definition JSON schema
    Schema {
        /// Fetch the schema from the backend API instead of generating it
        #[arg(long)]
        remote: bool,
    },
    /// Introspect a subgraph and print its schema
    SubgraphSchema { id: String },
    /// Manage saved preferences
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Save a Graph API key, overriding QUARRY_GRAPH_API_KEY
    SetGraphKey { key: String },
    /// Remove the saved Graph API key
    ClearGraphKey,
    /// Show where preferences live and what is set
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Resolve { file, vars, pretty } => {
            let definition = parse_widget_file(&file)?;
            let rows = resolve(&definition, vars).await?;
            print_json(&serde_json::to_value(rows)?, pretty)
        }
        Command::Fields { file } => {
            let definition = parse_widget_file(&file)?;
            print_json(&required_fields_report(&definition), true)
        }
        Command::Widget { id, vars, pretty } => {
            let client = QuarryClient::from_env()?;
            let widget = client.get_widget(&id).await?;
            debug!(widget_id = %widget.id, title = ?widget.title, "stored widget loaded");
            let rows = resolve(&widget.definition, vars).await?;
            print_json(&serde_json::to_value(rows)?, pretty)
        }
        Command::Schema { remote } => {
            let schema = if remote {
                QuarryClient::from_env()?.widget_schema().await?
            } else {
                widget_definition_schema()
            };
            print_json(&schema, true)
        }
        Command::SubgraphSchema { id } => {
            let registry = build_registry()?;
            let graph = registry.graph().ok_or_else(|| anyhow!("graph provider is not registered"))?;
            let schema = graph
                .subgraph_schema(&id)
                .await
                .with_context(|| format!("failed to introspect subgraph {id}"))?;
            print_json(&schema, true)
        }
        Command::Config { action } => run_config(action),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_variable(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, found '{raw}'"))?;
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        return Err(format!("variable name is empty in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn open_preferences() -> UserPreferences {
    UserPreferences::new().unwrap_or_else(|error| {
        warn!(error = %error, "preferences unavailable; continuing without saved settings");
        UserPreferences::ephemeral()
    })
}

fn build_registry() -> Result<ProviderRegistry> {
    let mut settings = EngineSettings::from_env();
    settings.apply_preferences(&open_preferences());
    ProviderRegistry::with_defaults(&settings)
}

async fn resolve(definition: &WidgetDefinition, vars: Vec<(String, Value)>) -> Result<ResultSet> {
    let registry = build_registry()?;
    let variables = vars.into_iter().collect::<Map<String, Value>>();
    resolve_widget_data(definition, &variables, &registry).await.map_err(|error| {
        if error.is_not_found() {
            anyhow!(error).context("content not found; it may be unpublished or not yet propagated")
        } else {
            anyhow!(error)
        }
    })
}

fn required_fields_report(definition: &WidgetDefinition) -> Value {
    let required = RequiredFields::collect(definition);
    let mode = definition.data.as_ref().and_then(|data| data.mode());
    let per_source = match mode {
        Some(SourceMode::Single(config)) => json!({ "source": required.for_single_source(config) }),
        Some(SourceMode::Multi(sources)) => sources
            .keys()
            .map(|source_key| (source_key.clone(), json!(required.for_source(source_key, sources))))
            .collect::<Map<String, Value>>()
            .into(),
        None => Value::Object(Map::new()),
    };
    json!({
        "required": required.iter().collect::<Vec<_>>(),
        "sources": per_source,
    })
}

fn run_config(action: ConfigAction) -> Result<()> {
    let preferences = UserPreferences::new().context("failed to open preferences")?;
    match action {
        ConfigAction::SetGraphKey { key } => {
            preferences.set_graph_api_key(Some(key))?;
            println!("Graph API key saved to {}", preferences.path().display());
        }
        ConfigAction::ClearGraphKey => {
            preferences.clear_graph_api_key()?;
            println!("Graph API key cleared");
        }
        ConfigAction::Show => {
            print_json(
                &json!({
                    "path": preferences.path().display().to_string(),
                    "graphApiKeySet": preferences.graph_api_key().is_some(),
                }),
                true,
            )?;
        }
    }
    Ok(())
}

fn print_json(value: &Value, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_parse_as_json_when_possible() {
        assert_eq!(parse_variable("first=10").expect("var"), ("first".to_string(), json!(10)));
        assert_eq!(parse_variable("$pool=0xabc").expect("var"), ("pool".to_string(), json!("0xabc")));
        assert_eq!(parse_variable("ids=[1,2]").expect("var"), ("ids".to_string(), json!([1, 2])));
        assert!(parse_variable("novalue").is_err());
        assert!(parse_variable("=1").is_err());
    }

    #[test]
    fn reports_fields_per_source() {
        let definition: WidgetDefinition = serde_json::from_value(json!({
            "type": "table",
            "table": { "columns": [{ "dataKey": "id" }, { "dataKey": "Y.w" }] },
            "data": {
                "sources": {
                    "X": { "provider": "inline", "records": [] },
                    "Y": { "provider": "inline", "records": [] }
                },
                "join": { "X.id": "Y.id" }
            }
        }))
        .expect("definition");

        let report = required_fields_report(&definition);
        assert_eq!(report["sources"]["X"], json!(["id"]));
        assert_eq!(report["sources"]["Y"], json!(["id", "w"]));
    }

    #[test]
    fn cli_parses_repeated_vars() {
        let cli = Cli::try_parse_from(["quarry", "resolve", "w.yaml", "--var", "a=1", "--var", "b=x", "--pretty"]).expect("cli");
        match cli.command {
            Command::Resolve { vars, pretty, .. } => {
                assert_eq!(vars.len(), 2);
                assert!(pretty);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
