//! # Quarry Engine
//!
//! Resolves declarative widget definitions into flat result sets. A widget
//! names one or more data sources (subgraphs, IPFS/IPNS documents, HTTP
//! endpoints, inline records); the engine fetches them concurrently,
//! flattens the records into rows, reconciles rows across sources through
//! declared join keys, optionally groups and aggregates them, and attaches
//! computed fields.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use quarry_engine::{EngineSettings, ProviderRegistry, parse_widget_file, resolve_widget_data};
//! use serde_json::Map;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let definition = parse_widget_file("pools.yaml")?;
//! let registry = ProviderRegistry::with_defaults(&EngineSettings::from_env())?;
//! let rows = resolve_widget_data(&definition, &Map::new(), &registry).await?;
//! println!("{} rows", rows.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`requirements`**: which fields each source must return
//! - **`variables`**: `$name` substitution in source configs
//! - **`provider`**: adapters and the kind registry
//! - **`normalize`** / **`transform`**: records to flat rows
//! - **`join`**: cross-source reconciliation
//! - **`aggregate`**: grouping
//! - **`dynamic`** / **`expression`**: computed fields
//! - **`pipeline`**: the stages wired together

use std::{fs, path::Path};

use anyhow::{Context, Result};
use quarry_types::WidgetDefinition;

pub mod aggregate;
pub mod dynamic;
pub mod error;
pub mod expression;
pub mod join;
pub mod normalize;
pub mod pipeline;
pub mod provider;
pub mod requirements;
pub mod settings;
pub mod transform;
pub mod variables;

pub use error::{ProviderError, ResolveError};
pub use pipeline::resolve_widget_data;
pub use provider::{DataProvider, FetchRequest, ProviderRegistry};
pub use requirements::RequiredFields;
pub use settings::EngineSettings;

/// Loads a widget definition from a YAML or JSON file.
///
/// JSON is a subset of YAML, so both formats go through the YAML parser.
///
/// ```rust
/// use quarry_engine::parse_widget_file;
///
/// let temp_dir = tempfile::tempdir()?;
/// let widget_path = temp_dir.path().join("widget.yaml");
/// std::fs::write(&widget_path, r#"
/// type: metric
/// metric:
///   dataKey: total
/// "#)?;
///
/// let definition = parse_widget_file(&widget_path)?;
/// assert!(definition.data.is_none());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn parse_widget_file(file_path: impl AsRef<Path>) -> Result<WidgetDefinition> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("failed to read widget file: {}", file_path.display()))?;
    parse_widget_str(&content).with_context(|| format!("invalid widget definition in {}", file_path.display()))
}

/// Parses a widget definition from YAML or JSON text.
pub fn parse_widget_str(content: &str) -> Result<WidgetDefinition> {
    Ok(serde_yaml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_types::WidgetKind;

    #[test]
    fn parses_json_and_yaml() {
        let json = parse_widget_str(r#"{ "type": "pieChart", "pieChart": { "dataKey": "share", "nameKey": "name" } }"#)
            .expect("json widget");
        assert_eq!(json.kind(), WidgetKind::PieChart);

        let yaml = parse_widget_str(
            "type: table\ntable:\n  columns:\n    - dataKey: id\ndata:\n  source:\n    provider: inline\n    records: []\n",
        )
        .expect("yaml widget");
        assert_eq!(yaml.kind(), WidgetKind::Table);
        assert!(yaml.data.is_some());
    }

    #[test]
    fn reports_file_path_on_failure() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ \"type\": \"gauge\" }").expect("write");

        let error = parse_widget_file(&path).expect_err("unknown widget type");
        assert!(format!("{error:#}").contains("broken.json"));
    }
}
