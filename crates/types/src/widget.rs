//! Widget definitions and their display configurations.
//!
//! On the wire a widget definition looks like
//! `{ "type": "chart", "data": {...}, "chart": {...} }`: the `type` selects
//! which display block is meaningful. In memory the display block is a closed
//! [`DisplaySpec`] enum so consumers never branch on type strings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::DataSpec;

/// Display kinds a widget can render as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum WidgetKind {
    Chart,
    PieChart,
    Table,
    Metric,
}

/// A resolved widget definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WidgetDefinitionDocument", into = "WidgetDefinitionDocument")]
pub struct WidgetDefinition {
    /// Data section. When absent, resolution yields an empty result.
    pub data: Option<DataSpec>,
    /// Display configuration for the declared widget kind.
    pub display: DisplaySpec,
}

impl WidgetDefinition {
    pub fn kind(&self) -> WidgetKind {
        self.display.kind()
    }
}

/// Wire shape of a widget definition.
///
/// Only the display block matching `type` survives conversion into
/// [`WidgetDefinition`]; a missing block yields that kind's default.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDefinitionDocument {
    #[serde(rename = "type")]
    pub kind: WidgetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pie_chart: Option<PieChartSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricSpec>,
}

impl From<WidgetDefinitionDocument> for WidgetDefinition {
    fn from(document: WidgetDefinitionDocument) -> Self {
        let display = match document.kind {
            WidgetKind::Chart => DisplaySpec::Chart(document.chart.unwrap_or_default()),
            WidgetKind::PieChart => DisplaySpec::PieChart(document.pie_chart.unwrap_or_default()),
            WidgetKind::Table => DisplaySpec::Table(document.table.unwrap_or_default()),
            WidgetKind::Metric => DisplaySpec::Metric(document.metric.unwrap_or_default()),
        };
        Self {
            data: document.data,
            display,
        }
    }
}

impl From<WidgetDefinition> for WidgetDefinitionDocument {
    fn from(definition: WidgetDefinition) -> Self {
        let mut document = WidgetDefinitionDocument {
            kind: definition.display.kind(),
            data: definition.data,
            chart: None,
            pie_chart: None,
            table: None,
            metric: None,
        };
        match definition.display {
            DisplaySpec::Chart(chart) => document.chart = Some(chart),
            DisplaySpec::PieChart(pie_chart) => document.pie_chart = Some(pie_chart),
            DisplaySpec::Table(table) => document.table = Some(table),
            DisplaySpec::Metric(metric) => document.metric = Some(metric),
        }
        document
    }
}

/// Display configuration, one variant per widget kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplaySpec {
    Chart(ChartSpec),
    PieChart(PieChartSpec),
    Table(TableSpec),
    Metric(MetricSpec),
}

impl DisplaySpec {
    pub fn kind(&self) -> WidgetKind {
        match self {
            Self::Chart(_) => WidgetKind::Chart,
            Self::PieChart(_) => WidgetKind::PieChart,
            Self::Table(_) => WidgetKind::Table,
            Self::Metric(_) => WidgetKind::Metric,
        }
    }

    /// Every row field the display reads, in declaration order.
    ///
    /// Formatter names (`transform` on axes and columns) are not fields and are
    /// not returned.
    pub fn data_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        match self {
            Self::Chart(chart) => {
                keys.extend(chart.x_axis.data_key.as_deref());
                if let Some(y_axis) = chart.y_axis.as_ref() {
                    keys.extend(y_axis.data_key.as_deref());
                }
                for series in chart.lines.iter().chain(&chart.areas).chain(&chart.bars) {
                    keys.push(series.data_key.as_str());
                }
            }
            Self::PieChart(pie_chart) => {
                keys.push(pie_chart.data_key.as_str());
                keys.extend(pie_chart.name_key.as_deref());
                keys.extend(pie_chart.label_key.as_deref());
            }
            Self::Table(table) => {
                keys.extend(table.columns.iter().map(|column| column.data_key.as_str()));
            }
            Self::Metric(metric) => keys.push(metric.data_key.as_str()),
        }
        keys.retain(|key| !key.trim().is_empty());
        keys
    }
}

/// Composed line/area/bar chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    #[serde(default)]
    pub x_axis: AxisSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<AxisSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<SeriesSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub areas: Vec<SeriesSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bars: Vec<SeriesSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AxisSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
    /// Formatter name used by the renderer for tick labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSpec {
    pub data_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PieChartSpec {
    #[serde(default)]
    pub data_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    pub data_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

/// Single headline value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    #[serde(default)]
    pub data_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// A widget as stored by the backend API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWidget {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub definition: WidgetDefinition,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// JSON schema for the widget definition wire format.
pub fn widget_definition_schema() -> Value {
    let schema = schemars::schema_for!(WidgetDefinitionDocument);
    serde_json::to_value(schema).unwrap_or(Value::Null)
}
