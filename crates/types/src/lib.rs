//! Shared type definitions for Quarry widget resolution.
//!
//! Widget definitions are authored as JSON or YAML documents. The models here
//! preserve authoring order (via `IndexMap`) for sources, joins, aggregations,
//! transforms, and dynamic fields so that resolution is deterministic for a
//! fixed input.

pub mod data;
pub mod widget;

pub use data::{
    AggregateFunction, DataSpec, GroupSpec, NamedTransform, ProviderConfig, ResultSet, Row, SourceMode, TransformSpec,
    UnknownAggregateFunction,
};
pub use widget::{
    AxisSpec, ChartSpec, ColumnSpec, DisplaySpec, MetricSpec, PieChartSpec, SeriesSpec, StoredWidget, TableSpec,
    WidgetDefinition, WidgetDefinitionDocument, WidgetKind, widget_definition_schema,
};
