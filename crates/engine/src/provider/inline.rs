//! Records embedded directly in the source configuration.
//!
//! Useful for static reference tables joined against live sources and for
//! previewing a widget without network access.

use async_trait::async_trait;
use quarry_util::extract_collection_items;
use serde_json::Value;
use tracing::debug;

use super::{DataProvider, FetchRequest};
use crate::error::ProviderError;

const RECORDS_KEY: &str = "records";

#[derive(Debug, Clone, Copy, Default)]
pub struct InlineProvider;

#[async_trait]
impl DataProvider for InlineProvider {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<Value>, ProviderError> {
        let records = request
            .config
            .get(RECORDS_KEY)
            .cloned()
            .ok_or_else(|| ProviderError::config(format!("{} is missing required key '{RECORDS_KEY}'", request.label())))?;
        let records = extract_collection_items(records, request.config.get_str("path"));
        debug!(source = request.label(), record_count = records.len(), "inline records loaded");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_types::ProviderConfig;
    use serde_json::json;

    #[tokio::test]
    async fn returns_embedded_records() {
        let config = ProviderConfig::from_value(json!({
            "provider": "inline",
            "records": [{ "id": "a" }, { "id": "b" }]
        }))
        .expect("config");
        let records = InlineProvider.fetch(FetchRequest::new(&config, &[])).await.expect("records");
        assert_eq!(records, vec![json!({ "id": "a" }), json!({ "id": "b" })]);
    }

    #[tokio::test]
    async fn requires_records_key() {
        let config = ProviderConfig::from_value(json!({ "provider": "inline" })).expect("config");
        let error = InlineProvider.fetch(FetchRequest::new(&config, &[])).await.expect_err("missing records");
        assert!(matches!(error, ProviderError::Config(_)));
    }
}
