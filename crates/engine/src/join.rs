//! Reconciling rows from several sources into one result set.
//!
//! The `join` map pairs qualified fields (`X.id` with `Y.id`). Before any row
//! is merged, [`JoinIndex::build`] derives for every mentioned source the
//! list of its own fields and their counterparts. Qualified names resolve by
//! stripping the source key (`X.id` reads field `id`), with the source's
//! `prefix` applied when one is configured.

use indexmap::IndexMap;
use quarry_types::{ResultSet, Row};
use serde_json::Value;
use tracing::warn;

/// One equality a row of the owning source must satisfy against an accumulated row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPair {
    /// Field read from the incoming row.
    pub own_field: String,
    /// Field read from the accumulated row.
    pub counterpart_field: String,
}

/// Per-source join fields, built once from the join map and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinIndex {
    pairs: IndexMap<String, Vec<JoinPair>>,
}

impl JoinIndex {
    /// Builds the index from `join`, registering every pair in both directions.
    ///
    /// `prefix_of` returns the key prefix configured for a source, if any.
    pub fn build<'a>(join: &IndexMap<String, String>, prefix_of: impl Fn(&str) -> Option<&'a str>) -> Self {
        let mut pairs: IndexMap<String, Vec<JoinPair>> = IndexMap::new();
        for (left, right) in join {
            let (Some((left_source, left_field)), Some((right_source, right_field))) =
                (split_qualified(left), split_qualified(right))
            else {
                warn!(left = %left, right = %right, "ignoring join entry without a source qualifier");
                continue;
            };
            let left_resolved = resolve_field(left_field, prefix_of(left_source));
            let right_resolved = resolve_field(right_field, prefix_of(right_source));

            pairs.entry(left_source.to_string()).or_default().push(JoinPair {
                own_field: left_resolved.clone(),
                counterpart_field: right_resolved.clone(),
            });
            let reverse = JoinPair {
                own_field: right_resolved,
                counterpart_field: left_resolved,
            };
            let right_pairs = pairs.entry(right_source.to_string()).or_default();
            if !right_pairs.contains(&reverse) {
                right_pairs.push(reverse);
            }
        }
        Self { pairs }
    }

    /// Join fields owned by `source_key`; empty when the source takes part in no join.
    pub fn pairs_for(&self, source_key: &str) -> &[JoinPair] {
        self.pairs.get(source_key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every source key mentioned by the join map, in first-seen order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn split_qualified(field: &str) -> Option<(&str, &str)> {
    let (source, field) = field.trim().split_once('.')?;
    if source.is_empty() || field.is_empty() {
        return None;
    }
    Some((source, field))
}

fn resolve_field(field: &str, prefix: Option<&str>) -> String {
    match prefix.map(str::trim).filter(|prefix| !prefix.is_empty()) {
        Some(prefix) => format!("{prefix}{field}"),
        None => field.to_string(),
    }
}

/// How incoming rows are matched against already accumulated rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Merge onto the first accumulated row satisfying every join equality,
    /// otherwise append. Later sources overwrite colliding fields.
    #[default]
    FirstMatchMerge,
}

impl JoinStrategy {
    /// Folds one incoming row into `accumulated`.
    pub fn absorb(self, accumulated: &mut ResultSet, incoming: Row, pairs: &[JoinPair]) {
        match self {
            Self::FirstMatchMerge => first_match_merge(accumulated, incoming, pairs),
        }
    }

    /// Reconciles per-source rows in the given order.
    pub fn reconcile<I>(self, index: &JoinIndex, sources: I) -> ResultSet
    where
        I: IntoIterator<Item = (String, Vec<Row>)>,
    {
        let mut accumulated = ResultSet::new();
        for (source_key, rows) in sources {
            let pairs = index.pairs_for(&source_key);
            for row in rows {
                self.absorb(&mut accumulated, row, pairs);
            }
        }
        accumulated
    }
}

fn first_match_merge(accumulated: &mut ResultSet, incoming: Row, pairs: &[JoinPair]) {
    if !pairs.is_empty()
        && let Some(target) = accumulated.iter_mut().find(|candidate| rows_match(&incoming, candidate, pairs))
    {
        for (key, value) in incoming {
            target.insert(key, value);
        }
        return;
    }
    accumulated.push(incoming);
}

fn rows_match(incoming: &Row, candidate: &Row, pairs: &[JoinPair]) -> bool {
    pairs.iter().all(|pair| {
        match (incoming.get(&pair.own_field), candidate.get(&pair.counterpart_field)) {
            (Some(own), Some(counterpart)) if !own.is_null() && !counterpart.is_null() => join_values_equal(own, counterpart),
            _ => false,
        }
    })
}

fn join_values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64() == right.as_f64(),
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Row> {
        serde_json::from_value(value).expect("rows")
    }

    fn join(value: Value) -> IndexMap<String, String> {
        serde_json::from_value(value).expect("join map")
    }

    #[test]
    fn index_registers_both_directions() {
        let index = JoinIndex::build(&join(json!({ "X.id": "Y.poolId" })), |_| None);
        assert_eq!(
            index.pairs_for("X"),
            &[JoinPair {
                own_field: "id".into(),
                counterpart_field: "poolId".into()
            }]
        );
        assert_eq!(
            index.pairs_for("Y"),
            &[JoinPair {
                own_field: "poolId".into(),
                counterpart_field: "id".into()
            }]
        );
        assert!(index.pairs_for("Z").is_empty());
    }

    #[test]
    fn merges_matching_rows_and_appends_the_rest() {
        let index = JoinIndex::build(&join(json!({ "X.id": "Y.id" })), |_| None);
        let result = JoinStrategy::FirstMatchMerge.reconcile(
            &index,
            vec![
                ("X".to_string(), rows(json!([{ "id": 1, "v": "x1" }]))),
                ("Y".to_string(), rows(json!([{ "id": 1, "w": "y1" }, { "id": 2, "w": "y2" }]))),
            ],
        );
        assert_eq!(result, rows(json!([{ "id": 1, "v": "x1", "w": "y1" }, { "id": 2, "w": "y2" }])));
    }

    #[test]
    fn null_or_missing_values_never_match_but_zero_does() {
        let index = JoinIndex::build(&join(json!({ "X.id": "Y.id" })), |_| None);
        let result = JoinStrategy::FirstMatchMerge.reconcile(
            &index,
            vec![
                ("X".to_string(), rows(json!([{ "id": null, "a": 1 }, { "id": 0, "a": 2 }]))),
                ("Y".to_string(), rows(json!([{ "id": null, "b": 1 }, { "b": 2 }, { "id": 0, "b": 3 }]))),
            ],
        );
        assert_eq!(result.len(), 4);
        assert_eq!(result[1], rows(json!([{ "id": 0, "a": 2, "b": 3 }]))[0]);
    }

    #[test]
    fn source_without_join_fields_is_appended() {
        let index = JoinIndex::build(&IndexMap::new(), |_| None);
        let result = JoinStrategy::FirstMatchMerge.reconcile(
            &index,
            vec![
                ("X".to_string(), rows(json!([{ "id": 1 }]))),
                ("Y".to_string(), rows(json!([{ "id": 1 }]))),
            ],
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn first_match_wins_and_later_fields_overwrite() {
        let index = JoinIndex::build(&join(json!({ "X.k": "Y.k" })), |_| None);
        let result = JoinStrategy::FirstMatchMerge.reconcile(
            &index,
            vec![
                ("X".to_string(), rows(json!([{ "k": "a", "n": 1 }, { "k": "a", "n": 2 }]))),
                ("Y".to_string(), rows(json!([{ "k": "a", "n": 9 }]))),
            ],
        );
        assert_eq!(result, rows(json!([{ "k": "a", "n": 9 }, { "k": "a", "n": 2 }])));
    }

    #[test]
    fn prefixes_apply_to_join_fields() {
        let index = JoinIndex::build(&join(json!({ "X.id": "Y.id" })), |source| (source == "Y").then_some("y_"));
        assert_eq!(index.pairs_for("X")[0].counterpart_field, "y_id");
        assert_eq!(index.pairs_for("Y")[0].own_field, "y_id");
    }
}
