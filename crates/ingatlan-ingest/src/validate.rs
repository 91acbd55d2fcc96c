//! Schema validation
//!
//! After decomposition, every surviving column must belong to the entity's
//! declared canonical feature set. Anything else is schema drift: fatal for
//! the batch, with the offending names surfaced for the operator. This
//! system never infers new schema.

use ingatlan_common::{IngestError, Result};
use serde_json::Value;
use tracing::debug;

use crate::schema::{EntitySchema, Row};

/// Validate a batch of rows against the entity's canonical feature set and
/// reindex them onto the canonical column order.
///
/// Columns that are null across the *entire* batch are discarded before the
/// drift check: an optional feature that happens to be empty in this batch
/// is tolerated, while any non-null undeclared column is drift. That
/// asymmetry is deliberate.
pub fn validate_batch(schema: &EntitySchema, rows: Vec<Row>) -> Result<Vec<Row>> {
    let mut drifted: Vec<String> = Vec::new();
    for row in &rows {
        for (column, value) in row {
            if value.is_null() || schema.declares(column) {
                continue;
            }
            if !drifted.iter().any(|c| c == column) {
                drifted.push(column.clone());
            }
        }
    }

    if !drifted.is_empty() {
        drifted.sort();
        return Err(IngestError::SchemaDrift {
            entity: schema.name.to_string(),
            columns: drifted,
        });
    }

    debug!(
        entity = schema.name,
        rows = rows.len(),
        "batch validated against canonical schema"
    );

    Ok(rows.into_iter().map(|row| reindex(schema, row)).collect())
}

/// Project one row onto exactly the canonical column set and order.
/// Missing declared columns become nulls; undeclared all-null residue
/// falls away.
fn reindex(schema: &EntitySchema, mut row: Row) -> Row {
    let mut canonical = Row::new();
    for column in schema.columns {
        let value = row.remove(*column).unwrap_or(Value::Null);
        canonical.insert((*column).to_string(), value);
    }
    canonical
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::schema::{Registry, LABEL, REAL_ESTATE};
    use serde_json::json;

    fn rows(values: &[serde_json::Value]) -> Vec<Row> {
        values
            .iter()
            .map(|v| serde_json::from_value(v.clone()).unwrap())
            .collect()
    }

    #[test]
    fn test_drift_is_fatal_and_names_columns() {
        let registry = Registry::standard();
        let schema = registry.get(REAL_ESTATE).unwrap();

        let err = validate_batch(
            schema,
            rows(&[json!({"id": 1, "area_size": 40.0, "mystery_field": "x"})]),
        )
        .unwrap_err();

        match err {
            IngestError::SchemaDrift { entity, columns } => {
                assert_eq!(entity, REAL_ESTATE);
                assert_eq!(columns, vec!["mystery_field".to_string()]);
            }
            other => panic!("expected schema drift, got {other}"),
        }
    }

    #[test]
    fn test_all_null_unknown_column_is_tolerated() {
        let registry = Registry::standard();
        let schema = registry.get(REAL_ESTATE).unwrap();

        let validated = validate_batch(
            schema,
            rows(&[
                json!({"id": 1, "optional_feature": null}),
                json!({"id": 2, "optional_feature": null}),
            ]),
        )
        .unwrap();

        assert_eq!(validated.len(), 2);
        assert!(!validated[0].contains_key("optional_feature"));
    }

    #[test]
    fn test_any_non_null_unknown_column_is_drift() {
        let registry = Registry::standard();
        let schema = registry.get(REAL_ESTATE).unwrap();

        // null in one row does not excuse the non-null value in the other
        let err = validate_batch(
            schema,
            rows(&[
                json!({"id": 1, "optional_feature": null}),
                json!({"id": 2, "optional_feature": "present"}),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::SchemaDrift { .. }));
    }

    #[test]
    fn test_reindex_fills_missing_columns_with_null() {
        let registry = Registry::standard();
        let schema = registry.get(LABEL).unwrap();

        let validated =
            validate_batch(schema, rows(&[json!({"label": "lift", "property_id": 42})])).unwrap();

        let columns: Vec<&str> = validated[0].keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["property_id", "label"]);
    }

    #[test]
    fn test_reindex_onto_full_canonical_width() {
        let registry = Registry::standard();
        let schema = registry.get(REAL_ESTATE).unwrap();

        let validated = validate_batch(schema, rows(&[json!({"id": 7})])).unwrap();
        assert_eq!(validated[0].len(), schema.columns.len());
        assert_eq!(validated[0].get("seller_id"), Some(&serde_json::Value::Null));
    }
}
