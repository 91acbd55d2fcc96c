//! Table sink
//!
//! The write contract against entity tables: `replace` models current
//! state (new rows fully supersede prior rows for the same subject),
//! `append` models immutable history (existing keys dedupe to a no-op).
//! Both are all-or-nothing per call. Persistent columnar storage lives
//! behind the trait with the external storage collaborator; the in-memory
//! implementation here is the reference for tests and small runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use ingatlan_common::{IngestError, Result};
use tracing::debug;

use crate::schema::{EntitySchema, Row};

/// Key-addressed table writes, safe under concurrent calls from workers.
pub trait TableSink: Send + Sync {
    /// Overwrite by key. Rows in the same call sharing a key collapse to
    /// last-one-wins. For child tables carrying a scope column, every
    /// existing row of a re-captured subject is superseded, so a child
    /// missing from the new capture disappears instead of lingering.
    fn replace(&self, schema: &EntitySchema, rows: Vec<Row>) -> Result<()>;

    /// Strictly additive. A row whose key already exists is deduplicated
    /// to a no-op; historical fact is never overwritten. Returns the
    /// number of rows actually inserted.
    fn append(&self, schema: &EntitySchema, rows: Vec<Row>) -> Result<usize>;
}

/// In-memory reference sink: one ordered map per table, keyed by the
/// encoded composite key.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<BTreeMap<String, BTreeMap<String, Row>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows of a table, in key order. Missing tables read as empty.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .map(|tables| {
                tables
                    .get(table)
                    .map(|t| t.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .map(|tables| tables.get(table).map(|t| t.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<String, Row>>>> {
        self.tables
            .lock()
            .map_err(|_| IngestError::Storage("sink mutex poisoned".to_string()))
    }
}

impl TableSink for MemorySink {
    fn replace(&self, schema: &EntitySchema, rows: Vec<Row>) -> Result<()> {
        // keys computed up front so a bad row leaves the table untouched
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let key = schema.key_of(&row)?;
            keyed.push((key, row));
        }

        let mut tables = self.lock()?;
        let table = tables.entry(schema.name.to_string()).or_default();

        if let Some(scope_column) = schema.scope {
            let scopes: Vec<String> = keyed
                .iter()
                .filter_map(|(_, row)| row.get(scope_column).map(|v| v.to_string()))
                .collect();
            table.retain(|_, existing| {
                existing
                    .get(scope_column)
                    .map(|v| !scopes.contains(&v.to_string()))
                    .unwrap_or(true)
            });
        }

        let written = keyed.len();
        for (key, row) in keyed {
            table.insert(key, row);
        }

        debug!(table = schema.name, rows = written, "replace committed");
        Ok(())
    }

    fn append(&self, schema: &EntitySchema, rows: Vec<Row>) -> Result<usize> {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let key = schema.key_of(&row)?;
            keyed.push((key, row));
        }

        let mut tables = self.lock()?;
        let table = tables.entry(schema.name.to_string()).or_default();

        let mut inserted = 0;
        for (key, row) in keyed {
            if table.contains_key(&key) {
                continue;
            }
            table.insert(key, row);
            inserted += 1;
        }

        debug!(table = schema.name, rows = inserted, "append committed");
        Ok(inserted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::schema::{Registry, LABEL, REAL_ESTATE, REAL_ESTATE_RECORD};
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_replace_overwrites_by_key() {
        let registry = Registry::standard();
        let schema = registry.get(REAL_ESTATE).unwrap();
        let sink = MemorySink::new();

        sink.replace(schema, vec![row(json!({"id": 1, "area_size": 40.0}))])
            .unwrap();
        sink.replace(schema, vec![row(json!({"id": 1, "area_size": 44.0}))])
            .unwrap();

        let rows = sink.rows(REAL_ESTATE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("area_size"), Some(&json!(44.0)));
    }

    #[test]
    fn test_replace_last_one_wins_within_a_call() {
        let registry = Registry::standard();
        let schema = registry.get(REAL_ESTATE).unwrap();
        let sink = MemorySink::new();

        sink.replace(
            schema,
            vec![
                row(json!({"id": 1, "area_size": 40.0})),
                row(json!({"id": 1, "area_size": 41.0})),
            ],
        )
        .unwrap();

        let rows = sink.rows(REAL_ESTATE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("area_size"), Some(&json!(41.0)));
    }

    #[test]
    fn test_replace_supersedes_subject_scope() {
        let registry = Registry::standard();
        let schema = registry.get(LABEL).unwrap();
        let sink = MemorySink::new();

        sink.replace(
            schema,
            vec![
                row(json!({"property_id": 42, "label": "A"})),
                row(json!({"property_id": 42, "label": "B"})),
                row(json!({"property_id": 7, "label": "X"})),
            ],
        )
        .unwrap();

        sink.replace(
            schema,
            vec![
                row(json!({"property_id": 42, "label": "B"})),
                row(json!({"property_id": 42, "label": "C"})),
            ],
        )
        .unwrap();

        let labels: Vec<String> = sink
            .rows(LABEL)
            .iter()
            .filter(|r| r.get("property_id") == Some(&json!(42)))
            .map(|r| r.get("label").unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(labels, vec!["B".to_string(), "C".to_string()]);

        // the other subject's labels are untouched
        assert!(sink
            .rows(LABEL)
            .iter()
            .any(|r| r.get("property_id") == Some(&json!(7))));
    }

    #[test]
    fn test_append_dedupes_existing_keys() {
        let registry = Registry::standard();
        let schema = registry.get(REAL_ESTATE_RECORD).unwrap();
        let sink = MemorySink::new();

        let snapshot = row(json!({
            "property_id": 42,
            "recorded": "2024-03-01 09:00:00",
            "price": "150 000 Ft"
        }));

        assert_eq!(sink.append(schema, vec![snapshot.clone()]).unwrap(), 1);
        assert_eq!(sink.append(schema, vec![snapshot]).unwrap(), 0);
        assert_eq!(sink.row_count(REAL_ESTATE_RECORD), 1);

        // same subject at a later capture time is a new historical fact
        let later = row(json!({
            "property_id": 42,
            "recorded": "2024-03-02 09:00:00",
            "price": "155 000 Ft"
        }));
        assert_eq!(sink.append(schema, vec![later]).unwrap(), 1);
        assert_eq!(sink.row_count(REAL_ESTATE_RECORD), 2);
    }

    #[test]
    fn test_append_never_overwrites_history() {
        let registry = Registry::standard();
        let schema = registry.get(REAL_ESTATE_RECORD).unwrap();
        let sink = MemorySink::new();

        sink.append(
            schema,
            vec![row(json!({
                "property_id": 1,
                "recorded": "2024-03-01 09:00:00",
                "price": "original"
            }))],
        )
        .unwrap();
        sink.append(
            schema,
            vec![row(json!({
                "property_id": 1,
                "recorded": "2024-03-01 09:00:00",
                "price": "tampered"
            }))],
        )
        .unwrap();

        assert_eq!(
            sink.rows(REAL_ESTATE_RECORD)[0].get("price"),
            Some(&json!("original"))
        );
    }

    #[test]
    fn test_writes_are_atomic_per_call() {
        let registry = Registry::standard();
        let schema = registry.get(LABEL).unwrap();
        let sink = MemorySink::new();

        // second row has no key value, so the whole call must not land
        let result = sink.replace(
            schema,
            vec![
                row(json!({"property_id": 1, "label": "ok"})),
                row(json!({"property_id": 1, "label": null})),
            ],
        );
        assert!(matches!(result, Err(IngestError::MissingKey { .. })));
        assert_eq!(sink.row_count(LABEL), 0);
    }
}
