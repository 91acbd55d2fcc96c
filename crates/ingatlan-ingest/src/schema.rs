//! Entity schema registry
//!
//! Declares the canonical feature set, composite key, and write discipline
//! of every entity table the pipeline produces. The registry is an explicit
//! value built once per run and passed by reference; there are no
//! process-wide table singletons.

use ingatlan_common::{IngestError, Result};
use serde_json::Value;

/// A normalized row, keyed by canonical column names.
pub type Row = serde_json::Map<String, Value>;

/// Write discipline for an entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// New rows fully supersede prior rows sharing the same key; models
    /// "current state as of this capture".
    Replace,
    /// Strictly additive; existing keys are immutable historical fact.
    Append,
}

/// Declared shape of one entity table.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    /// Table name
    pub name: &'static str,
    /// Canonical column list, in storage order
    pub columns: &'static [&'static str],
    /// Composite key columns (subset of `columns`)
    pub key: &'static [&'static str],
    /// Column whose value scopes replace-supersession, for child tables
    /// keyed by `(property_id, discriminator)`: re-ingesting a subject
    /// replaces all of its previous children, not just matching keys.
    pub scope: Option<&'static str>,
    pub write_mode: WriteMode,
}

impl EntitySchema {
    /// Whether `column` belongs to the canonical feature set.
    pub fn declares(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    /// Encode the composite key of `row` as a stable string.
    ///
    /// A null or absent key column is an error: key columns are how rows
    /// are addressed, so they can never be inferred later.
    pub fn key_of(&self, row: &Row) -> Result<String> {
        let mut parts = Vec::with_capacity(self.key.len());
        for column in self.key {
            match row.get(*column) {
                Some(value) if !value.is_null() => parts.push(value.to_string()),
                _ => {
                    return Err(IngestError::MissingKey {
                        entity: self.name.to_string(),
                        column: column.to_string(),
                    })
                }
            }
        }
        Ok(parts.join("\u{1f}"))
    }
}

/// Names of the entity tables, used to address the registry and the sink.
pub const REAL_ESTATE: &str = "real_estate";
pub const REAL_ESTATE_RECORD: &str = "real_estate_record";
pub const SELLER: &str = "seller";
pub const LOCATION: &str = "location";
pub const PRICE: &str = "price";
pub const UTILITY_COST: &str = "utility_cost";
pub const HEATING: &str = "heating";
pub const PARKING: &str = "parking";
pub const LABEL: &str = "label";
pub const CONTACT: &str = "contact";

/// Current observed state of one listing, one row per source-assigned id.
/// Mutated only by full replacement; never partially patched.
const REAL_ESTATE_COLUMNS: &[&str] = &[
    "id",
    "offer_type",
    "property_type",
    "property_subtype",
    "area_size",
    "lot_size",
    "balcony_size",
    "room_count",
    "half_room_count",
    "bathroom_count",
    "floor",
    "building_floor_count",
    "condition_type",
    "view_type",
    "orientation",
    "garden_access",
    "heating_controllable",
    "air_conditioning",
    "accessibility",
    "attic",
    "cellar",
    "insulation",
    "elevator_type",
    "bathroom_toilet",
    "ceiling_height",
    "panel_program",
    "energy_certificate",
    "furnishment",
    "pets_allowed",
    "smoking_allowed",
    "mechanized",
    "ready_to_move_in",
    "available_from",
    "min_tenancy",
    "utilities_included",
    "deposit_amount",
    "city",
    "county",
    "district",
    "street_name",
    "zip_code",
    "latitude",
    "longitude",
    "description",
    "created_at",
    "updated_at",
    "active",
    "is_new_construction",
    "is_project",
    "seller_id",
    "location_id",
];

/// Append-only per-capture snapshot of the listing-card fields.
const REAL_ESTATE_RECORD_COLUMNS: &[&str] = &[
    "property_id",
    "recorded",
    "price",
    "address",
    "area_size",
    "room_count",
    "balcony_size",
    "photo_count",
];

const SELLER_COLUMNS: &[&str] = &["id", "name", "seller_type", "website_url", "agency"];

const LOCATION_COLUMNS: &[&str] = &["id", "name", "location_level", "parent_id"];

const PRICE_COLUMNS: &[&str] = &[
    "property_id",
    "currency",
    "amount",
    "interval_y",
    "interval_m",
    "interval_d",
];

const UTILITY_COST_COLUMNS: &[&str] = &[
    "property_id",
    "currency",
    "amount",
    "interval_y",
    "interval_m",
    "interval_d",
];

const HEATING_COLUMNS: &[&str] = &["property_id", "heating_type"];

const PARKING_COLUMNS: &[&str] = &[
    "property_id",
    "type",
    "condition",
    "amount",
    "currency",
    "interval_y",
    "interval_m",
    "interval_d",
];

const LABEL_COLUMNS: &[&str] = &["property_id", "label"];

const CONTACT_COLUMNS: &[&str] = &["property_id", "phone_number"];

/// Registry of every entity schema for one run.
#[derive(Debug, Clone)]
pub struct Registry {
    entities: Vec<EntitySchema>,
}

impl Registry {
    /// The standard ten-table registry.
    pub fn standard() -> Self {
        let entities = vec![
            EntitySchema {
                name: REAL_ESTATE,
                columns: REAL_ESTATE_COLUMNS,
                key: &["id"],
                scope: None,
                write_mode: WriteMode::Replace,
            },
            EntitySchema {
                name: REAL_ESTATE_RECORD,
                columns: REAL_ESTATE_RECORD_COLUMNS,
                key: &["property_id", "recorded"],
                scope: None,
                write_mode: WriteMode::Append,
            },
            EntitySchema {
                name: SELLER,
                columns: SELLER_COLUMNS,
                key: &["id"],
                scope: None,
                write_mode: WriteMode::Replace,
            },
            EntitySchema {
                name: LOCATION,
                columns: LOCATION_COLUMNS,
                key: &["id"],
                scope: None,
                write_mode: WriteMode::Replace,
            },
            EntitySchema {
                name: PRICE,
                columns: PRICE_COLUMNS,
                key: &["property_id", "currency"],
                scope: Some("property_id"),
                write_mode: WriteMode::Replace,
            },
            EntitySchema {
                name: UTILITY_COST,
                columns: UTILITY_COST_COLUMNS,
                key: &["property_id"],
                scope: Some("property_id"),
                write_mode: WriteMode::Replace,
            },
            EntitySchema {
                name: HEATING,
                columns: HEATING_COLUMNS,
                key: &["property_id", "heating_type"],
                scope: Some("property_id"),
                write_mode: WriteMode::Replace,
            },
            EntitySchema {
                name: PARKING,
                columns: PARKING_COLUMNS,
                key: &["property_id"],
                scope: Some("property_id"),
                write_mode: WriteMode::Replace,
            },
            EntitySchema {
                name: LABEL,
                columns: LABEL_COLUMNS,
                key: &["property_id", "label"],
                scope: Some("property_id"),
                write_mode: WriteMode::Replace,
            },
            EntitySchema {
                name: CONTACT,
                columns: CONTACT_COLUMNS,
                key: &["property_id", "phone_number"],
                scope: Some("property_id"),
                write_mode: WriteMode::Replace,
            },
        ];
        Self { entities }
    }

    pub fn get(&self, name: &str) -> Result<&EntitySchema> {
        self.entities
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| IngestError::UnknownEntity(name.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_registry_has_all_tables() {
        let registry = Registry::standard();
        for name in [
            REAL_ESTATE,
            REAL_ESTATE_RECORD,
            SELLER,
            LOCATION,
            PRICE,
            UTILITY_COST,
            HEATING,
            PARKING,
            LABEL,
            CONTACT,
        ] {
            assert!(registry.get(name).is_ok(), "missing table {name}");
        }
        assert!(registry.get("no_such_table").is_err());
    }

    #[test]
    fn test_keys_are_subsets_of_columns() {
        let registry = Registry::standard();
        for entity in registry.entities() {
            for key_col in entity.key {
                assert!(
                    entity.declares(key_col),
                    "{}: key column {} not declared",
                    entity.name,
                    key_col
                );
            }
            if let Some(scope) = entity.scope {
                assert!(entity.declares(scope));
            }
        }
    }

    #[test]
    fn test_composite_key_encoding() {
        let registry = Registry::standard();
        let price = registry.get(PRICE).unwrap();
        let a = price
            .key_of(&row(&[
                ("property_id", json!(42)),
                ("currency", json!("HUF")),
            ]))
            .unwrap();
        let b = price
            .key_of(&row(&[
                ("property_id", json!(42)),
                ("currency", json!("EUR")),
            ]))
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_null_key_column_rejected() {
        let registry = Registry::standard();
        let price = registry.get(PRICE).unwrap();
        let err = price
            .key_of(&row(&[
                ("property_id", json!(42)),
                ("currency", Value::Null),
            ]))
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingKey { .. }));
    }

    #[test]
    fn test_real_estate_declares_fk_columns() {
        let registry = Registry::standard();
        let subject = registry.get(REAL_ESTATE).unwrap();
        assert!(subject.declares("seller_id"));
        assert!(subject.declares("location_id"));
        assert_eq!(subject.write_mode, WriteMode::Replace);

        let record = registry.get(REAL_ESTATE_RECORD).unwrap();
        assert_eq!(record.write_mode, WriteMode::Append);
    }
}
