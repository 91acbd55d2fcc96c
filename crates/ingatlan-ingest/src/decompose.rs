//! Entity decomposition
//!
//! Expands the nested, optionally-list-valued sub-structures of normalized
//! subject rows into rows of child entities, each stamped with the parent
//! id, and strips the routed fields off the parent. Absent or empty
//! sub-structures yield zero rows, never an error.

use serde_json::Value;

use crate::normalize::snake_keys;
use crate::schema::{Row, CONTACT, HEATING, LABEL, PARKING, PRICE, SELLER, UTILITY_COST};

/// Driving field on the normalized parent row, the entity it feeds, and
/// the per-row expansion. Order matters only for reproducible output.
type ChildParser = (&'static str, &'static str, fn(&Value, &Value) -> Vec<Row>);

const PARSER_MAPPING: &[ChildParser] = &[
    ("utility_costs", UTILITY_COST, parse_utility_cost),
    ("prices", PRICE, parse_price),
    ("contact_phone_numbers", CONTACT, parse_contact),
    ("heating_types", HEATING, parse_heating),
    ("parking", PARKING, parse_parking),
    ("labels", LABEL, parse_label),
    ("seller", SELLER, parse_seller),
];

/// Source columns the site exposes but no entity declares. Dropped from
/// the parent before the drift check ever sees them.
const UNUSED_COLUMNS: &[&str] = &[
    "stripped_photos",
    "photo_url",
    "rank",
    "has_rank",
    "rank_sum",
    "photos",
    "parking_price",
    "links",
    "area_prices",
    "street_number",
    "street_number_coordinates",
];

/// Result of decomposing one batch of normalized subject rows.
#[derive(Debug, Default)]
pub struct Decomposition {
    /// Parent rows with routed and known-unused fields removed
    pub parents: Vec<Row>,
    /// Child rows per entity, only for entities whose parser produced any
    pub children: Vec<(&'static str, Vec<Row>)>,
}

/// Decompose a batch of normalized subject rows into parent and child rows.
///
/// A child parser runs for the batch iff at least one row carries a truthy
/// driving field; rows without the field then naturally contribute zero
/// children. This is a batch-level short-circuit, not a per-row one.
pub fn decompose_batch(subjects: Vec<Row>) -> Decomposition {
    let mut children: Vec<(&'static str, Vec<Row>)> = Vec::new();

    for (field, entity, parse) in PARSER_MAPPING {
        let any_signal = subjects
            .iter()
            .any(|row| row.get(*field).map(is_truthy).unwrap_or(false));
        if !any_signal {
            continue;
        }

        let mut rows = Vec::new();
        for subject in &subjects {
            let Some(value) = subject.get(*field) else {
                continue;
            };
            let property_id = subject.get("id").cloned().unwrap_or(Value::Null);
            rows.extend(parse(&property_id, value));
        }
        if !rows.is_empty() {
            children.push((*entity, rows));
        }
    }

    let parents = subjects
        .into_iter()
        .map(|mut row| {
            for (field, _, _) in PARSER_MAPPING {
                row.remove(*field);
            }
            for column in UNUSED_COLUMNS {
                row.remove(*column);
            }
            row
        })
        .collect();

    Decomposition { parents, children }
}

/// Location hierarchy rows decompose from their own embedded blob, keyed
/// by their own source-assigned id rather than the subject's.
pub fn decompose_locations(locations: &[Row]) -> Vec<Row> {
    locations.iter().map(snake_keys).collect()
}

/// Pandas-style truthiness: null, zero, and empty containers carry no
/// signal for the batch short-circuit.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Flatten a nested `interval` object ({y, m, d} period components) into
/// distinctly prefixed sibling columns. Downstream storage is flat, so a
/// nested object must never survive here.
fn flatten_interval(row: &mut Row, drop_null_components: bool) {
    let Some(interval) = row.remove("interval") else {
        return;
    };
    if let Value::Object(components) = interval {
        for (component, value) in components {
            if drop_null_components && value.is_null() {
                continue;
            }
            row.insert(format!("interval_{component}"), value);
        }
    }
}

fn parse_utility_cost(property_id: &Value, value: &Value) -> Vec<Row> {
    let Value::Object(cost) = value else {
        return Vec::new();
    };
    let mut row = snake_keys(cost);
    flatten_interval(&mut row, false);
    row.insert("property_id".to_string(), property_id.clone());
    vec![row]
}

fn parse_price(property_id: &Value, value: &Value) -> Vec<Row> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(price) => {
                let mut row = snake_keys(price);
                flatten_interval(&mut row, false);
                row.insert("property_id".to_string(), property_id.clone());
                Some(row)
            }
            _ => None,
        })
        .collect()
}

fn parse_contact(property_id: &Value, value: &Value) -> Vec<Row> {
    let numbers = match value {
        Value::Object(contact) => contact.get("numbers"),
        _ => None,
    };
    let Some(Value::Array(numbers)) = numbers else {
        return Vec::new();
    };
    numbers
        .iter()
        .filter(|n| !n.is_null())
        .map(|number| {
            let mut row = Row::new();
            row.insert("property_id".to_string(), property_id.clone());
            row.insert("phone_number".to_string(), number.clone());
            row
        })
        .collect()
}

fn parse_heating(property_id: &Value, value: &Value) -> Vec<Row> {
    let Value::Array(types) = value else {
        return Vec::new();
    };
    types
        .iter()
        .filter(|t| !t.is_null())
        .map(|heating_type| {
            let mut row = Row::new();
            row.insert("property_id".to_string(), property_id.clone());
            row.insert("heating_type".to_string(), heating_type.clone());
            row
        })
        .collect()
}

fn parse_parking(property_id: &Value, value: &Value) -> Vec<Row> {
    let Value::Object(parking) = value else {
        return Vec::new();
    };
    let mut row = snake_keys(parking);

    // nested price object becomes sibling columns before its interval does
    if let Some(Value::Object(price)) = row.remove("price") {
        for (key, val) in snake_keys(&price) {
            row.insert(key, val);
        }
    }
    flatten_interval(&mut row, true);
    row.insert("property_id".to_string(), property_id.clone());
    vec![row]
}

fn parse_label(property_id: &Value, value: &Value) -> Vec<Row> {
    let Value::Array(labels) = value else {
        return Vec::new();
    };
    labels
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(label) => {
                let mut row = Row::new();
                row.insert("property_id".to_string(), property_id.clone());
                row.insert(
                    "label".to_string(),
                    label.get("name").cloned().unwrap_or(Value::Null),
                );
                // `slug` is a display artifact; intentionally not kept
                Some(row)
            }
            _ => None,
        })
        .collect()
}

fn parse_seller(_property_id: &Value, value: &Value) -> Vec<Row> {
    let Value::Object(seller) = value else {
        return Vec::new();
    };
    let mut row = snake_keys(seller);

    let agency = match row.remove("office") {
        Some(Value::Object(office)) => office.get("name").cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    };
    row.insert("agency".to_string(), agency);
    row.remove("photo_url");
    row.remove("project_logo_url");
    vec![row]
}
