use crate::ast::{Record, Schema, Value};
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;

/// Hydrates records into a JSON object mapping each alias to its records.
///
/// Records of a known type become objects keyed by field name. Records whose
/// alias is unknown (lax mode only) stay positional arrays.
pub(crate) fn to_value(schema: &Schema, records: &[Record]) -> Json {
    let mut groups: BTreeMap<&str, Vec<Json>> = BTreeMap::new();
    for record in records {
        let hydrated = match schema.get(&record.alias) {
            Some(type_def) => Json::Object(
                type_def
                    .fields
                    .iter()
                    .zip(&record.values)
                    .map(|(field, value)| (field.name.clone(), to_json(value)))
                    .collect(),
            ),
            None => Json::Array(record.values.iter().map(to_json).collect()),
        };
        groups.entry(record.alias.as_str()).or_default().push(hydrated);
    }
    Json::Object(
        groups
            .into_iter()
            .map(|(alias, items)| (alias.to_string(), Json::Array(items)))
            .collect::<Map<_, _>>(),
    )
}

pub(crate) fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::from(*n),
        // NaN and infinities have no JSON form.
        Value::Decimal(n) => Number::from_f64(*n).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Array(items) | Value::Tuple(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(entries) | Value::Object(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
    }
}
