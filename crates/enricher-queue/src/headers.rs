//! AMQP header tables as plain string maps.

use std::collections::HashMap;

use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};

/// Header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "uuid";

/// Flatten a header table. Keys are lowercased; values that have no string
/// form (arrays, nested tables, raw bytes) are skipped.
pub fn field_table_to_map(table: Option<&FieldTable>) -> HashMap<String, String> {
    let Some(table) = table else {
        return HashMap::new();
    };

    table
        .inner()
        .iter()
        .filter_map(|(key, value)| {
            amqp_value_to_string(value).map(|v| (key.as_str().to_lowercase(), v))
        })
        .collect()
}

/// Build a header table with every value as a long string.
pub fn map_to_field_table(headers: &HashMap<String, String>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(
            ShortString::from(key.clone()),
            AMQPValue::LongString(LongString::from(value.clone())),
        );
    }
    table
}

fn amqp_value_to_string(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(s) => Some(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        AMQPValue::Boolean(b) => Some(b.to_string()),
        AMQPValue::ShortShortInt(n) => Some(n.to_string()),
        AMQPValue::ShortShortUInt(n) => Some(n.to_string()),
        AMQPValue::ShortInt(n) => Some(n.to_string()),
        AMQPValue::ShortUInt(n) => Some(n.to_string()),
        AMQPValue::LongInt(n) => Some(n.to_string()),
        AMQPValue::LongUInt(n) => Some(n.to_string()),
        AMQPValue::LongLongInt(n) => Some(n.to_string()),
        _ => None,
    }
}
