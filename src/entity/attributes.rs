use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute map published on an entity's `/attributes` topic
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A single attribute value before conversion to JSON
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Top-level conversion applied before publishing.
    ///
    /// Booleans become the strings `"true"`/`"false"` and datetimes become
    /// ISO-8601 strings; lists and maps become JSON arrays and objects.
    pub fn to_published_json(&self) -> Value {
        match self {
            AttributeValue::Bool(b) => Value::String(b.to_string()),
            other => other.to_plain_json(),
        }
    }

    /// Plain JSON form, used for the elements of nested lists and maps
    pub fn to_plain_json(&self) -> Value {
        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Int(i) => Value::from(*i),
            AttributeValue::Float(f) => Value::from(*f),
            AttributeValue::Text(s) => Value::String(s.clone()),
            AttributeValue::DateTime(dt) => Value::String(format_datetime(dt)),
            AttributeValue::List(items) => {
                Value::Array(items.iter().map(AttributeValue::to_plain_json).collect())
            }
            AttributeValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_plain_json()))
                    .collect(),
            ),
        }
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// JSON object published for an attribute map
pub fn attributes_to_json(attributes: &Attributes) -> Value {
    let object: Map<String, Value> = attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.to_published_json()))
        .collect();
    Value::Object(object)
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<usize> for AttributeValue {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(i) => AttributeValue::Int(i),
            Err(_) => AttributeValue::Float(value as f64),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::DateTime(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Int(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => AttributeValue::Text(s),
            Value::Array(items) => {
                AttributeValue::List(items.into_iter().map(AttributeValue::from).collect())
            }
            Value::Object(map) => AttributeValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, AttributeValue::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_booleans_become_strings() {
        let mut attrs = Attributes::new();
        attrs.insert("active".to_string(), true.into());
        attrs.insert("count".to_string(), AttributeValue::Int(3));

        assert_eq!(
            attributes_to_json(&attrs).to_string(),
            r#"{"active":"true","count":3}"#
        );
    }

    #[test]
    fn test_datetime_is_iso8601() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("last_run".to_string(), dt.into());

        assert_eq!(
            attributes_to_json(&attrs),
            json!({"last_run": "2025-03-01T12:30:00Z"})
        );
    }

    #[test]
    fn test_nested_values_become_json_containers() {
        let mut inner = BTreeMap::new();
        inner.insert("pid".to_string(), AttributeValue::Int(42));
        inner.insert("running".to_string(), AttributeValue::Bool(true));

        let mut attrs = Attributes::new();
        attrs.insert("apps".to_string(), vec!["firefox", "steam"].into());
        attrs.insert("process".to_string(), AttributeValue::Map(inner));

        assert_eq!(
            attributes_to_json(&attrs),
            json!({
                "apps": ["firefox", "steam"],
                "process": {"pid": 42, "running": true}
            })
        );
    }

    #[test]
    fn test_from_json_value() {
        let value = AttributeValue::from(json!({"ok": false, "ratio": 0.5, "tags": ["a"]}));

        let mut expected = BTreeMap::new();
        expected.insert("ok".to_string(), AttributeValue::Bool(false));
        expected.insert("ratio".to_string(), AttributeValue::Float(0.5));
        expected.insert(
            "tags".to_string(),
            AttributeValue::List(vec![AttributeValue::Text("a".to_string())]),
        );
        assert_eq!(value, AttributeValue::Map(expected));
    }
}
