use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EncodingError;
use crate::finite::non_finite_key;

/// Values that convert into JSON without loss.
///
/// Deliberately not implemented for `f32`/`f64`: JSON has no NaN or
/// infinity, so floats go through the fallible [`Payload::insert_number`].
pub trait PayloadValue {
    fn into_value(self) -> Value;
}

macro_rules! lossless_value {
    ($($ty:ty),* $(,)?) => {
        $(impl PayloadValue for $ty {
            fn into_value(self) -> Value {
                Value::from(self)
            }
        })*
    };
}

lossless_value!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, String, &str);

impl PayloadValue for &String {
    fn into_value(self) -> Value {
        Value::String(self.clone())
    }
}

impl PayloadValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl PayloadValue for Payload {
    fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl<T: PayloadValue> PayloadValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Null, PayloadValue::into_value)
    }
}

impl<T: PayloadValue> PayloadValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::Array(self.into_iter().map(PayloadValue::into_value).collect())
    }
}

/// String-keyed structured payload carried by an entry (`data` or `metadata`).
///
/// Key order is irrelevant: the encoder sorts keys before hashing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, EncodingError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(EncodingError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    /// Serialize any value into a payload.
    ///
    /// Fails for values that are not JSON objects, that contain NaN or an
    /// infinity, or that JSON cannot express (for example maps with
    /// non-string keys).
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, EncodingError> {
        if let Some(key) = non_finite_key(value, "") {
            return Err(EncodingError::NonFiniteNumber { key });
        }
        let value =
            serde_json::to_value(value).map_err(|e| EncodingError::Unrepresentable(e.to_string()))?;
        Self::from_value(value)
    }

    /// Builder-style insert.
    ///
    /// Floats are not accepted here; use [`Payload::with_number`].
    pub fn with(mut self, key: impl Into<String>, value: impl PayloadValue) -> Self {
        self.0.insert(key.into(), value.into_value());
        self
    }

    /// Builder-style [`Payload::insert_number`].
    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Result<Self, EncodingError> {
        self.insert_number(key, value)?;
        Ok(self)
    }

    /// Insert a value, replacing any previous value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl PayloadValue) -> Option<Value> {
        self.0.insert(key.into(), value.into_value())
    }

    /// Insert a floating-point number.
    ///
    /// `serde_json` silently turns NaN and infinities into `null`; this
    /// refuses them instead so the recorded value is never altered.
    pub fn insert_number(&mut self, key: impl Into<String>, value: f64) -> Result<(), EncodingError> {
        let key = key.into();
        let number = serde_json::Number::from_f64(value)
            .ok_or_else(|| EncodingError::NonFiniteNumber { key: key.clone() })?;
        self.0.insert(key, Value::Number(number));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn builder_inserts_values() {
        let payload = Payload::new().with("ticketId", "T1").with("quantity", 2);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.get("ticketId"), Some(&json!("T1")));
    }

    #[test]
    fn from_value_requires_object() {
        assert!(Payload::from_value(json!({"a": 1})).is_ok());
        assert_eq!(
            Payload::from_value(json!([1, 2])).unwrap_err(),
            EncodingError::NotAnObject { found: "array" }
        );
    }

    #[test]
    fn insert_number_rejects_non_finite() {
        let mut payload = Payload::new();
        payload.insert_number("price", 2.5).unwrap();
        assert_eq!(payload.get("price"), Some(&json!(2.5)));

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = payload.insert_number("price", bad).unwrap_err();
            assert_eq!(err, EncodingError::NonFiniteNumber { key: "price".into() });
        }
    }

    #[test]
    fn with_number_rejects_non_finite() {
        let payload = Payload::new().with_number("price", 2.5).unwrap();
        assert_eq!(payload.get("price"), Some(&json!(2.5)));

        let err = Payload::new()
            .with("ticketId", "T1")
            .with_number("price", f64::NAN)
            .unwrap_err();
        assert_eq!(err, EncodingError::NonFiniteNumber { key: "price".into() });
        assert!(Payload::new().with_number("cap", f64::INFINITY).is_err());
    }

    #[test]
    fn from_serialize_rejects_non_finite_fields() {
        #[derive(Serialize)]
        struct Purchase {
            ticket_id: &'static str,
            price: f64,
        }

        let ok = Payload::from_serialize(&Purchase { ticket_id: "T1", price: 2.5 }).unwrap();
        assert_eq!(ok.get("price"), Some(&json!(2.5)));

        let err = Payload::from_serialize(&Purchase {
            ticket_id: "T1",
            price: f64::NAN,
        })
        .unwrap_err();
        assert_eq!(err, EncodingError::NonFiniteNumber { key: "price".into() });

        let mut nested = HashMap::new();
        nested.insert("weights", vec![0.5, f64::NEG_INFINITY]);
        assert_eq!(
            Payload::from_serialize(&nested).unwrap_err(),
            EncodingError::NonFiniteNumber { key: "weights".into() }
        );
    }

    #[test]
    fn nested_builders_convert_losslessly() {
        let payload = Payload::new()
            .with("tags", vec!["a", "b"])
            .with("winner", None::<String>)
            .with("prize", Payload::new().with("name", "car"));
        assert_eq!(
            payload.into_value(),
            json!({"tags": ["a", "b"], "winner": null, "prize": {"name": "car"}})
        );
    }

    #[test]
    fn from_serialize_rejects_non_string_keys() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], "x");
        assert!(matches!(
            Payload::from_serialize(&map),
            Err(EncodingError::Unrepresentable(_))
        ));
    }

    #[test]
    fn serializes_transparently() {
        let payload = Payload::new().with("b", 1).with("a", true);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, json!({"a": true, "b": 1}));
    }
}
