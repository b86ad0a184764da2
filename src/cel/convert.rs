//! Value conversion between serde_json::Value and cel_interpreter types

use cel_interpreter::objects::Value as CelValue;
use serde_json::Value as JsonValue;

/// Convert serde_json::Value to cel_interpreter::Value
pub fn json_to_cel(value: &JsonValue) -> CelValue {
    match value {
        JsonValue::Null => CelValue::Null,
        JsonValue::Bool(b) => CelValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else if let Some(f) = n.as_f64() {
                CelValue::Float(f)
            } else {
                CelValue::Null
            }
        }
        JsonValue::String(s) => CelValue::String(s.clone().into()),
        JsonValue::Array(arr) => {
            let cel_vec: Vec<CelValue> = arr.iter().map(json_to_cel).collect();
            CelValue::List(cel_vec.into())
        }
        JsonValue::Object(obj) => {
            use cel_interpreter::objects::{Key, Map};
            use std::collections::HashMap;
            use std::sync::Arc;

            let mut map_data: HashMap<Key, CelValue> = HashMap::new();
            for (k, v) in obj.iter() {
                map_data.insert(Key::from(k.clone()), json_to_cel(v));
            }
            CelValue::Map(Map {
                map: Arc::new(map_data),
            })
        }
    }
}

/// Convert cel_interpreter::Value to serde_json::Value
pub fn cel_to_json(value: &CelValue) -> JsonValue {
    match value {
        CelValue::Null => JsonValue::Null,
        CelValue::Bool(b) => JsonValue::Bool(*b),
        CelValue::Int(i) => JsonValue::Number((*i).into()),
        CelValue::UInt(u) => JsonValue::Number((*u).into()),
        CelValue::Float(f) => {
            if let Some(n) = serde_json::Number::from_f64(*f) {
                JsonValue::Number(n)
            } else {
                JsonValue::Null
            }
        }
        CelValue::String(s) => JsonValue::String(s.to_string()),
        CelValue::Bytes(b) => JsonValue::String(hex::encode(b.as_ref())),
        CelValue::List(list) => {
            let json_vec: Vec<JsonValue> = list.iter().map(cel_to_json).collect();
            JsonValue::Array(json_vec)
        }
        CelValue::Map(map) => {
            use cel_interpreter::objects::Key;

            let mut json_obj = serde_json::Map::new();
            for (k, v) in map.map.as_ref().iter() {
                let key_str = match k {
                    Key::String(s) => s.to_string(),
                    Key::Int(i) => i.to_string(),
                    Key::Uint(u) => u.to_string(),
                    Key::Bool(b) => b.to_string(),
                };
                json_obj.insert(key_str, cel_to_json(v));
            }
            JsonValue::Object(json_obj)
        }
        // Durations, timestamps and function references have no JSON
        // counterpart the host functions care about.
        _ => JsonValue::String(format!("{:?}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_cel_scalars() {
        assert!(matches!(json_to_cel(&json!(true)), CelValue::Bool(true)));
        assert!(matches!(json_to_cel(&json!(42)), CelValue::Int(42)));
        assert!(matches!(json_to_cel(&json!(null)), CelValue::Null));

        if let CelValue::String(s) = json_to_cel(&json!("hello")) {
            assert_eq!(s.as_ref(), "hello");
        } else {
            panic!("expected String");
        }
    }

    #[test]
    fn test_json_to_cel_array() {
        if let CelValue::List(list) = json_to_cel(&json!([1, 2, 3])) {
            assert_eq!(list.len(), 3);
        } else {
            panic!("expected List");
        }
    }

    #[test]
    fn test_json_to_cel_object() {
        if let CelValue::Map(map) = json_to_cel(&json!({"key": "value"})) {
            assert_eq!(map.map.len(), 1);
        } else {
            panic!("expected Map");
        }
    }

    #[test]
    fn test_cel_to_json_round_trip() {
        let original = json!({
            "id": "user1",
            "roles": ["admin", "editor"],
            "level": 5,
            "active": true
        });

        let round_tripped = cel_to_json(&json_to_cel(&original));
        assert_eq!(original, round_tripped);
    }
}
