use serde_json::{Map, Value};

pub fn is_plain_object(value: &Value) -> bool {
    matches!(value, Value::Object(_))
}

/// Overlays `override_value` onto `base`. Objects merge key by key, any other
/// non-null value replaces. A null in the overlay leaves the base untouched, so
/// a command-set file cannot blank out envelope fields it does not mention.
pub fn merge_deep(base: &Value, override_value: &Value) -> Value {
    if !is_plain_object(base) || !is_plain_object(override_value) {
        if !override_value.is_null() {
            return override_value.clone();
        }
        return base.clone();
    }

    let mut result = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    if let Value::Object(override_map) = override_value {
        for (key, value) in override_map.iter() {
            if value.is_null() {
                continue;
            }
            let existing = result.get(key).cloned().unwrap_or(Value::Null);
            if is_plain_object(value) && is_plain_object(&existing) {
                result.insert(key.clone(), merge_deep(&existing, value));
            } else {
                result.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(result)
}

/// Drops null members from every object, at any depth, so absent and null
/// fields both fall back to their defaults.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}
