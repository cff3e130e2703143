use serde_json::{Map, Value};

/// Collapse the `EventData/Data[@Name=K]/Value=V` pattern into a flat
/// ordered `{K: V}` mapping.
///
/// Events commonly arrive as
///
/// ```json
/// {"EventData": {"Data": [{"Name": "User", "Value": "alice"}, ...]}}
/// ```
///
/// which is awkward to query and breaks positional `%N` message
/// interpolation. The flat mapping keeps the array order. Any shape mismatch
/// (non-array `Data`, an element without `Name`/`Value`, a non-string name)
/// leaves the event completely untouched.
pub fn normalize_event_data(expanded: &mut Value) {
    let Some(event) = expanded.as_object() else {
        return;
    };
    let Some(event_data) = event.get("EventData").and_then(Value::as_object) else {
        return;
    };
    let Some(data_items) = event_data.get("Data").and_then(Value::as_array) else {
        return;
    };

    let mut flattened = Map::new();
    for item in data_items {
        let Some(item) = item.as_object() else {
            return;
        };
        let Some(name) = item.get("Name").and_then(Value::as_str) else {
            return;
        };
        let Some(value) = item.get("Value") else {
            return;
        };
        flattened.insert(name.to_string(), value.clone());
    }

    if let Some(slot) = expanded
        .as_object_mut()
        .and_then(|event| event.get_mut("EventData"))
    {
        *slot = Value::Object(flattened);
    }
}
