//! Fingerprint canonicalization and content hashing.
//!
//! A `MetricFingerprint` is `(query, labels_canonical_json)`. Two calls with
//! semantically identical labels — same keys, different order, nested maps
//! shuffled at any depth — must produce byte-identical canonical JSON and
//! therefore identical `metric_hash`.

use serde_json::Value;

/// Recursively sort every object's keys and re-serialize. Non-object inputs
/// (arrays, scalars) pass through with their own contents canonicalized but
/// their own type unchanged.
pub fn canonicalize_labels(raw: &str) -> crate::error::Result<String> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| crate::error::CorridorError::InvalidInput(format!("labels_json: {e}")))?;
    let sorted = sort_value(value);
    serde_json::to_string(&sorted).map_err(Into::into)
}

fn sort_value(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}

/// `metric_hash = md5(query || labels_canonical_json)`.
pub fn metric_hash(query: &str, labels_canonical_json: &str) -> String {
    let mut buf = String::with_capacity(query.len() + labels_canonical_json.len());
    buf.push_str(query);
    buf.push_str(labels_canonical_json);
    format!("{:x}", md5::compute(buf.as_bytes()))
}
