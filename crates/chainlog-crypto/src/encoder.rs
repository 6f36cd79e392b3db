use chainlog_types::{EncodingError, EntryFields};
use serde_json::{Map, Value};

/// Deepest value nesting the encoder accepts, counting the payload itself.
pub const MAX_DEPTH: usize = 128;

/// Deterministic byte encoding of an entry's hashable fields.
///
/// The output is canonical JSON of the envelope
/// `{"data","metadata","previous_hash","sequence","timestamp","type"}`:
/// object keys sorted by UTF-8 bytes at every level, no whitespace,
/// `serde_json` string escaping, arrays in their given order. Logically equal
/// inputs produce identical bytes regardless of key insertion order.
pub struct CanonicalEncoder;

impl CanonicalEncoder {
    /// Encode the fields covered by an entry hash.
    pub fn encode(fields: &EntryFields<'_>) -> Result<Vec<u8>, EncodingError> {
        if !fields.kind.is_well_formed() {
            return Err(EncodingError::InvalidKind(fields.kind.as_str().to_string()));
        }

        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(b"{\"data\":");
        write_object(&mut out, fields.data.as_map(), 1)?;
        out.extend_from_slice(b",\"metadata\":");
        write_object(&mut out, fields.metadata.as_map(), 1)?;
        out.extend_from_slice(b",\"previous_hash\":");
        match &fields.previous_hash {
            Some(hash) => write_string(&mut out, &hash.to_hex())?,
            None => out.extend_from_slice(b"null"),
        }
        out.extend_from_slice(b",\"sequence\":");
        out.extend_from_slice(fields.sequence.to_string().as_bytes());
        out.extend_from_slice(b",\"timestamp\":");
        write_string(&mut out, &fields.timestamp.to_canonical())?;
        out.extend_from_slice(b",\"type\":");
        write_string(&mut out, fields.kind.as_str())?;
        out.push(b'}');
        Ok(out)
    }

    /// Canonical JSON of an arbitrary value.
    pub fn encode_value(value: &Value) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::new();
        write_value(&mut out, value, 1)?;
        Ok(out)
    }
}

fn write_value(out: &mut Vec<u8>, value: &Value, depth: usize) -> Result<(), EncodingError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(number) => serde_json::to_writer(&mut *out, number)
            .map_err(|e| EncodingError::Unrepresentable(e.to_string()))?,
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            check_depth(depth)?;
            out.push(b'[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(b',');
                }
                write_value(out, item, depth + 1)?;
            }
            out.push(b']');
        }
        Value::Object(map) => write_object(out, map, depth)?,
    }
    Ok(())
}

fn write_object(
    out: &mut Vec<u8>,
    map: &Map<String, Value>,
    depth: usize,
) -> Result<(), EncodingError> {
    check_depth(depth)?;
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    out.push(b'{');
    for (index, key) in keys.into_iter().enumerate() {
        if index > 0 {
            out.push(b',');
        }
        write_string(out, key)?;
        out.push(b':');
        write_value(out, &map[key.as_str()], depth + 1)?;
    }
    out.push(b'}');
    Ok(())
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), EncodingError> {
    serde_json::to_writer(&mut *out, s).map_err(|e| EncodingError::Unrepresentable(e.to_string()))
}

fn check_depth(depth: usize) -> Result<(), EncodingError> {
    if depth > MAX_DEPTH {
        return Err(EncodingError::NestingTooDeep { limit: MAX_DEPTH });
    }
    Ok(())
}
