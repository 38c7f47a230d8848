//! MessagePack encoding of provider values
//!
//! Dynamic values cross the plugin boundary in the msgpack encoding used by
//! Terraform's type system. Unknown values are an extension type (code 0);
//! any extension received is read back as unknown.

use crate::error::{PluginError, Result};
use serde_json::Number;
use terradozer_provider::Value;

const UNKNOWN_EXT_TYPE: i8 = 0;

pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &to_rmpv(value))
        .map_err(|e| PluginError::Codec(e.to_string()))?;
    Ok(buf)
}

/// Decode a msgpack payload; an empty payload is `Value::Null`
pub fn decode(bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    let mut rd = bytes;
    let value = rmpv::decode::read_value(&mut rd).map_err(|e| PluginError::Codec(e.to_string()))?;
    Ok(from_rmpv(value))
}

fn to_rmpv(value: &Value) -> rmpv::Value {
    match value {
        Value::Null => rmpv::Value::Nil,
        Value::Unknown => rmpv::Value::Ext(UNKNOWN_EXT_TYPE, vec![0]),
        Value::Bool(b) => rmpv::Value::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rmpv::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                rmpv::Value::from(u)
            } else {
                rmpv::Value::F64(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => rmpv::Value::String(s.as_str().into()),
        Value::List(items) => rmpv::Value::Array(items.iter().map(to_rmpv).collect()),
        Value::Map(m) => rmpv::Value::Map(
            m.iter()
                .map(|(k, v)| (rmpv::Value::String(k.as_str().into()), to_rmpv(v)))
                .collect(),
        ),
    }
}

fn from_rmpv(value: rmpv::Value) -> Value {
    match value {
        rmpv::Value::Nil => Value::Null,
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(i) => {
            if let Some(v) = i.as_i64() {
                Value::Number(v.into())
            } else if let Some(v) = i.as_u64() {
                Value::Number(v.into())
            } else {
                Value::Null
            }
        }
        rmpv::Value::F32(f) => float(f as f64),
        rmpv::Value::F64(f) => float(f),
        rmpv::Value::String(s) => Value::String(utf8_lossy(&s)),
        rmpv::Value::Binary(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
        rmpv::Value::Array(items) => Value::List(items.into_iter().map(from_rmpv).collect()),
        rmpv::Value::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        rmpv::Value::String(s) => utf8_lossy(&s),
                        other => other.to_string(),
                    };
                    (key, from_rmpv(v))
                })
                .collect(),
        ),
        rmpv::Value::Ext(_, _) => Value::Unknown,
    }
}

fn float(f: f64) -> Value {
    match Number::from_f64(f) {
        Some(n) => Value::Number(n),
        None => Value::String(f.to_string()),
    }
}

fn utf8_lossy(s: &rmpv::Utf8String) -> String {
    match s.as_str() {
        Some(s) => s.to_string(),
        None => String::from_utf8_lossy(s.as_bytes()).into_owned(),
    }
}
