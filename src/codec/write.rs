use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::context::TelemetryContext;
use crate::errors::ResolveError;
use crate::proto::gnmi;
use crate::resolve::TablePath;
use crate::resolve::ValueShape;
use crate::Result;

/// A decoded write payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteValue {
    /// Scalar leaf value; the empty string deletes the field
    Scalar(String),
    /// Desired state of one hash
    Fields(HashMap<String, String>),
    /// Desired state of several keys of one table
    Keys(HashMap<String, HashMap<String, String>>),
    /// Remove the addressed field or key
    Delete,
}

/// Decodes a typed value into a write payload and checks it against the
/// shape the allow-list entry declared for the path.
pub fn decode_write_value(
    tp: &TablePath,
    value: Option<&gnmi::TypedValue>,
    shape: ValueShape,
) -> Result<WriteValue> {
    let Some(value) = value.and_then(|v| v.value.as_ref()) else {
        return Ok(WriteValue::Delete);
    };

    let decoded = match value {
        gnmi::typed_value::Value::StringVal(s) => WriteValue::Scalar(s.clone()),
        gnmi::typed_value::Value::IntVal(i) => WriteValue::Scalar(i.to_string()),
        gnmi::typed_value::Value::UintVal(u) => WriteValue::Scalar(u.to_string()),
        gnmi::typed_value::Value::BoolVal(b) => WriteValue::Scalar(b.to_string()),
        gnmi::typed_value::Value::JsonVal(bytes)
        | gnmi::typed_value::Value::JsonIetfVal(bytes) => decode_json(tp, bytes)?,
    };

    let ok = match (&decoded, shape) {
        (WriteValue::Delete, _) => true,
        (WriteValue::Scalar(_), ValueShape::Scalar) => true,
        (WriteValue::Fields(_), ValueShape::FieldMap | ValueShape::FieldOrKeyMap) => true,
        (WriteValue::Keys(_), ValueShape::FieldOrKeyMap) => true,
        _ => false,
    };
    if !ok {
        return Err(ResolveError::ValueShape {
            path: tp.db_key(),
            detail: format!("{decoded:?} not accepted here, expected {shape:?}"),
        }
        .into());
    }
    Ok(decoded)
}

fn decode_json(tp: &TablePath, bytes: &[u8]) -> Result<WriteValue> {
    let parsed: JsonValue = serde_json::from_slice(bytes).map_err(|e| ResolveError::ValueShape {
        path: tp.db_key(),
        detail: format!("not json: {e}"),
    })?;
    let JsonValue::Object(object) = parsed else {
        return Err(ResolveError::ValueShape {
            path: tp.db_key(),
            detail: "expected a json object".to_string(),
        }
        .into());
    };

    let nested = object.values().any(|v| v.is_object());
    if nested {
        let mut keys = HashMap::new();
        for (key, value) in object {
            let JsonValue::Object(fields) = value else {
                return Err(ResolveError::ValueShape {
                    path: tp.db_key(),
                    detail: format!("mixed nesting under {key}"),
                }
                .into());
            };
            let mut fv = HashMap::new();
            for (field, value) in fields {
                fv.insert(field, scalar_string(tp, &value)?);
            }
            keys.insert(key, fv);
        }
        return Ok(WriteValue::Keys(keys));
    }

    let mut fields = HashMap::new();
    for (field, value) in object {
        fields.insert(field, scalar_string(tp, &value)?);
    }
    Ok(WriteValue::Fields(fields))
}

fn scalar_string(tp: &TablePath, value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        other => Err(ResolveError::ValueShape {
            path: tp.db_key(),
            detail: format!("field value {other} not supported"),
        }
        .into()),
    }
}

/// Applies a write to the store.
///
/// Map payloads reconcile: the stored hash is read first, then fields are
/// set or deleted so the stored state equals the desired map. Reads happen
/// before any write; a partial failure surfaces the first error with no
/// rollback.
pub async fn apply_write(
    ctx: &Arc<TelemetryContext>,
    tp: &TablePath,
    value: WriteValue,
) -> Result<()> {
    let store = ctx.registry().connector(&tp.target)?;

    match value {
        WriteValue::Scalar(scalar) => {
            let Some(field) = tp.fields.single() else {
                return Err(ResolveError::ValueShape {
                    path: tp.db_key(),
                    detail: "scalar write needs a field path".to_string(),
                }
                .into());
            };
            let key = tp.db_key();
            if scalar.is_empty() {
                store.hdel(&key, field).await?;
            } else {
                store.hset(&key, field, &scalar).await?;
            }
        }
        WriteValue::Fields(desired) => {
            if tp.fields.single().is_some() {
                return Err(ResolveError::ValueShape {
                    path: tp.db_key(),
                    detail: "map write cannot target a field path".to_string(),
                }
                .into());
            }
            reconcile_hash(ctx, tp, &tp.db_key(), desired).await?;
        }
        WriteValue::Keys(keyed) => {
            for (key, desired) in keyed {
                let db_key = format!("{}{}{}", tp.table, tp.separator, key);
                reconcile_hash(ctx, tp, &db_key, desired).await?;
            }
        }
        WriteValue::Delete => {
            let key = tp.db_key();
            if let Some(field) = tp.fields.single() {
                store.hdel(&key, field).await?;
            } else {
                // delete the whole entry, field by field
                let existing = store.hgetall(&key).await?;
                for field in existing.keys() {
                    store.hdel(&key, field).await?;
                }
            }
        }
    }
    Ok(())
}

/// Diff-driven reconcile of one hash: read, then set changed fields and
/// delete extraneous ones.
async fn reconcile_hash(
    ctx: &Arc<TelemetryContext>,
    tp: &TablePath,
    db_key: &str,
    desired: HashMap<String, String>,
) -> Result<()> {
    let store = ctx.registry().connector(&tp.target)?;
    let existing = store.hgetall(db_key).await?;

    let mut sets = Vec::new();
    let mut dels = Vec::new();
    for (field, value) in &desired {
        if existing.get(field) != Some(value) {
            sets.push((field.clone(), value.clone()));
        }
    }
    for field in existing.keys() {
        if !desired.contains_key(field) {
            dels.push(field.clone());
        }
    }
    debug!(
        "reconcile {db_key}: {} sets, {} deletes",
        sets.len(),
        dels.len()
    );

    for (field, value) in sets {
        store.hset(db_key, &field, &value).await?;
    }
    for field in dels {
        store.hdel(db_key, &field).await?;
    }
    Ok(())
}
