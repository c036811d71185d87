use std::sync::Arc;

use regex::Regex;
use serde_json::Map;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::context::TelemetryContext;
use crate::errors::ResolveError;
use crate::errors::StoreError;
use crate::proto::gnmi;
use crate::resolve::FieldSpec;
use crate::resolve::TablePath;
use crate::Result;

/// A JSON object under assembly.
pub type JsonMap = Map<String, JsonValue>;

/// Reads a list of concrete locations into one typed value.
///
/// A single location naming exactly one explicit field (and no presentation
/// name) reads as a scalar string; everything else assembles a JSON payload.
pub async fn read_paths(
    ctx: &Arc<TelemetryContext>,
    paths: &[TablePath],
) -> Result<gnmi::TypedValue> {
    if let [tp] = paths {
        if tp.json_key.is_none() {
            if let Some(field) = tp.fields.single() {
                let key = tp.db_key();
                let store = ctx.registry().connector(&tp.target)?;
                let value = store.hget(&key, field).await?.ok_or_else(|| {
                    ResolveError::NoSuchEntry {
                        path: field.to_string(),
                        key,
                    }
                })?;
                return Ok(string_value(value));
            }
        }
    }

    let mut msi = JsonMap::new();
    for tp in paths {
        table_data_to_map(ctx, tp, &mut msi).await?;
    }
    json_value(&msi)
}

/// Merges one location's data into the JSON object under assembly.
///
/// Fields missing from the store are omitted silently when the location was
/// derived from a virtual expansion; an explicitly requested missing field
/// surfaces from `read_paths` above instead.
pub async fn table_data_to_map(
    ctx: &Arc<TelemetryContext>,
    tp: &TablePath,
    msi: &mut JsonMap,
) -> Result<()> {
    let store = ctx.registry().connector(&tp.target)?;

    // Single-field virtual location with presentation names: one hget,
    // relabeled on the way out.
    if let (Some(json_key), Some(json_field)) = (&tp.json_key, &tp.json_field) {
        let key = tp.db_key();
        let field = tp.fields.single().unwrap_or(json_field.as_str());
        match store.hget(&key, field).await? {
            Some(value) => {
                merge_under(msi, json_key, [(json_field.clone(), value)]);
            }
            None => {
                // stale alias from a wildcard expansion
                debug!("field {json_field} missing under {key}, skipping");
            }
        }
        return Ok(());
    }

    let db_keys = if tp.key.is_empty() {
        let pattern = tp.key_pattern();
        let keys = store.keys(&pattern).await?;
        if keys.is_empty() {
            debug!("no keys match {pattern}");
        }
        keys
    } else {
        vec![tp.db_key()]
    };

    for db_key in db_keys {
        let hash = store.hgetall(&db_key).await?;
        let selected = select_fields(&tp.fields, hash)?;

        if let Some(json_key) = &tp.json_key {
            merge_under(msi, json_key, selected);
        } else if !tp.key.is_empty() || db_key == tp.table {
            for (field, value) in selected {
                msi.insert(field, JsonValue::String(value));
            }
        } else {
            let suffix = tp.key_suffix(&db_key).to_string();
            merge_under(msi, &suffix, selected);
        }
    }
    Ok(())
}

/// Applies a location's field spec to a hash. Patterns are prefix-anchored
/// so a family pattern cannot match into a neighboring family.
fn select_fields(
    spec: &FieldSpec,
    hash: std::collections::HashMap<String, String>,
) -> Result<Vec<(String, String)>> {
    let mut out: Vec<(String, String)> = match spec {
        FieldSpec::None => hash.into_iter().collect(),
        FieldSpec::Fields(fields) => {
            let mut hash = hash;
            fields
                .iter()
                .filter_map(|f| hash.remove(f).map(|v| (f.clone(), v)))
                .collect()
        }
        FieldSpec::Patterns(patterns) => {
            let regexes = patterns
                .iter()
                .map(|p| {
                    Regex::new(&format!("^{p}")).map_err(|e| StoreError::Op {
                        op: "pattern",
                        key: p.clone(),
                        detail: e.to_string(),
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            hash.into_iter()
                .filter(|(field, _)| regexes.iter().any(|r| r.is_match(field)))
                .collect()
        }
    };
    out.sort();
    Ok(out)
}

/// Merges fields under a sub-object, creating or extending it.
fn merge_under(
    msi: &mut JsonMap,
    key: &str,
    fields: impl IntoIterator<Item = (String, String)>,
) {
    let slot = msi
        .entry(key.to_string())
        .or_insert_with(|| JsonValue::Object(JsonMap::new()));
    if let JsonValue::Object(obj) = slot {
        for (field, value) in fields {
            obj.insert(field, JsonValue::String(value));
        }
    }
}

pub fn string_value(value: String) -> gnmi::TypedValue {
    gnmi::TypedValue {
        value: Some(gnmi::typed_value::Value::StringVal(value)),
    }
}

/// Marshals an assembled object as a JSON_IETF typed value.
pub fn json_value(msi: &JsonMap) -> Result<gnmi::TypedValue> {
    let bytes = serde_json::to_vec(msi).map_err(|e| {
        crate::Error::Fatal(format!("JSON marshalling error: {e}"))
    })?;
    Ok(gnmi::TypedValue {
        value: Some(gnmi::typed_value::Value::JsonIetfVal(bytes)),
    })
}
