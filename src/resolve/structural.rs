use std::sync::Arc;

use tracing::debug;

use crate::context::TelemetryContext;
use crate::errors::ResolveError;
use crate::resolve::FieldSpec;
use crate::resolve::TablePath;
use crate::Result;

/// Resolves a path positionally by element count:
///
/// | length | interpretation |
/// |---|---|
/// | 2 | table; existence checked by key listing |
/// | 3 | table+key if the key exists, else table+field |
/// | 4 | table+composite-key if it exists, else table+key+field |
/// | 5 | table+composite-key+field |
///
/// Anything else is invalid.
pub async fn resolve_structural(
    ctx: &Arc<TelemetryContext>,
    tokens: &[String],
) -> Result<TablePath> {
    let target = &tokens[0];
    let separator = ctx.registry().separator(target)?;
    let store = ctx.registry().connector(target)?;

    let mut tp = TablePath::new(target, &tokens[1], separator);

    match tokens.len() {
        2 => {
            let keys = store.keys(&format!("{}*", tp.table)).await?;
            if keys.is_empty() {
                debug!("no keys under table {} in {}", tp.table, target);
                return Err(ResolveError::InvalidPath(tokens.join("/")).into());
            }
        }
        3 => {
            let key = format!("{}{}{}", tp.table, separator, tokens[2]);
            if store.exists(&key).await? {
                tp.key = tokens[2].clone();
            } else {
                tp.fields = FieldSpec::Fields(vec![tokens[2].clone()]);
            }
        }
        4 => {
            let composite = format!("{}{}{}", tokens[2], separator, tokens[3]);
            let key = format!("{}{}{}", tp.table, separator, composite);
            if store.exists(&key).await? {
                tp.key = composite;
            } else {
                tp.key = tokens[2].clone();
                tp.fields = FieldSpec::Fields(vec![tokens[3].clone()]);
            }
        }
        5 => {
            tp.key = format!("{}{}{}", tokens[2], separator, tokens[3]);
            tp.fields = FieldSpec::Fields(vec![tokens[4].clone()]);
        }
        _ => {
            return Err(ResolveError::InvalidPath(tokens.join("/")).into());
        }
    }

    if !tp.key.is_empty() {
        let key = tp.db_key();
        if !store.exists(&key).await? {
            return Err(ResolveError::NoSuchEntry {
                path: tokens.join("/"),
                key,
            }
            .into());
        }
    }

    debug!("structural resolution {:?} -> {:?}", tokens, tp);
    Ok(tp)
}

/// The write-side positional interpretation. Keys need not exist yet, and a
/// third element is always a key, never a field.
pub async fn resolve_structural_write(
    ctx: &Arc<TelemetryContext>,
    tokens: &[String],
) -> Result<TablePath> {
    let target = &tokens[0];
    let separator = ctx.registry().separator(target)?;
    let store = ctx.registry().connector(target)?;

    let mut tp = TablePath::new(target, &tokens[1], separator);

    match tokens.len() {
        2 => {}
        3 => {
            tp.key = tokens[2].clone();
        }
        4 => {
            let composite = format!("{}{}{}", tokens[2], separator, tokens[3]);
            let key = format!("{}{}{}", tp.table, separator, composite);
            if store.exists(&key).await? {
                tp.key = composite;
            } else {
                tp.key = tokens[2].clone();
                tp.fields = FieldSpec::Fields(vec![tokens[3].clone()]);
            }
        }
        5 => {
            tp.key = format!("{}{}{}", tokens[2], separator, tokens[3]);
            tp.fields = FieldSpec::Fields(vec![tokens[4].clone()]);
        }
        _ => {
            return Err(ResolveError::InvalidPath(tokens.join("/")).into());
        }
    }

    Ok(tp)
}
