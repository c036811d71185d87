//! Path resolution: request paths to concrete store locations.
//!
//! Two strategies, tried in order. The virtual trie expands wildcarded,
//! vendor-aliased counter paths; the structural resolver interprets anything
//! else positionally against the store layout.

mod allowlist;
mod structural;
mod table_path;
mod trie;
mod vpaths;

pub use allowlist::*;
pub use structural::*;
pub use table_path::*;
pub use trie::*;
pub use vpaths::*;

#[cfg(test)]
mod trie_test;

use std::sync::Arc;

use tracing::debug;

use crate::context::TelemetryContext;
use crate::errors::ResolveError;
use crate::proto::gnmi;
use crate::Result;

/// Joins a prefix ahead of a request path. Resolution over the joined path is
/// identical to resolution with the prefix supplied separately.
pub fn join_path(prefix: Option<&gnmi::Path>, path: &gnmi::Path) -> gnmi::Path {
    let mut full = gnmi::Path {
        origin: path.origin.clone(),
        elem: Vec::new(),
        target: path.target.clone(),
    };
    if let Some(prefix) = prefix {
        if full.target.is_empty() {
            full.target = prefix.target.clone();
        }
        full.elem.extend(prefix.elem.iter().cloned());
    }
    full.elem.extend(path.elem.iter().cloned());
    full
}

/// Flattens a joined path to `[target, elem names...]`, the resolvers'
/// working form.
pub fn path_tokens(full: &gnmi::Path) -> Result<Vec<String>> {
    if full.target.is_empty() {
        return Err(ResolveError::EmptyTarget.into());
    }
    if full.elem.is_empty() {
        return Err(ResolveError::EmptyPath.into());
    }
    let mut tokens = Vec::with_capacity(full.elem.len() + 1);
    tokens.push(full.target.clone());
    for elem in &full.elem {
        tokens.push(elem.name.clone());
    }
    Ok(tokens)
}

/// Explicit field list carried on the last element's `field` attribute,
/// comma-separated. Empty when absent.
pub fn field_filter(full: &gnmi::Path) -> Vec<String> {
    full.elem
        .last()
        .and_then(|elem| elem.key.get("field"))
        .map(|fields| {
            fields
                .split(',')
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// The resolver front door.
pub struct Resolver {
    ctx: Arc<TelemetryContext>,
    trie: PathTrie,
}

impl Resolver {
    pub fn new(ctx: Arc<TelemetryContext>) -> Self {
        Self {
            ctx,
            trie: PathTrie::with_virtual_paths(),
        }
    }

    /// Resolves a read path to its concrete locations.
    pub async fn resolve(
        &self,
        prefix: Option<&gnmi::Path>,
        path: &gnmi::Path,
    ) -> Result<Vec<TablePath>> {
        let full = join_path(prefix, path);
        let tokens = path_tokens(&full)?;
        let target = &tokens[0];

        if !self.ctx.registry().is_valid_target(target) {
            return Err(crate::errors::StoreError::UnknownTarget(target.clone()).into());
        }

        if target == "COUNTERS_DB" {
            let handlers = self.trie.find(&tokens);
            if !handlers.is_empty() {
                let filter = field_filter(&full);
                let mut out = Vec::new();
                for handler in handlers {
                    out.extend(expand_virtual(&self.ctx, handler, &tokens, &filter).await?);
                }
                debug!("virtual resolution {:?} -> {} locations", tokens, out.len());
                return Ok(out);
            }
        }

        let location = resolve_structural(&self.ctx, &tokens).await?;
        Ok(vec![location])
    }

    /// Resolves a write path through the allow-list. Returns the location and
    /// the value shape the matched entry accepts.
    pub async fn resolve_write(
        &self,
        prefix: Option<&gnmi::Path>,
        path: &gnmi::Path,
    ) -> Result<(TablePath, ValueShape)> {
        let full = join_path(prefix, path);
        let tokens = path_tokens(&full)?;
        let target = &tokens[0];

        if !self.ctx.registry().is_valid_target(target) {
            return Err(crate::errors::StoreError::UnknownTarget(target.clone()).into());
        }
        if target != "CONFIG_DB" {
            return Err(ResolveError::WriteNotPermitted(tokens.join("/")).into());
        }

        let shape = permitted_shape(&tokens)
            .ok_or_else(|| ResolveError::WriteNotPermitted(tokens.join("/")))?;
        let location = resolve_structural_write(&self.ctx, &tokens).await?;
        Ok((location, shape))
    }
}
