use std::sync::Arc;

use tracing::debug;

use crate::context::TelemetryContext;
use crate::errors::ResolveError;
use crate::resolve::FieldSpec;
use crate::resolve::TablePath;
use crate::resolve::VirtualHandler;
use crate::Result;

/// The fixed field set a queue counter location reads.
pub const QUEUE_COUNTER_FIELDS: [&str; 4] = [
    "SAI_QUEUE_STAT_PACKETS",
    "SAI_QUEUE_STAT_BYTES",
    "SAI_QUEUE_STAT_DROPPED_PACKETS",
    "SAI_QUEUE_STAT_DROPPED_BYTES",
];

/// The fixed field set read against a watchdog queue oid.
pub const PFCWD_QUEUE_FIELDS: [&str; 7] = [
    "PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED",
    "PFC_WD_QUEUE_STATS_TX_DROPPED_PACKETS",
    "PFC_WD_QUEUE_STATS_RX_DROPPED_PACKETS",
    "PFC_WD_QUEUE_STATS_DEADLOCK_RESTORED",
    "PFC_WD_QUEUE_STATS_TX_PACKETS",
    "PFC_WD_QUEUE_STATS_RX_PACKETS",
    "PFC_WD_STATUS",
];

/// Expands one matched virtual handler into concrete locations.
pub async fn expand_virtual(
    ctx: &Arc<TelemetryContext>,
    handler: VirtualHandler,
    tokens: &[String],
    field_filter: &[String],
) -> Result<Vec<TablePath>> {
    match handler {
        VirtualHandler::PortCounters => port_counters(ctx, tokens).await,
        VirtualHandler::PortCounterFields => port_counter_fields(ctx, tokens).await,
        VirtualHandler::PortQueueCounters => port_queue_counters(ctx, tokens, field_filter).await,
        VirtualHandler::PortQueuePfcwd => port_queue_pfcwd(ctx, tokens, field_filter).await,
    }
}

fn counters_location(ctx: &TelemetryContext, oid: &str) -> Result<TablePath> {
    let separator = ctx.registry().separator("COUNTERS_DB")?;
    let mut tp = TablePath::new("COUNTERS_DB", "COUNTERS", separator);
    tp.key = oid.to_string();
    Ok(tp)
}

/// `COUNTERS/Ethernet*` and `COUNTERS/Ethernet<n>`: the full counter hash,
/// per port. Wildcard expansions are reported under the vendor alias; ports
/// without an alias are reported under their own name.
async fn port_counters(ctx: &Arc<TelemetryContext>, tokens: &[String]) -> Result<Vec<TablePath>> {
    let port_token = &tokens[2];
    let ports = ctx.maps().port_oid_map().await?;
    let alias = ctx.maps().alias_maps().await?;

    if port_token.ends_with('*') {
        let mut out = Vec::new();
        for (port, oid) in ports {
            let mut tp = counters_location(ctx, oid)?;
            tp.json_key = Some(alias.to_alias(port).to_string());
            out.push(tp);
        }
        return Ok(out);
    }

    let name = alias.to_name(port_token);
    let oid = ports.get(name).ok_or_else(|| ResolveError::UnknownPort {
        port: name.to_string(),
        alias: port_token.clone(),
    })?;
    Ok(vec![counters_location(ctx, oid)?])
}

/// Turns a counter field token into a field spec: exact names pass through,
/// a trailing `*` becomes a prefix-anchored pattern, and non-counter tokens
/// select the whole hash.
fn counter_field_spec(field_token: &str) -> FieldSpec {
    if !field_token.starts_with("SAI") {
        return FieldSpec::None;
    }
    if let Some(prefix) = field_token.strip_suffix('*') {
        FieldSpec::Patterns(vec![format!("{}.*", regex::escape(prefix))])
    } else {
        FieldSpec::Fields(vec![field_token.to_string()])
    }
}

/// `COUNTERS/Ethernet*/<field>`: one or more counter fields per port.
async fn port_counter_fields(
    ctx: &Arc<TelemetryContext>,
    tokens: &[String],
) -> Result<Vec<TablePath>> {
    let port_token = &tokens[2];
    let field_token = &tokens[3];
    let ports = ctx.maps().port_oid_map().await?;
    let alias = ctx.maps().alias_maps().await?;
    let fields = counter_field_spec(field_token);

    if port_token.ends_with('*') {
        let mut out = Vec::new();
        for (port, oid) in ports {
            let mut tp = counters_location(ctx, oid)?;
            tp.fields = fields.clone();
            tp.json_key = Some(alias.to_alias(port).to_string());
            if let Some(field) = fields.single() {
                tp.json_field = Some(field.to_string());
            }
            out.push(tp);
        }
        return Ok(out);
    }

    let name = alias.to_name(port_token);
    let oid = ports.get(name).ok_or_else(|| ResolveError::UnknownPort {
        port: name.to_string(),
        alias: port_token.clone(),
    })?;
    let mut tp = counters_location(ctx, oid)?;
    tp.fields = fields;
    Ok(vec![tp])
}

/// `COUNTERS/Ethernet*/Queues[/<field>]`: the fixed queue stat set for
/// every queue of the selected ports, reported under `<port><sep><index>`.
/// A fifth token narrows the field set, exact or by `<prefix>*`.
async fn port_queue_counters(
    ctx: &Arc<TelemetryContext>,
    tokens: &[String],
    field_filter: &[String],
) -> Result<Vec<TablePath>> {
    let port_token = &tokens[2];
    let queues = ctx.maps().queue_oid_map().await?;
    let alias = ctx.maps().alias_maps().await?;
    let separator = ctx.registry().separator("COUNTERS_DB")?;

    let mut fields = match tokens.get(4).map(String::as_str) {
        None | Some("*") => QUEUE_COUNTER_FIELDS
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>(),
        Some(token) => {
            let narrowed: Vec<String> = match token.strip_suffix('*') {
                Some(prefix) => QUEUE_COUNTER_FIELDS
                    .iter()
                    .filter(|f| f.starts_with(prefix))
                    .map(|f| f.to_string())
                    .collect(),
                None => QUEUE_COUNTER_FIELDS
                    .iter()
                    .filter(|f| **f == token)
                    .map(|f| f.to_string())
                    .collect(),
            };
            if narrowed.is_empty() {
                return Err(ResolveError::NoMatchingFields(token.to_string()).into());
            }
            narrowed
        }
    };
    if !field_filter.is_empty() {
        fields.retain(|f| field_filter.iter().any(|t| t == f));
    }
    if fields.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    if port_token.ends_with('*') {
        for (port, port_queues) in queues {
            let oport = alias.to_alias(port).to_string();
            for (queue_key, oid) in port_queues {
                let index = queue_index(queue_key, separator);
                let mut tp = counters_location(ctx, oid)?;
                tp.fields = FieldSpec::Fields(fields.clone());
                tp.json_key = Some(format!("{oport}{separator}{index}"));
                out.push(tp);
            }
        }
        return Ok(out);
    }

    let name = alias.to_name(port_token);
    let Some(port_queues) = queues.get(name) else {
        return Err(ResolveError::UnknownPort {
            port: name.to_string(),
            alias: port_token.clone(),
        }
        .into());
    };
    for (queue_key, oid) in port_queues {
        let index = queue_index(queue_key, separator);
        let mut tp = counters_location(ctx, oid)?;
        tp.fields = FieldSpec::Fields(fields.clone());
        // keep the name the caller used, alias or not
        tp.json_key = Some(format!("{port_token}{separator}{index}"));
        out.push(tp);
    }
    Ok(out)
}

/// `COUNTERS/<port>/Queue<n>/Pfcwd`: for each watchdog-enabled queue, the
/// watchdog stats against the queue oid plus the matching PFC RX counter
/// against the port oid.
async fn port_queue_pfcwd(
    ctx: &Arc<TelemetryContext>,
    tokens: &[String],
    field_filter: &[String],
) -> Result<Vec<TablePath>> {
    let port_token = &tokens[2];
    let queue_token = &tokens[3];
    let ports = ctx.maps().port_oid_map().await?;
    let alias = ctx.maps().alias_maps().await?;
    let wd_map = ctx.maps().pfcwd_queue_map().await?;
    let separator = ctx.registry().separator("COUNTERS_DB")?;

    let mut out = Vec::new();
    let wildcard_port = port_token.ends_with('*');
    for (port, wd_queues) in wd_map {
        let name = if wildcard_port {
            port.as_str()
        } else {
            let name = alias.to_name(port_token);
            if name != port {
                continue;
            }
            name
        };
        let port_oid = ports.get(name).ok_or_else(|| ResolveError::UnknownPort {
            port: name.to_string(),
            alias: port_token.clone(),
        })?;

        for queue_key in wd_queues.keys() {
            let index = queue_index(queue_key, separator);
            if !queue_matches(queue_token, index) {
                continue;
            }
            let oid_queue = &wd_queues[queue_key];
            let json_key = if wildcard_port || queue_token == "*" || queue_token.ends_with('*') {
                Some(format!("{}{}Queue{}", alias.to_alias(name), separator, index))
            } else {
                None
            };

            let queue_fields = intersect_fields(&PFCWD_QUEUE_FIELDS, field_filter);
            if !queue_fields.is_empty() {
                let mut tp = counters_location(ctx, oid_queue)?;
                tp.fields = FieldSpec::Fields(queue_fields);
                tp.json_key = json_key.clone();
                out.push(tp);
            }

            let rx_field = format!("SAI_PORT_STAT_PFC_{index}_RX_PKTS");
            let port_fields = intersect_fields(&[rx_field.as_str()], field_filter);
            if !port_fields.is_empty() {
                let mut tp = counters_location(ctx, port_oid)?;
                tp.fields = FieldSpec::Fields(port_fields);
                tp.json_key = json_key;
                out.push(tp);
            }
        }
    }

    if out.is_empty() && !wildcard_port && !queue_token.ends_with('*') {
        // An explicitly named queue that is not under watchdog is a request
        // for nothing; distinguish a malformed queue token, which is an
        // error.
        if !queue_token.starts_with("Queue") {
            return Err(ResolveError::InvalidQueueName(queue_token.clone()).into());
        }
        debug!("PFC watchdog not enabled for {port_token}/{queue_token}");
    }
    Ok(out)
}

/// `<port><sep><index>` -> index.
fn queue_index(queue_key: &str, separator: char) -> &str {
    queue_key
        .split(separator)
        .nth(1)
        .unwrap_or_default()
}

/// Whether a queue composite entry matches the requested `Queue<n>` token
/// (or a wildcard).
fn queue_matches(queue_token: &str, index: &str) -> bool {
    if queue_token == "*" || queue_token == "Queues" {
        return true;
    }
    match queue_token.strip_prefix("Queue") {
        Some("*") | Some("") => true,
        Some(n) => n == index,
        None => queue_token == index,
    }
}

/// Filters a handler's default field list by the explicit request list; an
/// empty request list keeps the defaults.
fn intersect_fields(defaults: &[&str], filter: &[String]) -> Vec<String> {
    if filter.is_empty() {
        return defaults.iter().map(|f| f.to_string()).collect();
    }
    defaults
        .iter()
        .filter(|f| filter.iter().any(|t| t == *f))
        .map(|f| f.to_string())
        .collect()
}
