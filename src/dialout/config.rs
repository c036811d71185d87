use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::context::TelemetryContext;
use crate::errors::DialOutError;
use crate::proto::gnmi;
use crate::Result;

/// The configuration table the publisher watches.
pub const TELEMETRY_CLIENT_TABLE: &str = "TELEMETRY_CLIENT";

/// Global options of the dial-out client, from the `Global` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    pub retry_interval: Duration,
    pub encoding: gnmi::Encoding,
    pub src_ip: Option<String>,
    pub unidirectional: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(30),
            encoding: gnmi::Encoding::JsonIetf,
            src_ip: None,
            unidirectional: true,
        }
    }
}

/// A ranked list of collector endpoints, from a `DestinationGroup_<name>`
/// entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationGroup {
    pub addrs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Stream,
    Periodic,
}

/// One `Subscription_<name>` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEntry {
    pub name: String,
    pub path_target: String,
    pub dst_group: String,
    pub report_type: ReportType,
    pub report_interval: Duration,
    pub paths: Vec<gnmi::Path>,
}

/// The whole parsed table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialOutConfig {
    pub global: GlobalConfig,
    pub groups: HashMap<String, DestinationGroup>,
    pub subscriptions: HashMap<String, SubscriptionEntry>,
}

/// Reads and parses `TELEMETRY_CLIENT` from the configuration store.
///
/// `defaults` carries the command-line fallbacks; the `Global` entry
/// overrides them field by field. Individually invalid subscription entries
/// are skipped with a log line so one bad entry cannot take the publisher
/// down.
pub async fn load_dialout_config(
    ctx: &Arc<TelemetryContext>,
    defaults: GlobalConfig,
) -> Result<DialOutConfig> {
    let store = ctx.registry().connector("CONFIG_DB")?;
    let separator = ctx.registry().separator("CONFIG_DB")?;

    let mut config = DialOutConfig {
        global: defaults.clone(),
        ..DialOutConfig::default()
    };
    let keys = store
        .keys(&format!("{TELEMETRY_CLIENT_TABLE}{separator}*"))
        .await?;

    for key in keys {
        let entry_name = &key[TELEMETRY_CLIENT_TABLE.len() + separator.len_utf8()..];
        let fields = store.hgetall(&key).await?;

        if entry_name == "Global" {
            config.global = parse_global(&fields, &defaults);
        } else if let Some(name) = entry_name.strip_prefix("DestinationGroup_") {
            let addrs: Vec<String> = fields
                .get("dst_addr")
                .map(|v| {
                    v.split(',')
                        .filter(|a| !a.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if addrs.is_empty() {
                return Err(DialOutError::EmptyDestinationGroup(name.to_string()).into());
            }
            config
                .groups
                .insert(name.to_string(), DestinationGroup { addrs });
        } else if let Some(name) = entry_name.strip_prefix("Subscription_") {
            match parse_subscription(name, &fields) {
                Ok(entry) => {
                    config.subscriptions.insert(name.to_string(), entry);
                }
                Err(e) => {
                    debug!("skipping subscription {name}: {e}");
                }
            }
        } else {
            debug!("ignoring unknown {TELEMETRY_CLIENT_TABLE} entry {entry_name}");
        }
    }

    // a subscription naming an undefined group is a config error
    for entry in config.subscriptions.values() {
        if !config.groups.contains_key(&entry.dst_group) {
            return Err(DialOutError::UnknownDestinationGroup(entry.dst_group.clone()).into());
        }
    }
    Ok(config)
}

fn parse_global(fields: &HashMap<String, String>, defaults: &GlobalConfig) -> GlobalConfig {
    let mut global = defaults.clone();
    if let Some(secs) = fields.get("retry_interval").and_then(|v| v.parse().ok()) {
        global.retry_interval = Duration::from_secs(secs);
    }
    if let Some(encoding) = fields
        .get("encoding")
        .and_then(|v| gnmi::Encoding::from_str_name(v))
    {
        global.encoding = encoding;
    }
    if let Some(src_ip) = fields.get("src_ip") {
        global.src_ip = Some(src_ip.clone());
    }
    if let Some(unidirectional) = fields.get("unidirectional").and_then(|v| v.parse().ok()) {
        global.unidirectional = unidirectional;
    }
    global
}

fn parse_subscription(
    name: &str,
    fields: &HashMap<String, String>,
) -> Result<SubscriptionEntry> {
    let invalid = |detail: &str| DialOutError::InvalidSubscription {
        name: name.to_string(),
        detail: detail.to_string(),
    };

    let path_target = fields
        .get("path_target")
        .cloned()
        .ok_or_else(|| invalid("missing path_target"))?;
    let dst_group = fields
        .get("dst_group")
        .cloned()
        .ok_or_else(|| invalid("missing dst_group"))?;
    let report_type = match fields.get("report_type").map(String::as_str) {
        Some("stream") | None => ReportType::Stream,
        Some("periodic") => ReportType::Periodic,
        Some(other) => return Err(invalid(&format!("unknown report_type {other}")).into()),
    };
    let report_interval = Duration::from_millis(
        fields
            .get("report_interval")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
    );
    if report_type == ReportType::Periodic && report_interval.is_zero() {
        // periodic reporting with no interval is invalid configuration
        return Err(invalid("periodic report_interval must be > 0").into());
    }

    let paths: Vec<gnmi::Path> = fields
        .get("paths")
        .map(|v| {
            v.split(',')
                .filter(|p| !p.is_empty())
                .map(parse_path)
                .collect()
        })
        .unwrap_or_default();
    if paths.is_empty() {
        return Err(invalid("no paths").into());
    }

    Ok(SubscriptionEntry {
        name: name.to_string(),
        path_target,
        dst_group,
        report_type,
        report_interval,
        paths,
    })
}

/// `COUNTERS/Ethernet*` style path strings, `/`-separated element names.
fn parse_path(path: &str) -> gnmi::Path {
    gnmi::Path {
        origin: String::new(),
        elem: path
            .split('/')
            .filter(|e| !e.is_empty())
            .map(|name| gnmi::PathElem {
                name: name.to_string(),
                key: HashMap::new(),
            })
            .collect(),
        target: String::new(),
    }
}
