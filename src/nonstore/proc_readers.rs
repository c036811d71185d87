use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::ResolveError;
use crate::Result;

fn parse_error(file: &str, detail: &str) -> crate::Error {
    ResolveError::InvalidPath(format!("{file}: {detail}")).into()
}

/// `/proc/uptime`: total and idle seconds.
#[derive(Debug, Serialize, PartialEq)]
pub struct Uptime {
    pub total: f64,
    pub idle: f64,
}

pub fn parse_uptime(content: &str) -> Result<Uptime> {
    let mut parts = content.split_whitespace();
    let total = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| parse_error("uptime", "missing total"))?;
    let idle = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| parse_error("uptime", "missing idle"))?;
    Ok(Uptime { total, idle })
}

/// `/proc/loadavg`.
#[derive(Debug, Serialize, PartialEq)]
pub struct LoadAvg {
    pub last1min: f64,
    pub last5min: f64,
    pub last15min: f64,
    pub process_running: u64,
    pub process_total: u64,
    pub last_pid: u64,
}

pub fn parse_loadavg(content: &str) -> Result<LoadAvg> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(parse_error("loadavg", "too few fields"));
    }
    let (running, total) = parts[3]
        .split_once('/')
        .ok_or_else(|| parse_error("loadavg", "malformed process counts"))?;
    Ok(LoadAvg {
        last1min: parts[0].parse().map_err(|_| parse_error("loadavg", "1min"))?,
        last5min: parts[1].parse().map_err(|_| parse_error("loadavg", "5min"))?,
        last15min: parts[2]
            .parse()
            .map_err(|_| parse_error("loadavg", "15min"))?,
        process_running: running
            .parse()
            .map_err(|_| parse_error("loadavg", "running"))?,
        process_total: total.parse().map_err(|_| parse_error("loadavg", "total"))?,
        last_pid: parts[4].parse().map_err(|_| parse_error("loadavg", "pid"))?,
    })
}

/// `/proc/meminfo` and `/proc/vmstat`: name to value, kB suffixes dropped.
pub fn parse_kv_table(content: &str) -> BTreeMap<String, u64> {
    let mut table = BTreeMap::new();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else { continue };
        let Some(value) = parts.next().and_then(|v| v.parse().ok()) else {
            continue;
        };
        table.insert(name.trim_end_matches(':').to_string(), value);
    }
    table
}

/// One `cpuN` line of `/proc/stat`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CpuTimes {
    pub id: String,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
            + self.guest
            + self.guest_nice
    }
}

/// The cpu section of `/proc/stat`: the aggregate line plus per-cpu lines.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProcStat {
    pub cpu_all: CpuTimes,
    pub cpus: Vec<CpuTimes>,
}

pub fn parse_proc_stat(content: &str) -> Result<ProcStat> {
    let mut stat = ProcStat::default();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(id) = parts.next() else { continue };
        if !id.starts_with("cpu") {
            continue;
        }
        let values: Vec<u64> = parts.filter_map(|v| v.parse().ok()).collect();
        if values.len() < 4 {
            return Err(parse_error("stat", "short cpu line"));
        }
        let get = |i: usize| values.get(i).copied().unwrap_or(0);
        let times = CpuTimes {
            id: id.to_string(),
            user: get(0),
            nice: get(1),
            system: get(2),
            idle: get(3),
            iowait: get(4),
            irq: get(5),
            softirq: get(6),
            steal: get(7),
            guest: get(8),
            guest_nice: get(9),
        };
        if id == "cpu" {
            stat.cpu_all = times;
        } else {
            stat.cpus.push(times);
        }
    }
    Ok(stat)
}

/// One device line of `/proc/diskstats`.
#[derive(Debug, Serialize, PartialEq)]
pub struct DiskStats {
    pub major: u64,
    pub minor: u64,
    pub name: String,
    pub reads_completed: u64,
    pub sectors_read: u64,
    pub writes_completed: u64,
    pub sectors_written: u64,
}

pub fn parse_diskstats(content: &str) -> Vec<DiskStats> {
    let mut disks = Vec::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }
        let num = |i: usize| parts[i].parse().unwrap_or(0);
        disks.push(DiskStats {
            major: num(0),
            minor: num(1),
            name: parts[2].to_string(),
            reads_completed: num(3),
            sectors_read: num(5),
            writes_completed: num(7),
            sectors_written: num(9),
        });
    }
    disks
}

/// The build version file: a YAML-shaped file of which only `build_version`
/// matters. A read or parse failure is recorded in the payload, not raised.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VersionInfo {
    pub build_version: String,
    pub error: String,
}

pub fn parse_version_file(content: &str) -> VersionInfo {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("build_version:") {
            let version = rest.trim().trim_matches('\'').trim_matches('"');
            if !version.is_empty() {
                return VersionInfo {
                    build_version: format!("sonic.{version}"),
                    error: String::new(),
                };
            }
        }
    }
    VersionInfo {
        build_version: "sonic.NA".to_string(),
        error: "build_version not found".to_string(),
    }
}
