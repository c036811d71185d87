use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;
use tracing::warn;

use crate::errors::ResolveError;
use crate::nonstore::proc_readers::*;
use crate::Result;

/// Where the build version lives on a switch.
pub const VERSION_FILE_PATH: &str = "/etc/sonic/sonic_version.yml";

/// Sampling period of the cpu utilization ring.
const CPU_SAMPLE_PERIOD: Duration = Duration::from_millis(100);
/// Ring depth: five minutes of 100 ms samples.
const CPU_RING_CAPACITY: usize = 3000;

/// The process-local data sources behind the `OTHERS` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonStoreSource {
    PlatformCpu,
    ProcUptime,
    ProcMeminfo,
    ProcDiskstats,
    ProcLoadavg,
    ProcVmstat,
    ProcStat,
    OsVersionBuild,
}

/// `[OTHERS, a, b]` to source; `None` for anything unknown.
pub fn lookup_source(tokens: &[String]) -> Option<NonStoreSource> {
    if tokens.len() != 3 || tokens[0] != "OTHERS" {
        return None;
    }
    match (tokens[1].as_str(), tokens[2].as_str()) {
        ("platform", "cpu") => Some(NonStoreSource::PlatformCpu),
        ("proc", "uptime") => Some(NonStoreSource::ProcUptime),
        ("proc", "meminfo") => Some(NonStoreSource::ProcMeminfo),
        ("proc", "diskstats") => Some(NonStoreSource::ProcDiskstats),
        ("proc", "loadavg") => Some(NonStoreSource::ProcLoadavg),
        ("proc", "vmstat") => Some(NonStoreSource::ProcVmstat),
        ("proc", "stat") => Some(NonStoreSource::ProcStat),
        ("osversion", "build") => Some(NonStoreSource::OsVersionBuild),
        _ => None,
    }
}

/// Cpu utilization over the sampling windows the ring supports.
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct CpuUtil {
    pub id: String,
    #[serde(rename = "100ms")]
    pub util_100ms: u64,
    #[serde(rename = "1s")]
    pub util_1s: u64,
    #[serde(rename = "5s")]
    pub util_5s: u64,
    #[serde(rename = "1min")]
    pub util_1min: u64,
    #[serde(rename = "5min")]
    pub util_5min: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct CpuStatReport {
    pub cpu_all: CpuUtil,
    pub cpus: Vec<CpuUtil>,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRing {
    samples: VecDeque<ProcStat>,
}

impl StatsRing {
    pub(crate) fn push(&mut self, stat: ProcStat) {
        if self.samples.len() == CPU_RING_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(stat);
    }

    /// The sample `n` periods back from the newest, when the ring is deep
    /// enough.
    fn back(&self, n: usize) -> Option<&ProcStat> {
        self.samples
            .len()
            .checked_sub(n + 1)
            .and_then(|i| self.samples.get(i))
    }
}

/// Busy share between two snapshots, in percent.
pub(crate) fn cpu_util_percent(cur: &CpuTimes, last: &CpuTimes) -> u64 {
    let total_ticks = cur.total().saturating_sub(last.total());
    if total_ticks == 0 {
        return 0;
    }
    let idle_ticks = cur.idle.saturating_sub(last.idle);
    100 * (total_ticks - idle_ticks.min(total_ticks)) / total_ticks
}

/// Serves `OTHERS` reads. The cpu sampler starts on first use and runs for
/// the life of the process.
pub struct NonStoreProvider {
    stats: Arc<RwLock<StatsRing>>,
    sampler: OnceCell<()>,
    version: OnceCell<VersionInfo>,
}

impl Default for NonStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NonStoreProvider {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(StatsRing::default())),
            sampler: OnceCell::new(),
            version: OnceCell::new(),
        }
    }

    /// Reads one source as a JSON payload.
    pub async fn read(&self, source: NonStoreSource) -> Result<Vec<u8>> {
        let json = match source {
            NonStoreSource::ProcUptime => {
                serde_json::to_vec(&parse_uptime(&read_proc("/proc/uptime").await?)?)
            }
            NonStoreSource::ProcLoadavg => {
                serde_json::to_vec(&parse_loadavg(&read_proc("/proc/loadavg").await?)?)
            }
            NonStoreSource::ProcMeminfo => {
                serde_json::to_vec(&parse_kv_table(&read_proc("/proc/meminfo").await?))
            }
            NonStoreSource::ProcVmstat => {
                serde_json::to_vec(&parse_kv_table(&read_proc("/proc/vmstat").await?))
            }
            NonStoreSource::ProcStat => {
                serde_json::to_vec(&parse_proc_stat(&read_proc("/proc/stat").await?)?)
            }
            NonStoreSource::ProcDiskstats => {
                serde_json::to_vec(&parse_diskstats(&read_proc("/proc/diskstats").await?))
            }
            NonStoreSource::PlatformCpu => {
                self.ensure_sampler().await;
                serde_json::to_vec(&self.cpu_report())
            }
            NonStoreSource::OsVersionBuild => {
                let info = self
                    .version
                    .get_or_init(|| async {
                        match tokio::fs::read_to_string(VERSION_FILE_PATH).await {
                            Ok(content) => parse_version_file(&content),
                            Err(e) => {
                                warn!("failed to read {VERSION_FILE_PATH}: {e}");
                                VersionInfo {
                                    build_version: "sonic.NA".to_string(),
                                    error: e.to_string(),
                                }
                            }
                        }
                    })
                    .await;
                serde_json::to_vec(info)
            }
        };
        json.map_err(|e| crate::Error::Fatal(format!("JSON marshalling error: {e}")))
    }

    async fn ensure_sampler(&self) {
        let stats = self.stats.clone();
        self.sampler
            .get_or_init(|| async move {
                tokio::spawn(async move {
                    loop {
                        match read_proc("/proc/stat").await.and_then(|c| parse_proc_stat(&c)) {
                            Ok(stat) => stats.write().push(stat),
                            Err(e) => debug!("stat read failed: {e}"),
                        }
                        tokio::time::sleep(CPU_SAMPLE_PERIOD).await;
                    }
                });
            })
            .await;
    }

    /// Utilization over the ring windows; windows deeper than the ring's
    /// current fill are left at zero.
    fn cpu_report(&self) -> CpuStatReport {
        let ring = self.stats.read();
        let mut report = CpuStatReport::default();
        let Some(current) = ring.back(0) else {
            return report;
        };
        report.cpu_all.id = current.cpu_all.id.clone();
        report.cpus = current
            .cpus
            .iter()
            .map(|c| CpuUtil {
                id: c.id.clone(),
                ..CpuUtil::default()
            })
            .collect();

        let windows = [
            ("100ms", 1),
            ("1s", 10),
            ("5s", 50),
            ("1min", 600),
            ("5min", CPU_RING_CAPACITY - 1),
        ];
        for (window, n) in windows {
            let Some(last) = ring.back(n) else { continue };
            let all = cpu_util_percent(&current.cpu_all, &last.cpu_all);
            match window {
                "100ms" => report.cpu_all.util_100ms = all,
                "1s" => report.cpu_all.util_1s = all,
                "5s" => report.cpu_all.util_5s = all,
                "1min" => report.cpu_all.util_1min = all,
                _ => report.cpu_all.util_5min = all,
            }
            for (i, cpu) in report.cpus.iter_mut().enumerate() {
                let (Some(cur), Some(prev)) =
                    (current.cpus.get(i), last.cpus.get(i))
                else {
                    continue;
                };
                let util = cpu_util_percent(cur, prev);
                match window {
                    "100ms" => cpu.util_100ms = util,
                    "1s" => cpu.util_1s = util,
                    "5s" => cpu.util_5s = util,
                    "1min" => cpu.util_1min = util,
                    _ => cpu.util_5min = util,
                }
            }
        }
        report
    }
}

async fn read_proc(path: &str) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ResolveError::InvalidPath(format!("{path}: {e}")).into())
}
