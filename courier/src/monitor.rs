//! Local event producers.
//!
//! Thin, silent samplers feeding the pipeline: a process watcher diffing the
//! `/proc` pid set and a CPU usage sampler reading `/proc/stat`. Producers
//! never learn whether an event was delivered: they format a payload, hand
//! it to the sink, and move on. Errors skip the tick and nothing more.

use std::{collections::HashMap, fs, time::Duration};

use courier_common::{
    Signal, internal,
    protocol::{Message, MessageKind},
};
use courier_relay::EventSink;
use serde::Deserialize;
use tokio::sync::broadcast;

const fn default_process_interval() -> u64 {
    2
}

const fn default_cpu_interval() -> u64 {
    10
}

const fn default_enabled() -> bool {
    true
}

/// Configuration for the built-in producers.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Master switch; disabling leaves the pipeline running for external
    /// producers only.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How often to diff the process table (in seconds)
    #[serde(default = "default_process_interval")]
    pub process_interval_secs: u64,

    /// How often to sample CPU usage (in seconds)
    #[serde(default = "default_cpu_interval")]
    pub cpu_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            process_interval_secs: default_process_interval(),
            cpu_interval_secs: default_cpu_interval(),
        }
    }
}

/// The producer task.
pub struct Monitor {
    config: MonitorConfig,
    sink: EventSink,
}

impl Monitor {
    #[must_use]
    pub const fn new(config: MonitorConfig, sink: EventSink) -> Self {
        Self { config, sink }
    }

    /// Sample until shutdown.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) {
        if !self.config.enabled {
            internal!("Monitor disabled, producers idle");
            let _ = shutdown.recv().await;
            return;
        }

        internal!("Monitor starting");

        let mut process_timer =
            tokio::time::interval(Duration::from_secs(self.config.process_interval_secs.max(1)));
        let mut cpu_timer =
            tokio::time::interval(Duration::from_secs(self.config.cpu_interval_secs.max(1)));

        // First ticks establish baselines without emitting events.
        process_timer.tick().await;
        cpu_timer.tick().await;
        let mut processes = scan_processes();
        let mut cpu = sample_cpu();

        loop {
            tokio::select! {
                _ = process_timer.tick() => {
                    let current = scan_processes();
                    self.emit_process_events(&processes, &current);
                    processes = current;
                }
                _ = cpu_timer.tick() => {
                    let current = sample_cpu();
                    if let (Some(prev), Some(now)) = (&cpu, &current)
                        && let Some(percent) = now.usage_since(prev)
                    {
                        self.sink.submit(
                            &Message::new(MessageKind::CpuUsage)
                                .field(percent.to_string())
                                .into_bytes(),
                        );
                    }
                    cpu = current;
                }
                _ = shutdown.recv() => {
                    internal!("Monitor received shutdown signal");
                    break;
                }
            }
        }
    }

    fn emit_process_events(&self, before: &HashMap<u32, String>, after: &HashMap<u32, String>) {
        for (pid, comm) in after {
            if !before.contains_key(pid) {
                self.sink.submit(
                    &Message::new(MessageKind::ProcessOpen)
                        .field(comm)
                        .into_bytes(),
                );
            }
        }

        for (pid, comm) in before {
            if !after.contains_key(pid) {
                self.sink.submit(
                    &Message::new(MessageKind::ProcessClose)
                        .field(comm)
                        .into_bytes(),
                );
            }
        }
    }
}

/// Snapshot the process table as pid -> command name.
fn scan_processes() -> HashMap<u32, String> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return HashMap::new();
    };

    let mut processes = HashMap::new();
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };

        // A process can exit between the readdir and this read; skip it.
        let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };

        processes.insert(pid, comm.trim().to_string());
    }

    processes
}

/// Aggregate CPU times from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

impl CpuTimes {
    /// Usage percentage over the interval since `prev`, or `None` when the
    /// counters did not advance.
    fn usage_since(&self, prev: &Self) -> Option<u64> {
        let total = self.total.checked_sub(prev.total)?;
        if total == 0 {
            return None;
        }

        let idle = self.idle.saturating_sub(prev.idle).min(total);
        Some((total - idle) * 100 / total)
    }
}

fn sample_cpu() -> Option<CpuTimes> {
    let stat = fs::read_to_string("/proc/stat").ok()?;
    parse_cpu_line(stat.lines().next()?)
}

/// Parse an aggregate `cpu ...` line: idle is the fourth counter, total is
/// the sum of every counter.
fn parse_cpu_line(line: &str) -> Option<CpuTimes> {
    let mut fields = line.split_whitespace();
    if fields.next() != Some("cpu") {
        return None;
    }

    let counters: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
    if counters.len() < 4 {
        return None;
    }

    Some(CpuTimes {
        idle: counters[3],
        total: counters.iter().sum(),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn process_scan_sees_this_process() {
        let processes = scan_processes();
        assert!(processes.contains_key(&std::process::id()));
    }

    #[test]
    fn cpu_line_parses() {
        let times = parse_cpu_line("cpu  100 0 50 800 25 0 25 0 0 0").unwrap();
        assert_eq!(times.idle, 800);
        assert_eq!(times.total, 1000);
    }

    #[test]
    fn cpu_usage_over_interval() {
        let prev = CpuTimes {
            idle: 800,
            total: 1000,
        };
        let now = CpuTimes {
            idle: 950,
            total: 1200,
        };
        // 200 total, 150 idle: 25% busy.
        assert_eq!(now.usage_since(&prev), Some(25));
    }

    #[test]
    fn cpu_usage_without_progress_is_none() {
        let times = CpuTimes {
            idle: 800,
            total: 1000,
        };
        assert_eq!(times.usage_since(&times), None);
        assert_eq!(
            times.usage_since(&CpuTimes {
                idle: 900,
                total: 1100,
            }),
            None
        );
    }

    #[test]
    fn malformed_cpu_line_rejected() {
        assert_eq!(parse_cpu_line("intr 12345"), None);
        assert_eq!(parse_cpu_line("cpu 1 2"), None);
    }
}
