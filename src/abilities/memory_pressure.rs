//! System memory pressure monitoring as a Runnable ability.
//!
//! [`MemoryPressure`] polls available RAM and emits a `memory.pressure` event
//! through the brain's event sink whenever the pressure level changes. It runs
//! until the ability is switched off.
//!
//! # Thresholds (defaults)
//!
//! | Level | Free RAM |
//! |-------|---------|
//! | Warning | ≤ 1 024 MB |
//! | Critical | ≤ 512 MB |

use crate::ability::{Ability, EventSink, Runnable};
use crate::config::MemoryPressureConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Ability name used when registering with the brain.
pub const NAME: &str = "MemoryPressure";

/// Event emitted on every level transition.
pub const EVENT_NAME: &str = "memory.pressure";

/// Pressure level states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    /// Available RAM is within acceptable limits.
    Normal,
    /// Available RAM is at or below the warning threshold.
    Warning,
    /// Available RAM is at or below the critical threshold.
    Critical,
}

impl PressureLevel {
    pub fn from_available_mb(mb: u64, config: &MemoryPressureConfig) -> Self {
        if mb <= config.critical_threshold_mb {
            Self::Critical
        } else if mb <= config.warning_threshold_mb {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

/// Source of the available-RAM reading, in MiB.
pub type MemoryProbe = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Monitors available system RAM while switched on.
pub struct MemoryPressure {
    sink: Arc<dyn EventSink>,
    config: MemoryPressureConfig,
    poll_interval: Duration,
    probe: MemoryProbe,
}

impl MemoryPressure {
    pub fn new(sink: Arc<dyn EventSink>, config: MemoryPressureConfig) -> Self {
        Self {
            sink,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            config,
            probe: Arc::new(available_memory_mb),
        }
    }

    /// Override the poll interval (useful for testing).
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Replace the RAM reading source.
    #[must_use]
    pub fn with_probe(mut self, probe: MemoryProbe) -> Self {
        self.probe = probe;
        self
    }

    fn report(&self, level: PressureLevel, available_mb: u64) {
        match level {
            PressureLevel::Warning => {
                warn!(
                    available_mb,
                    threshold_mb = self.config.warning_threshold_mb,
                    "memory pressure: WARNING, low available RAM"
                );
            }
            PressureLevel::Critical => {
                warn!(
                    available_mb,
                    threshold_mb = self.config.critical_threshold_mb,
                    "memory pressure: CRITICAL, very low RAM"
                );
            }
            PressureLevel::Normal => {
                info!(available_mb, "memory pressure: cleared");
            }
        }

        self.sink.send(
            EVENT_NAME,
            serde_json::json!({
                "name": NAME,
                "level": level,
                "available_mb": available_mb,
            }),
        );
    }
}

#[async_trait]
impl Runnable for MemoryPressure {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut last_level = PressureLevel::Normal;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    let available_mb = (self.probe)();
                    let level = PressureLevel::from_available_mb(available_mb, &self.config);
                    if level != last_level {
                        self.report(level, available_mb);
                        last_level = level;
                    }
                }
            }
        }
    }
}

impl Ability for MemoryPressure {
    fn as_runnable(self: Arc<Self>) -> Option<Arc<dyn Runnable>> {
        Some(self)
    }
}

/// Return the available (free) system RAM in mebibytes.
///
/// Uses platform-specific calls:
/// - macOS: `sysctl`
/// - Linux: `/proc/meminfo` `MemAvailable`
/// - Other: returns 0 (unknown)
pub fn available_memory_mb() -> u64 {
    available_memory_bytes().saturating_div(1024 * 1024)
}

fn available_memory_bytes() -> u64 {
    #[cfg(target_os = "macos")]
    {
        macos_available_memory_bytes().unwrap_or(0)
    }
    #[cfg(target_os = "linux")]
    {
        linux_available_memory_bytes().unwrap_or(0)
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        0
    }
}

#[cfg(target_os = "macos")]
fn macos_available_memory_bytes() -> Option<u64> {
    let page_size = run_sysctl_u64("hw.pagesize")?;
    let free_pages = run_sysctl_u64("vm.page_free_count")?;
    Some(free_pages.saturating_mul(page_size))
}

#[cfg(target_os = "macos")]
fn run_sysctl_u64(name: &str) -> Option<u64> {
    let output = std::process::Command::new("sysctl")
        .arg("-n")
        .arg(name)
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<u64>()
        .ok()
}

#[cfg(target_os = "linux")]
fn linux_available_memory_bytes() -> Option<u64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available_kb(&content).map(|kb| kb.saturating_mul(1024))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_mem_available_kb(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<serde_json::Value>>);

    impl EventSink for RecordingSink {
        fn send(&self, event: &str, payload: serde_json::Value) {
            assert_eq!(event, EVENT_NAME);
            self.0.lock().unwrap().push(payload);
        }
    }

    #[test]
    fn pressure_levels_follow_thresholds() {
        let config = MemoryPressureConfig::default();
        assert_eq!(
            PressureLevel::from_available_mb(2_048, &config),
            PressureLevel::Normal
        );
        assert_eq!(
            PressureLevel::from_available_mb(1_024, &config),
            PressureLevel::Warning
        );
        assert_eq!(
            PressureLevel::from_available_mb(700, &config),
            PressureLevel::Warning
        );
        assert_eq!(
            PressureLevel::from_available_mb(512, &config),
            PressureLevel::Critical
        );
    }

    #[test]
    fn parses_mem_available_line() {
        let meminfo = "MemTotal:       16384000 kB\nMemAvailable:    8192000 kB\n";
        assert_eq!(parse_mem_available_kb(meminfo), Some(8_192_000));
        assert_eq!(parse_mem_available_kb("MemTotal: 1 kB"), None);
    }

    #[tokio::test]
    async fn run_returns_ok_on_cancel() {
        let monitor = MemoryPressure::new(
            Arc::new(RecordingSink::default()),
            MemoryPressureConfig::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), monitor.run(cancel)).await;
        assert!(result.expect("monitor should stop after cancel").is_ok());
    }

    #[tokio::test]
    async fn emits_only_on_level_transitions() {
        let sink = Arc::new(RecordingSink::default());
        let available = Arc::new(AtomicU64::new(4_096));
        let probe_value = Arc::clone(&available);
        let monitor = Arc::new(
            MemoryPressure::new(
                Arc::clone(&sink) as Arc<dyn EventSink>,
                MemoryPressureConfig::default(),
            )
            .with_poll_interval(Duration::from_millis(5))
            .with_probe(Arc::new(move || probe_value.load(Ordering::SeqCst))),
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let monitor = Arc::clone(&monitor);
            let cancel = cancel.clone();
            async move { monitor.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        available.store(300, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["level"], "critical");
        assert_eq!(events[0]["available_mb"], 300);
        assert_eq!(events[0]["name"], NAME);
    }
}
