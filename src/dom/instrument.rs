//! Phase timing hooks.
//!
//! Reconstruction reports how long each phase took through an
//! [`Instrumentation`] handle owned by the service. Hooks only observe; the
//! rebuilt state is the same whichever implementation is installed.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Timed phases of one reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Round trip to the in-page extraction script
    BridgeCall,
    Decode,
    /// Pass 1: building every node
    BuildPass,
    /// Pass 2: wiring children to parents
    WirePass,
    Cleanup,
    Total,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::BridgeCall,
        Phase::Decode,
        Phase::BuildPass,
        Phase::WirePass,
        Phase::Cleanup,
        Phase::Total,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::BridgeCall => "bridge_call",
            Phase::Decode => "decode",
            Phase::BuildPass => "build_pass",
            Phase::WirePass => "wire_pass",
            Phase::Cleanup => "cleanup",
            Phase::Total => "total",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of phase timings
pub trait Instrumentation: Send + Sync {
    fn record(&self, phase: Phase, elapsed: Duration);

    /// Called between batches of a large snapshot, after `batches` batches
    fn reclaim_hint(&self, _batches: usize) {}
}

/// Run `f` and report its duration under `phase`
pub fn timed<T>(instrumentation: &dyn Instrumentation, phase: Phase, f: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let result = f();
    instrumentation.record(phase, started.elapsed());
    result
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstrumentation;

impl Instrumentation for NoopInstrumentation {
    fn record(&self, _phase: Phase, _elapsed: Duration) {}
}

/// Logs every phase at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogInstrumentation;

impl Instrumentation for LogInstrumentation {
    fn record(&self, phase: Phase, elapsed: Duration) {
        log::debug!("--{} Execution time: {:.3} seconds", phase, elapsed.as_secs_f64());
    }

    fn reclaim_hint(&self, batches: usize) {
        log::trace!("Reclaim hint after {} batches", batches);
    }
}

/// Aggregated timings of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseStats {
    pub calls: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl PhaseStats {
    fn first(elapsed: Duration) -> Self {
        Self {
            calls: 1,
            total: elapsed,
            min: elapsed,
            max: elapsed,
        }
    }

    fn add(&mut self, elapsed: Duration) {
        self.calls += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.calls);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Accumulates per-phase statistics for the lifetime of one instance
#[derive(Debug, Default)]
pub struct PhaseTimings {
    stats: Mutex<IndexMap<Phase, PhaseStats>>,
    reclaim_hints: Mutex<u64>,
}

impl PhaseTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, phase: Phase) -> Option<PhaseStats> {
        self.stats.lock().ok().and_then(|stats| stats.get(&phase).copied())
    }

    /// Number of reclaim hints received
    pub fn reclaim_hints(&self) -> u64 {
        self.reclaim_hints.lock().map(|count| *count).unwrap_or(0)
    }

    pub fn reset(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.clear();
        }
        if let Ok(mut count) = self.reclaim_hints.lock() {
            *count = 0;
        }
    }

    /// Human-readable summary, slowest phase (by total time) first
    pub fn summary(&self) -> String {
        let mut entries: Vec<(Phase, PhaseStats)> = match self.stats.lock() {
            Ok(stats) => stats.iter().map(|(phase, stats)| (*phase, *stats)).collect(),
            Err(_) => Vec::new(),
        };

        if entries.is_empty() {
            return "No timing data collected yet".to_string();
        }

        entries.sort_by(|a, b| b.1.total.cmp(&a.1.total));
        entries
            .iter()
            .map(|(phase, stats)| {
                format!(
                    "{}: total={:.4}s calls={} avg={:.4}s max={:.4}s min={:.4}s",
                    phase,
                    stats.total.as_secs_f64(),
                    stats.calls,
                    stats.average().as_secs_f64(),
                    stats.max.as_secs_f64(),
                    stats.min.as_secs_f64()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Instrumentation for PhaseTimings {
    fn record(&self, phase: Phase, elapsed: Duration) {
        if let Ok(mut stats) = self.stats.lock() {
            stats
                .entry(phase)
                .and_modify(|entry| entry.add(elapsed))
                .or_insert_with(|| PhaseStats::first(elapsed));
        }
    }

    fn reclaim_hint(&self, _batches: usize) {
        if let Ok(mut count) = self.reclaim_hints.lock() {
            *count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_stats() {
        let timings = PhaseTimings::new();

        timings.record(Phase::Decode, Duration::from_millis(10));
        timings.record(Phase::Decode, Duration::from_millis(30));

        let stats = timings.get(Phase::Decode).unwrap();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.total, Duration::from_millis(40));
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(30));
        assert_eq!(stats.average(), Duration::from_millis(20));
        assert!(timings.get(Phase::Total).is_none());
    }

    #[test]
    fn test_average_with_huge_call_count() {
        let stats = PhaseStats {
            calls: 1 << 32,
            total: Duration::from_secs(1 << 32),
            min: Duration::from_secs(1),
            max: Duration::from_secs(1),
        };
        assert_eq!(stats.average(), Duration::from_secs(1));

        let empty = PhaseStats { calls: 0, ..stats };
        assert_eq!(empty.average(), Duration::ZERO);
    }

    #[test]
    fn test_summary_order() {
        let timings = PhaseTimings::new();
        assert_eq!(timings.summary(), "No timing data collected yet");

        timings.record(Phase::Decode, Duration::from_millis(1));
        timings.record(Phase::BridgeCall, Duration::from_millis(50));

        let summary = timings.summary();
        let lines: Vec<_> = summary.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("bridge_call: total=0.0500s calls=1"));
        assert!(lines[1].starts_with("decode:"));

        timings.reset();
        assert!(timings.get(Phase::Decode).is_none());
    }

    #[test]
    fn test_timed_passes_result_through() {
        let timings = PhaseTimings::new();
        let value = timed(&timings, Phase::Cleanup, || 7);

        assert_eq!(value, 7);
        assert_eq!(timings.get(Phase::Cleanup).unwrap().calls, 1);
    }

    #[test]
    fn test_reclaim_hints_counted() {
        let timings = PhaseTimings::new();
        timings.reclaim_hint(5);
        timings.reclaim_hint(10);
        assert_eq!(timings.reclaim_hints(), 2);

        // default hook is a no-op
        NoopInstrumentation.reclaim_hint(5);
    }
}
