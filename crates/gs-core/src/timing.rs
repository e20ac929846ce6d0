//! Per-phase wall-clock accounting for the implicit solve.
//!
//! Off by default; switched on with [`enable_timing`] or by setting the
//! `GS_TIMING` environment variable. When off, [`Timer`] never reads the
//! clock a second time and nothing is recorded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static ENABLED: AtomicBool = AtomicBool::new(false);

pub fn enable_timing() {
    ENABLED.store(true, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed) || std::env::var_os("GS_TIMING").is_some()
}

/// Measures one call of a solver phase.
pub struct Timer {
    start: Option<Instant>,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: is_enabled().then(Instant::now),
        }
    }

    /// Stop and charge the elapsed time to `phase`.
    pub fn record_into(self, phase: &PhaseTimer) {
        if let Some(start) = self.start {
            phase.add(start.elapsed());
        }
    }
}

/// Snapshot of one [`PhaseTimer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseStats {
    pub calls: u64,
    pub total: Duration,
    /// Longest single call
    pub longest: Duration,
}

impl PhaseStats {
    pub fn mean(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total.div_f64(self.calls as f64)
        }
    }
}

/// Lock-free accumulator shared by every worker running one phase.
pub struct PhaseTimer {
    calls: AtomicU64,
    total_ns: AtomicU64,
    longest_ns: AtomicU64,
}

impl PhaseTimer {
    pub const fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            total_ns: AtomicU64::new(0),
            longest_ns: AtomicU64::new(0),
        }
    }

    pub fn add(&self, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.total_ns.fetch_add(ns, Ordering::Relaxed);
        self.longest_ns.fetch_max(ns, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PhaseStats {
        PhaseStats {
            calls: self.calls.load(Ordering::Relaxed),
            total: Duration::from_nanos(self.total_ns.load(Ordering::Relaxed)),
            longest: Duration::from_nanos(self.longest_ns.load(Ordering::Relaxed)),
        }
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.total_ns.store(0, Ordering::Relaxed);
        self.longest_ns.store(0, Ordering::Relaxed);
    }
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// One accumulator per solver phase.
pub mod solver_timing {
    use super::PhaseTimer;

    /// Residual evaluations, full and fast
    pub static RESIDUAL: PhaseTimer = PhaseTimer::new();
    /// Finite-difference assembly; its residual calls also count under RESIDUAL
    pub static JACOBIAN: PhaseTimer = PhaseTimer::new();
    pub static LINEAR_SOLVE: PhaseTimer = PhaseTimer::new();
    pub static LINE_SEARCH: PhaseTimer = PhaseTimer::new();
    pub static FLOOR: PhaseTimer = PhaseTimer::new();

    fn phases() -> [(&'static str, &'static PhaseTimer); 5] {
        [
            ("residual", &RESIDUAL),
            ("jacobian", &JACOBIAN),
            ("linear_solve", &LINEAR_SOLVE),
            ("line_search", &LINE_SEARCH),
            ("floor", &FLOOR),
        ]
    }

    pub fn reset_all() {
        phases().iter().for_each(|(_, t)| t.reset());
    }

    /// One `info` event per phase that ran at least once.
    pub fn log_summary() {
        if !super::is_enabled() {
            return;
        }
        for (phase, timer) in phases() {
            let stats = timer.stats();
            if stats.calls == 0 {
                continue;
            }
            tracing::info!(
                phase,
                calls = stats.calls,
                total_ms = stats.total.as_secs_f64() * 1e3,
                mean_us = stats.mean().as_secs_f64() * 1e6,
                longest_us = stats.longest.as_secs_f64() * 1e6,
                "solver timing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_timer_tracks_total_mean_and_longest() {
        let phase = PhaseTimer::new();
        phase.add(Duration::from_millis(2));
        phase.add(Duration::from_millis(6));

        let stats = phase.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.total, Duration::from_millis(8));
        assert_eq!(stats.mean(), Duration::from_millis(4));
        assert_eq!(stats.longest, Duration::from_millis(6));

        phase.reset();
        assert_eq!(phase.stats(), PhaseStats::default());
        assert_eq!(phase.stats().mean(), Duration::ZERO);
    }

    #[test]
    fn enabled_timer_charges_its_phase() {
        enable_timing();
        let phase = PhaseTimer::new();
        Timer::start().record_into(&phase);
        assert_eq!(phase.stats().calls, 1);
    }
}
