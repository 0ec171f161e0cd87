//! Per-cycle timing

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Wall-clock timing of one reduction cycle.
///
/// `total` covers the whole cycle including snapshotting, so it is never
/// smaller than [`phase_sum`](Self::phase_sum).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleProfile {
    /// Name of the action that drove the cycle
    pub action: String,
    pub total: Duration,
    pub before: Duration,
    pub reduce: Duration,
    pub notify: Duration,
    pub after: Duration,
}

impl CycleProfile {
    /// Sum of the four phase durations
    pub fn phase_sum(&self) -> Duration {
        self.before + self.reduce + self.notify + self.after
    }

    /// Log this profile at `info` on the `statelane::profile` target
    pub(crate) fn emit(&self) {
        tracing::info!(
            target: "statelane::profile",
            action = %self.action,
            total_us = self.total.as_micros() as u64,
            phases_us = self.phase_sum().as_micros() as u64,
            before_us = self.before.as_micros() as u64,
            reduce_us = self.reduce.as_micros() as u64,
            notify_us = self.notify.as_micros() as u64,
            after_us = self.after.as_micros() as u64,
            "{}",
            self
        );
    }
}

impl fmt::Display for CycleProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} total][{} phases][{} before][{} reduce][{} notify][{} after] action {}",
            millis(self.total),
            millis(self.phase_sum()),
            millis(self.before),
            millis(self.reduce),
            millis(self.notify),
            millis(self.after),
            self.action
        )
    }
}

fn millis(d: Duration) -> String {
    format!("{:.3}ms", d.as_secs_f64() * 1000.0)
}

/// Receives a [`CycleProfile`] for every cycle while profiling is enabled.
pub trait ProfileSink: Send + Sync {
    fn record(&self, profile: &CycleProfile);
}

impl<F> ProfileSink for F
where
    F: Fn(&CycleProfile) + Send + Sync,
{
    fn record(&self, profile: &CycleProfile) {
        self(profile)
    }
}

/// Accumulates phase timings while a cycle runs.
#[derive(Debug)]
pub(crate) struct PhaseTimer {
    started: Instant,
    before: Duration,
    reduce: Duration,
    notify: Duration,
    after: Duration,
}

impl PhaseTimer {
    pub(crate) fn start() -> Self {
        Self {
            started: Instant::now(),
            before: Duration::ZERO,
            reduce: Duration::ZERO,
            notify: Duration::ZERO,
            after: Duration::ZERO,
        }
    }

    /// Run `f`, returning its output and how long it took
    pub(crate) fn time<T>(f: impl FnOnce() -> T) -> (T, Duration) {
        let started = Instant::now();
        let out = f();
        (out, started.elapsed())
    }

    pub(crate) fn before(&mut self, f: impl FnOnce()) {
        self.before = Self::time(f).1;
    }

    pub(crate) fn reduce<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let (out, elapsed) = Self::time(f);
        self.reduce = elapsed;
        out
    }

    pub(crate) fn notify<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let (out, elapsed) = Self::time(f);
        self.notify = elapsed;
        out
    }

    pub(crate) fn after(&mut self, f: impl FnOnce()) {
        self.after = Self::time(f).1;
    }

    pub(crate) fn finish(self, action: &str) -> CycleProfile {
        CycleProfile {
            action: action.to_string(),
            total: self.started.elapsed(),
            before: self.before,
            reduce: self.reduce,
            notify: self.notify,
            after: self.after,
        }
    }
}
