//! Frame counters and a once-per-second throughput log.

use std::time::Duration;

use frameloop_core::Timer;
use tracing::info;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Running frame counters.
#[derive(Debug, Clone)]
pub struct FrameStats {
    presented: u64,
    skipped: u64,
    recreates: u64,
    last_cpu_time: Duration,
    report_timer: Timer,
    frames_since_report: u32,
    fps: f64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            presented: 0,
            skipped: 0,
            recreates: 0,
            last_cpu_time: Duration::ZERO,
            report_timer: Timer::new(),
            frames_since_report: 0,
            fps: 0.0,
        }
    }

    /// Frames that reached the present call with the surface intact.
    #[inline]
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Cycles that ended without presenting (recreate or deferred).
    #[inline]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Successful surface rebuilds.
    #[inline]
    pub fn recreates(&self) -> u64 {
        self.recreates
    }

    /// CPU time of the most recent cycle.
    #[inline]
    pub fn last_cpu_time(&self) -> Duration {
        self.last_cpu_time
    }

    /// Frames per second over the last full report window.
    #[inline]
    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub(crate) fn record_presented(&mut self, cpu_time: Duration) {
        self.presented += 1;
        self.frames_since_report += 1;
        self.last_cpu_time = cpu_time;
        self.maybe_report();
    }

    pub(crate) fn record_skipped(&mut self, cpu_time: Duration) {
        self.skipped += 1;
        self.last_cpu_time = cpu_time;
    }

    pub(crate) fn record_recreate(&mut self) {
        self.recreates += 1;
    }

    fn maybe_report(&mut self) {
        let window = self.report_timer.since_tick();
        if window < REPORT_INTERVAL {
            return;
        }

        self.fps = f64::from(self.frames_since_report) / window.as_secs_f64();
        info!(
            "{:.1} fps, cpu {:.2} ms/frame, {} presented, {} skipped, {} recreates",
            self.fps,
            self.last_cpu_time.as_secs_f64() * 1000.0,
            self.presented,
            self.skipped,
            self.recreates
        );

        self.report_timer.tick();
        self.frames_since_report = 0;
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}
