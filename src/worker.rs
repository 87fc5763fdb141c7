use std::hint::black_box;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// State shared by every worker of one run generation.
///
/// Workers only ever hold the `RunShared` of the run that launched them, so
/// a straggler from a superseded run can never touch a newer run's counter.
#[derive(Debug, Default)]
pub struct RunShared {
    iterations: AtomicU64,
    stop: AtomicBool,
}

impl RunShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }
}

/// Busy and idle split of one cycle for a target load percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    pub busy: Duration,
    pub idle: Duration,
}

impl DutyCycle {
    /// `load` above 100 is treated as 100.
    pub fn new(cycle_time: Duration, load: u8) -> Self {
        let load = u32::from(load.min(100));
        let busy = cycle_time
            .checked_mul(load)
            .map_or(cycle_time / 100 * load, |scaled| scaled / 100);
        Self {
            busy,
            idle: cycle_time - busy,
        }
    }
}

/// One fixed-cost unit of CPU-bound work.
fn burn() -> u64 {
    (0..10_000u64).fold(0u64, |acc, x| acc.wrapping_add(black_box(x * x)))
}

/// Duty-cycle loop run by every worker thread until `ends_at` passes or the
/// run's stop flag is raised.
pub fn run_worker(ends_at: Instant, duty: DutyCycle, shared: &RunShared) {
    while Instant::now() < ends_at && !shared.stop_requested() {
        let cycle_start = Instant::now();
        while cycle_start.elapsed() < duty.busy && !shared.stop_requested() {
            black_box(burn());
            shared.record_iteration();
        }

        if !duty.idle.is_zero() && !shared.stop_requested() {
            let left = ends_at.saturating_duration_since(Instant::now());
            thread::sleep(duty.idle.min(left));
        }
    }
}
