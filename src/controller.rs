use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Result, StressError};
use crate::status::{self, StatusSnapshot};
use crate::worker::{self, DutyCycle, RunShared};

static GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Length of one busy+idle duty cycle.
    pub cycle_time: Duration,
    /// Upper bound on how long stop/start wait for old workers to exit.
    pub join_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cycle_time: Duration::from_millis(100),
            join_timeout: Duration::from_secs(1),
        }
    }
}

/// Validated parameters of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub duration: u64,
    pub load: u8,
}

impl RunConfig {
    pub fn new(duration: i64, load: i64) -> Result<Self> {
        if duration <= 0 {
            return Err(StressError::InvalidParameter {
                name: "duration",
                value: duration,
                reason: "must be a positive number of seconds",
            });
        }
        if !(0..=100).contains(&load) {
            return Err(StressError::InvalidParameter {
                name: "load",
                value: load,
                reason: "must be between 0 and 100",
            });
        }
        Ok(Self {
            duration: duration as u64,
            load: load as u8,
        })
    }
}

/// Effective configuration echoed back by [`StressController::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub workers: usize,
    pub duration: u64,
    pub load: u8,
}

struct RunState {
    generation: u64,
    shared: Arc<RunShared>,
    ends_at: Instant,
    running: bool,
    handles: Vec<JoinHandle<()>>,
    // Disconnects once every worker of this run has dropped its sender.
    exited: Receiver<()>,
}

impl RunState {
    /// Raises the stop flag and waits up to `timeout` for the workers to
    /// exit. Workers still alive afterwards are detached; returns how many.
    fn retire(&mut self, timeout: Duration) -> usize {
        self.shared.request_stop();
        self.running = false;
        if self.handles.is_empty() {
            return 0;
        }

        let deadline = Instant::now() + timeout;
        let all_exited = loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.exited.recv_timeout(left) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Disconnected) => break true,
                Err(RecvTimeoutError::Timeout) => break false,
            }
        };

        let mut stragglers = 0;
        for handle in self.handles.drain(..) {
            // Once the channel disconnects every worker has left its loop,
            // so joining only waits for thread teardown.
            if all_exited || handle.is_finished() {
                if handle.join().is_err() {
                    warn!(generation = self.generation, "cpu worker panicked");
                }
            } else {
                stragglers += 1;
            }
        }
        if stragglers > 0 {
            warn!(
                generation = self.generation,
                stragglers,
                timeout_ms = timeout.as_millis() as u64,
                "cpu workers did not exit in time, detaching them"
            );
        }
        stragglers
    }
}

/// Deadline `secs` seconds from now, or an error if it cannot be represented.
fn deadline_after(secs: u64) -> Result<Instant> {
    Instant::now()
        .checked_add(Duration::from_secs(secs))
        .ok_or(StressError::InvalidParameter {
            name: "duration",
            value: i64::try_from(secs).unwrap_or(i64::MAX),
            reason: "is too far in the future",
        })
}

#[derive(Default)]
struct ControllerState {
    run: Option<RunState>,
}

/// Owns the single live CPU stress run.
///
/// All operations lock the same state, so a start and a stop can never act
/// on the same run generation at once.
pub struct StressController {
    config: ControllerConfig,
    state: Mutex<ControllerState>,
}

impl Default for StressController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl StressController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn config(&self) -> ControllerConfig {
        self.config
    }

    /// Number of workers a run launches: one per available core.
    pub fn worker_count() -> usize {
        num_cpus::get().max(1)
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a run of `duration` seconds at `load` percent on every core,
    /// retiring any run already in progress.
    pub fn start(&self, duration: i64, load: i64) -> Result<StartReport> {
        let run_config = RunConfig::new(duration, load)?;
        // Reject unrepresentable deadlines before touching the current run.
        let _ = deadline_after(run_config.duration)?
            .checked_add(self.config.join_timeout)
            .ok_or(StressError::InvalidParameter {
                name: "duration",
                value: duration,
                reason: "is too far in the future",
            })?;
        let mut state = self.lock();

        if let Some(mut previous) = state.run.take() {
            if previous.running {
                info!(generation = previous.generation, "superseding cpu stress run");
            }
            previous.retire(self.config.join_timeout);
        }

        let generation = GENERATION.fetch_add(1, Ordering::Relaxed);
        let workers = Self::worker_count();
        let shared = Arc::new(RunShared::new());
        let duty = DutyCycle::new(self.config.cycle_time, run_config.load);
        let ends_at = deadline_after(run_config.duration)?;
        let (exit_tx, exited) = mpsc::channel::<()>();

        let mut run = RunState {
            generation,
            shared,
            ends_at,
            running: true,
            handles: Vec::with_capacity(workers),
            exited,
        };

        for index in 0..workers {
            let shared = Arc::clone(&run.shared);
            let worker_exit = exit_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("cpu-worker-{}", index))
                .spawn(move || {
                    worker::run_worker(ends_at, duty, &shared);
                    debug!(generation, worker = index, "cpu worker exited");
                    drop(worker_exit);
                });

            match spawned {
                Ok(handle) => run.handles.push(handle),
                Err(source) => {
                    error!(generation, worker = index, error = %source, "failed to launch cpu worker");
                    drop(exit_tx);
                    run.retire(self.config.join_timeout);
                    state.run = Some(run);
                    return Err(StressError::WorkerSpawn { index, source });
                }
            }
        }
        drop(exit_tx);

        info!(
            generation,
            workers,
            duration = run_config.duration,
            load = run_config.load,
            "cpu stress run started"
        );
        state.run = Some(run);

        Ok(StartReport {
            workers,
            duration: run_config.duration,
            load: run_config.load,
        })
    }

    /// Stops the current run, if any. Always succeeds.
    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(run) = state.run.as_mut() {
            let was_running = run.running;
            run.retire(self.config.join_timeout);
            if was_running {
                info!(
                    generation = run.generation,
                    iterations = run.shared.iterations(),
                    "cpu stress run stopped"
                );
            }
        }
    }

    /// Current progress. A run past its deadline is marked finished here.
    pub fn status(&self) -> StatusSnapshot {
        let mut state = self.lock();
        let Some(run) = state.run.as_mut() else {
            return StatusSnapshot::default();
        };

        let snapshot = status::snapshot(
            run.running,
            run.ends_at,
            run.shared.iterations(),
            Instant::now(),
        );
        if run.running && !snapshot.running {
            run.running = false;
            info!(
                generation = run.generation,
                iterations = snapshot.iterations,
                "cpu stress run completed"
            );
        }
        snapshot
    }
}

impl Drop for StressController {
    fn drop(&mut self) {
        if let Some(run) = self.lock().run.as_ref() {
            run.shared.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_accepts_bounds() {
        assert_eq!(
            RunConfig::new(1, 0).unwrap(),
            RunConfig {
                duration: 1,
                load: 0
            }
        );
        assert_eq!(RunConfig::new(60, 100).unwrap().load, 100);
    }

    #[test]
    fn run_config_rejects_non_positive_duration() {
        for duration in [0, -5] {
            assert!(matches!(
                RunConfig::new(duration, 50),
                Err(StressError::InvalidParameter { name: "duration", .. })
            ));
        }
    }

    #[test]
    fn run_config_rejects_load_out_of_range() {
        for load in [-1, 101, 150] {
            assert!(matches!(
                RunConfig::new(3, load),
                Err(StressError::InvalidParameter { name: "load", .. })
            ));
        }
    }

    #[test]
    fn worker_count_is_at_least_one() {
        assert!(StressController::worker_count() >= 1);
    }

    #[test]
    fn prompt_stop_joins_every_worker() {
        let controller = StressController::new(ControllerConfig {
            cycle_time: Duration::from_millis(5),
            join_timeout: Duration::from_secs(1),
        });
        for _ in 0..10 {
            controller.start(5, 100).unwrap();
            let mut state = controller.lock();
            let run = state.run.as_mut().unwrap();
            assert_eq!(run.retire(Duration::from_secs(1)), 0);
            assert!(run.handles.is_empty());
            assert!(!run.running);
        }
    }

    #[test]
    fn retire_counts_workers_that_outlive_the_timeout() {
        let controller = StressController::new(ControllerConfig {
            cycle_time: Duration::from_secs(1),
            join_timeout: Duration::from_secs(1),
        });
        controller.start(5, 0).unwrap();
        // Zero load: every worker is in its idle sleep for the whole cycle.
        thread::sleep(Duration::from_millis(50));

        let mut state = controller.lock();
        let run = state.run.as_mut().unwrap();
        assert_eq!(
            run.retire(Duration::ZERO),
            StressController::worker_count()
        );
        assert!(run.handles.is_empty());
    }

    #[test]
    fn fresh_controller_reports_idle() {
        let controller = StressController::default();
        assert_eq!(controller.status(), StatusSnapshot::default());
        controller.stop();
        assert_eq!(controller.status(), StatusSnapshot::default());
    }
}
