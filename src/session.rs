//! Detection session: the live loop and its lifecycle.
//!
//! ```text
//! Idle --start()--> Running --stop() / source exhausted--> Stopping --cleanup--> Idle
//! ```
//!
//! One worker thread runs the loop. The controller side only flips the state and
//! the stop signal; everything the worker and controllers share lives behind a
//! mutex and is read out as copies.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;
use thiserror::Error;

use crate::detect::{DetectionResult, DetectorBackend};
use crate::ingest::FrameSource;
use crate::sink::{FrameReport, FrameSink};
use crate::stats::{StatsAggregate, StatsSnapshot};

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

/// Why `start()` refused to begin a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("detection already active")]
    AlreadyActive,
    #[error("frame source unavailable: {0:#}")]
    SourceUnavailable(anyhow::Error),
    #[error("failed to spawn detection worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// What one loop iteration did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    /// Frame analyzed and published.
    Processed(DetectionResult),
    /// Detector faulted; the frame was counted and published as negative.
    DetectorFaulted,
    /// Frame read failed; nothing was counted or published.
    Skipped,
    /// Source has no more frames; the loop ends.
    Exhausted,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Minimum pause between iterations. A rate cap, not a precise timer.
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

type SourceFactory = dyn Fn() -> Result<Box<dyn FrameSource>> + Send + Sync;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stop flag the worker can sleep on.
#[derive(Default)]
struct StopSignal {
    requested: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    fn reset(&self) {
        *lock(&self.requested) = false;
    }

    fn request(&self) {
        *lock(&self.requested) = true;
        self.cvar.notify_all();
    }

    fn is_requested(&self) -> bool {
        *lock(&self.requested)
    }

    /// Sleep up to `timeout`, waking early on a stop request. Returns true if a stop
    /// was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = lock(&self.requested);
        let (guard, _) = self
            .cvar
            .wait_timeout_while(guard, timeout, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

struct Shared {
    state: Mutex<SessionState>,
    stats: Mutex<StatsAggregate>,
    last_outcome: Mutex<Option<StepOutcome>>,
    stop: StopSignal,
}

/// Controllable live detection loop.
///
/// Each `start()` builds a fresh source from the factory and a fresh
/// `StatsAggregate`; nothing carries over between sessions.
pub struct DetectionSession {
    factory: Box<SourceFactory>,
    detector: Arc<dyn DetectorBackend>,
    sink: Arc<dyn FrameSink>,
    config: SessionConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Serializes `start()` callers while the source is being opened.
    start_gate: Mutex<()>,
}

impl DetectionSession {
    pub fn new<F>(
        factory: F,
        detector: Arc<dyn DetectorBackend>,
        sink: Arc<dyn FrameSink>,
        config: SessionConfig,
    ) -> Self
    where
        F: Fn() -> Result<Box<dyn FrameSource>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            detector,
            sink,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::Idle),
                stats: Mutex::new(StatsAggregate::new()),
                last_outcome: Mutex::new(None),
                stop: StopSignal::default(),
            }),
            worker: Mutex::new(None),
            start_gate: Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.shared.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Statistics of the current (or most recent) session.
    pub fn stats(&self) -> StatsSnapshot {
        lock(&self.shared.stats).snapshot()
    }

    /// What the most recent loop iteration of the current (or last) session did.
    pub fn last_outcome(&self) -> Option<StepOutcome> {
        *lock(&self.shared.last_outcome)
    }

    /// Acquire the source and start the worker.
    ///
    /// Only valid from `Idle`. The source is opened on the caller's thread, so an
    /// unavailable device is reported here and the session never reaches `Running`.
    /// The state lock is not held while the source opens; concurrent `start()`
    /// callers queue on the start gate instead.
    pub fn start(&self) -> Result<(), SessionError> {
        let _gate = lock(&self.start_gate);
        {
            let state = lock(&self.shared.state);
            if *state != SessionState::Idle {
                log::warn!("DetectionSession: start rejected, session is {:?}", *state);
                return Err(SessionError::AlreadyActive);
            }
        }

        // A worker that ended on source exhaustion has already set Idle as its
        // last act, so joining it here cannot block.
        if let Some(finished) = lock(&self.worker).take() {
            join_worker(finished);
        }

        // Reset before opening so a stop() issued during a slow open is honored
        // on the worker's first iteration.
        self.shared.stop.reset();

        let mut source = (self.factory)().map_err(SessionError::SourceUnavailable)?;
        if let Err(err) = source.open() {
            source.release();
            log::error!("DetectionSession: could not open {}: {:#}", source.name(), err);
            return Err(SessionError::SourceUnavailable(err));
        }

        *lock(&self.shared.stats) = StatsAggregate::new();
        *lock(&self.shared.last_outcome) = None;

        let worker = Worker {
            source,
            detector: self.detector.clone(),
            sink: self.sink.clone(),
            config: self.config.clone(),
            shared: self.shared.clone(),
        };

        // Only start() leaves Idle and the gate is held, so the state is still Idle.
        // Holding the state lock across spawn keeps the worker from observing Idle.
        let mut state = lock(&self.shared.state);
        let handle = std::thread::Builder::new()
            .name("firewatch-detect".to_string())
            .spawn(move || worker.run())?;

        *state = SessionState::Running;
        *lock(&self.worker) = Some(handle);
        log::info!("DetectionSession: detection started");
        Ok(())
    }

    /// Signal the loop to stop and wait for it to release the source.
    ///
    /// Idempotent: stopping an idle session is a no-op. The in-flight iteration, if
    /// any, completes first; the pacing sleep is cut short.
    pub fn stop(&self) -> Result<()> {
        let handle = {
            let mut state = lock(&self.shared.state);
            if *state == SessionState::Running {
                *state = SessionState::Stopping;
            }
            self.shared.stop.request();
            lock(&self.worker).take()
        };

        match handle {
            Some(handle) => {
                handle
                    .join()
                    .map_err(|_| anyhow!("detection worker panicked"))?;
                log::info!("DetectionSession: detection stopped");
            }
            None => log::debug!("DetectionSession: stop requested while idle"),
        }
        Ok(())
    }

    /// Block until the current worker exits on its own (source exhaustion) or
    /// another thread calls `stop()`.
    pub fn join(&self) -> Result<()> {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| anyhow!("detection worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for DetectionSession {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("DetectionSession: shutdown failed: {:#}", err);
        }
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("DetectionSession: previous detection worker panicked");
    }
}

struct Worker {
    source: Box<dyn FrameSource>,
    detector: Arc<dyn DetectorBackend>,
    sink: Arc<dyn FrameSink>,
    config: SessionConfig,
    shared: Arc<Shared>,
}

impl Worker {
    fn run(mut self) {
        log::info!(
            "DetectionSession: loop running on {} with {}",
            self.source.name(),
            self.detector.name()
        );

        loop {
            if self.shared.stop.is_requested() {
                break;
            }
            let outcome = self.step();
            *lock(&self.shared.last_outcome) = Some(outcome);
            if outcome == StepOutcome::Exhausted {
                log::info!("DetectionSession: {} exhausted", self.source.name());
                break;
            }
            if self.shared.stop.wait(self.config.frame_interval) {
                break;
            }
        }

        {
            let mut state = lock(&self.shared.state);
            if *state == SessionState::Running {
                *state = SessionState::Stopping;
            }
        }
        self.source.release();

        let stats = lock(&self.shared.stats).snapshot();
        log::info!(
            "DetectionSession: loop finished: frames={} fire_frames={} alerts={}",
            stats.total_frames,
            stats.fire_detected_frames,
            stats.alerts_sent
        );

        *lock(&self.shared.state) = SessionState::Idle;
    }

    fn step(&mut self) -> StepOutcome {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return StepOutcome::Exhausted,
            Err(err) => {
                log::warn!("DetectionSession: frame read failed, skipping: {:#}", err);
                return StepOutcome::Skipped;
            }
        };

        let (result, outcome) = match self.detector.analyze(&frame) {
            Ok(result) => (result, StepOutcome::Processed(result)),
            Err(err) => {
                log::warn!(
                    "DetectionSession: {} faulted, counting frame as negative: {:#}",
                    self.detector.name(),
                    err
                );
                (DetectionResult::default(), StepOutcome::DetectorFaulted)
            }
        };

        let stats = {
            let mut stats = lock(&self.shared.stats);
            stats.record(result.detected);
            stats.snapshot()
        };
        if result.detected {
            log::warn!(
                "DetectionSession: fire detected, confidence {:.1}% (alert #{})",
                result.confidence,
                stats.alerts_sent
            );
        }

        let mut report = FrameReport::build(&frame, result, stats, self.config.jpeg_quality);
        if outcome == StepOutcome::DetectorFaulted {
            report = report.with_fault();
        }
        if let Err(err) = self.sink.publish(&report) {
            log::warn!("DetectionSession: frame delivery failed: {:#}", err);
        }
        outcome
    }
}

impl Drop for Worker {
    // Also reached when the thread never spawned and `run` did not execute.
    fn drop(&mut self) {
        self.source.release();
    }
}
