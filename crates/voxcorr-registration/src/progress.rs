//! Progress observers for iterative correlation.
//!
//! Observers receive a snapshot after every accepted iteration. They are
//! purely informational: nothing they do can change the numeric result.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::status::ReturnStatus;

/// Snapshot of one iteration.
#[derive(Debug, Clone)]
pub struct IterationInfo {
    /// Current iteration number (1-based).
    pub iteration: usize,
    /// Iteration budget.
    pub max_iterations: usize,
    /// Normalised sum-of-squares error.
    pub error: f64,
    /// Norm of the last increment.
    pub delta_phi_norm: f64,
    /// Time elapsed since start.
    pub elapsed: Duration,
    /// Estimated remaining time if every iteration were used.
    pub estimated_remaining: Option<Duration>,
}

impl IterationInfo {
    /// Create a new snapshot.
    pub fn new(
        iteration: usize,
        max_iterations: usize,
        error: f64,
        delta_phi_norm: f64,
        elapsed: Duration,
    ) -> Self {
        Self {
            iteration,
            max_iterations,
            error,
            delta_phi_norm,
            elapsed,
            estimated_remaining: None,
        }
    }

    /// Fraction of the iteration budget used, in percent.
    pub fn progress_percent(&self) -> Option<f64> {
        if self.max_iterations == 0 {
            return None;
        }
        Some((self.iteration as f64 / self.max_iterations as f64) * 100.0)
    }

    /// Fill `estimated_remaining` from the mean iteration time.
    pub fn calculate_remaining(&mut self) {
        if self.iteration > 0 {
            let per_iteration = self.elapsed.as_secs_f64() / self.iteration as f64;
            let remaining = self.max_iterations.saturating_sub(self.iteration);
            self.estimated_remaining =
                Some(Duration::from_secs_f64(per_iteration * remaining as f64));
        }
    }
}

/// Observer of registration progress.
pub trait IterationObserver: Send + Sync {
    /// Called after every accepted iteration.
    fn on_iteration(&self, info: &IterationInfo);

    /// Called when a correlation run starts.
    fn on_start(&self) {
        // Default: no-op
    }

    /// Called when a multiscale level starts.
    fn on_level_start(&self, _binning: usize) {
        // Default: no-op
    }

    /// Called once with the terminal status.
    fn on_complete(&self, _status: ReturnStatus, _info: &IterationInfo) {
        // Default: no-op
    }
}

/// Observer that reports through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    /// Log interval (iterations).
    pub log_interval: usize,
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl TracingObserver {
    /// Create an observer that logs every `log_interval` iterations.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl IterationObserver for TracingObserver {
    fn on_iteration(&self, info: &IterationInfo) {
        if info.iteration % self.log_interval == 0 || info.iteration == info.max_iterations {
            let remaining = info
                .estimated_remaining
                .map(|d| format!("{:.2}s", d.as_secs_f64()))
                .unwrap_or_else(|| "N/A".to_string());
            tracing::info!(
                "Iter {}/{} ({:.1}%) | Error: {:.6} | dPhi: {:.3e} | Elapsed: {:.2}s | ETA: {}",
                info.iteration,
                info.max_iterations,
                info.progress_percent().unwrap_or(0.0),
                info.error,
                info.delta_phi_norm,
                info.elapsed.as_secs_f64(),
                remaining
            );
        }
    }

    fn on_start(&self) {
        tracing::info!("Correlation started");
    }

    fn on_level_start(&self, binning: usize) {
        tracing::info!("Binning level {}", binning);
    }

    fn on_complete(&self, status: ReturnStatus, info: &IterationInfo) {
        tracing::info!(
            "Correlation finished: {} after {} iterations in {:.2}s, error {:.6}",
            status,
            info.iteration,
            info.elapsed.as_secs_f64(),
            info.error
        );
    }
}

/// Observer that records every snapshot.
#[derive(Debug, Clone, Default)]
pub struct HistoryObserver {
    history: Arc<Mutex<Vec<IterationInfo>>>,
    levels: Arc<Mutex<Vec<usize>>>,
    outcome: Arc<Mutex<Option<ReturnStatus>>>,
}

impl HistoryObserver {
    /// Create a new history observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded iterations.
    pub fn history(&self) -> Vec<IterationInfo> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Binning levels announced so far.
    pub fn levels(&self) -> Vec<usize> {
        self.levels.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Status passed to the last `on_complete`.
    pub fn outcome(&self) -> Option<ReturnStatus> {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Clear the history.
    pub fn clear(&self) {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.levels.lock().unwrap_or_else(|e| e.into_inner()).clear();
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl IterationObserver for HistoryObserver {
    fn on_iteration(&self, info: &IterationInfo) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(info.clone());
    }

    fn on_level_start(&self, binning: usize) {
        self.levels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(binning);
    }

    fn on_complete(&self, status: ReturnStatus, _info: &IterationInfo) {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
    }
}

/// Fans events out to the attached observers and keeps time.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    observers: Vec<Arc<dyn IterationObserver>>,
    start_time: Option<Instant>,
}

impl ProgressTracker {
    /// Create a tracker with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker for an optional observer.
    pub fn with_observer(observer: Option<Arc<dyn IterationObserver>>) -> Self {
        Self {
            observers: observer.into_iter().collect(),
            start_time: None,
        }
    }

    /// Add an observer.
    pub fn add_observer(&mut self, observer: Arc<dyn IterationObserver>) {
        self.observers.push(observer);
    }

    /// True when nobody is listening.
    pub fn is_silent(&self) -> bool {
        self.observers.is_empty()
    }

    /// Start the clock and announce the run.
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        for observer in &self.observers {
            observer.on_start();
        }
    }

    /// Announce a multiscale level.
    pub fn level(&self, binning: usize) {
        for observer in &self.observers {
            observer.on_level_start(binning);
        }
    }

    /// Build a snapshot stamped with the elapsed time.
    pub fn snapshot(
        &self,
        iteration: usize,
        max_iterations: usize,
        error: f64,
        delta_phi_norm: f64,
    ) -> IterationInfo {
        let elapsed = self
            .start_time
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        let mut info =
            IterationInfo::new(iteration, max_iterations, error, delta_phi_norm, elapsed);
        info.calculate_remaining();
        info
    }

    /// Report an accepted iteration.
    pub fn update(&self, info: &IterationInfo) {
        for observer in &self.observers {
            observer.on_iteration(info);
        }
    }

    /// Report the terminal status.
    pub fn complete(&self, status: ReturnStatus, info: &IterationInfo) {
        for observer in &self.observers {
            observer.on_complete(status, info);
        }
    }
}
