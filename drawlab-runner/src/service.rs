//! Backtest service: run/poll protocol over the simulator.
//!
//! `submit` records a `pending` run and returns its id immediately; a named
//! background thread drives the simulator and writes the outcome to the
//! result sink. Callers poll with `status`, stop a run with `cancel`, or
//! block on `wait`. A panic inside the simulator fails the run like any
//! permanent error.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::feed::{ResultSink, RunId, RunRecord};
use crate::simulator::{BacktestRequest, Simulator};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-run handle owned by the service.
struct RunHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

pub struct BacktestService {
    simulator: Arc<Simulator>,
    sink: Arc<dyn ResultSink>,
    max_retries: u32,
    runs: Mutex<HashMap<RunId, RunHandle>>,
}

impl BacktestService {
    pub fn new(simulator: Arc<Simulator>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            simulator,
            sink,
            max_retries: DEFAULT_MAX_RETRIES,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Retries allowed after the first attempt for transient failures.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<RunId, RunHandle>> {
        // A panicked worker cannot leave the map half-written.
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a pending run and start it in the background.
    pub fn submit(&self, request: BacktestRequest) -> RunId {
        let run_id = self.sink.create(&request);
        let cancel = Arc::new(AtomicBool::new(false));

        let simulator = Arc::clone(&self.simulator);
        let sink = Arc::clone(&self.sink);
        let worker_cancel = Arc::clone(&cancel);
        let worker_id = run_id.clone();
        let max_retries = self.max_retries;

        let spawned = thread::Builder::new()
            .name(format!("drawlab-backtest-{}", &run_id[..run_id.len().min(8)]))
            .spawn(move || {
                drive(&simulator, sink.as_ref(), &worker_id, &request, &worker_cancel, max_retries);
            });

        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "failed to spawn backtest thread");
                self.sink.fail(&run_id, &format!("spawn failed: {e}"));
                None
            }
        };

        info!(run_id = %run_id, "backtest submitted");
        let mut runs = self.runs();
        runs.retain(|id, _| !self.is_final(id));
        runs.insert(run_id.clone(), RunHandle { cancel, thread });
        run_id
    }

    fn is_final(&self, run_id: &str) -> bool {
        self.sink.get(run_id).is_some_and(|r| r.status.is_final())
    }

    pub fn status(&self, run_id: &str) -> Option<RunRecord> {
        self.sink.get(run_id)
    }

    /// Request cancellation. Returns false for unknown or already finished runs.
    pub fn cancel(&self, run_id: &str) -> bool {
        let runs = self.runs();
        let Some(handle) = runs.get(run_id) else {
            return false;
        };
        if self.is_final(run_id) {
            return false;
        }
        handle.cancel.store(true, Ordering::Relaxed);
        info!(run_id, "backtest cancellation requested");
        true
    }

    /// Block until the run's thread exits, then return its final record.
    /// The run's handle is released.
    pub fn wait(&self, run_id: &str) -> Option<RunRecord> {
        let handle = self.runs().remove(run_id);
        if let Some(thread) = handle.and_then(|mut h| h.thread.take()) {
            if thread.join().is_err() {
                error!(run_id, "backtest thread panicked");
                self.sink.fail(run_id, "backtest thread panicked");
            }
        }
        self.sink.get(run_id)
    }

    /// Runs still holding a handle: in flight, or finished but not yet swept.
    pub fn tracked(&self) -> usize {
        self.runs().len()
    }
}

impl Drop for BacktestService {
    fn drop(&mut self) {
        let runs = self.runs.get_mut().unwrap_or_else(|e| e.into_inner());
        for handle in runs.values() {
            handle.cancel.store(true, Ordering::Relaxed);
        }
        for (_, mut handle) in runs.drain() {
            if let Some(thread) = handle.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

/// Worker body: attempt, retry transient failures, write the outcome.
fn drive(
    simulator: &Simulator,
    sink: &dyn ResultSink,
    run_id: &str,
    request: &BacktestRequest,
    cancel: &AtomicBool,
    max_retries: u32,
) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        sink.mark_running(run_id, attempt);
        let attempted =
            panic::catch_unwind(AssertUnwindSafe(|| simulator.run(run_id, request, cancel)));
        let result = match attempted {
            Ok(result) => result,
            Err(payload) => {
                let reason = format!("strategy panicked: {}", panic_message(payload.as_ref()));
                error!(run_id, attempt, reason = %reason, "backtest worker panicked");
                sink.fail(run_id, &reason);
                return;
            }
        };
        match result {
            Ok(stats) => {
                sink.finalize(run_id, stats);
                return;
            }
            Err(e) if !e.is_permanent() && attempt <= max_retries => {
                warn!(run_id, attempt, error = %e, "backtest attempt failed, retrying");
            }
            Err(e) => {
                error!(run_id, attempt, error = %e, "backtest failed");
                sink.fail(run_id, &e.to_string());
                return;
            }
        }
    }
}

/// Text carried by a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
