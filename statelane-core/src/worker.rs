//! The worker lane
//!
//! A single tokio task that takes queued actions one at a time, in the order
//! they were accepted, and hands each to a blocking handler. The queue exists
//! from construction, so actions dispatched before [`Dispatcher::start`] wait
//! for the lane instead of being lost.
//!
//! Lifecycle: `Created -> Started -> Stopped`. Stopping is terminal.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::action::Action;
use crate::config::StopPolicy;
use crate::error::{DispatchError, LaneError};
use crate::fault::{panic_message, Fault, FaultSink};

/// Lifecycle state of a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    /// Accepting actions, but nothing processes them yet
    Created,
    /// The lane task is running
    Started,
    /// No longer accepting actions
    Stopped,
}

impl fmt::Display for LaneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LaneState::Created => "created",
            LaneState::Started => "started",
            LaneState::Stopped => "stopped",
        })
    }
}

/// Processes one action on the lane. Runs on tokio's blocking pool.
pub type LaneHandler<A> = Arc<dyn Fn(A) + Send + Sync>;

struct Lifecycle<A> {
    state: LaneState,
    tx: Option<mpsc::UnboundedSender<A>>,
    rx: Option<mpsc::UnboundedReceiver<A>>,
    task: Option<JoinHandle<()>>,
}

/// Actions accepted but not yet finished, with a wakeup for waiters.
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
        self.idle.notify_waiters();
    }
}

/// Serializes asynchronously dispatched actions through one background lane.
pub struct Dispatcher<A> {
    lifecycle: Mutex<Lifecycle<A>>,
    cancel: CancellationToken,
    pending: Arc<Pending>,
    policy: StopPolicy,
}

impl<A: Action> fmt::Debug for Dispatcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<A: Action> Dispatcher<A> {
    /// Create a dispatcher. The lane does not run until [`start`](Self::start).
    pub fn new(policy: StopPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            lifecycle: Mutex::new(Lifecycle {
                state: LaneState::Created,
                tx: Some(tx),
                rx: Some(rx),
                task: None,
            }),
            cancel: CancellationToken::new(),
            pending: Arc::new(Pending::default()),
            policy,
        }
    }

    /// Start the lane on the current tokio runtime.
    ///
    /// Calling this on a started lane does nothing. A stopped lane cannot be
    /// restarted.
    pub fn start(
        &self,
        handler: LaneHandler<A>,
        faults: Arc<dyn FaultSink>,
    ) -> Result<(), LaneError> {
        match self.state() {
            LaneState::Started => return Ok(()),
            LaneState::Stopped => return Err(LaneError::Stopped),
            LaneState::Created => {}
        }
        let handle = Handle::try_current().map_err(|_| LaneError::NoRuntime)?;
        self.start_on(&handle, handler, faults)
    }

    /// Start the lane on a specific runtime.
    pub fn start_on(
        &self,
        runtime: &Handle,
        handler: LaneHandler<A>,
        faults: Arc<dyn FaultSink>,
    ) -> Result<(), LaneError> {
        let mut lifecycle = self.lock();
        match lifecycle.state {
            LaneState::Started => {
                tracing::debug!("Worker lane already started");
                return Ok(());
            }
            LaneState::Stopped => return Err(LaneError::Stopped),
            LaneState::Created => {}
        }

        let Some(rx) = lifecycle.rx.take() else {
            return Err(LaneError::Stopped);
        };

        let lane = Lane {
            rx,
            handler,
            faults,
            cancel: self.cancel.clone(),
            pending: self.pending.clone(),
        };
        lifecycle.task = Some(runtime.spawn(lane.run()));
        lifecycle.state = LaneState::Started;
        tracing::debug!(policy = %self.policy, "Worker lane started");
        Ok(())
    }

    /// Queue an action. Never waits for the action to be processed.
    pub fn dispatch(&self, action: A) -> Result<(), DispatchError> {
        let lifecycle = self.lock();
        let Some(tx) = &lifecycle.tx else {
            tracing::debug!(action = %action.name(), "Dropping action dispatched after stop");
            return Err(DispatchError::Stopped);
        };

        self.pending.add();
        if tx.send(action).is_err() {
            // The receiver is only dropped once the lane has exited.
            self.pending.done();
            return Err(DispatchError::Stopped);
        }
        Ok(())
    }

    /// Stop accepting actions and release the lane.
    ///
    /// With [`StopPolicy::Drain`] the lane finishes every queued action
    /// before it exits. With [`StopPolicy::Discard`] queued actions that
    /// have not started are dropped. Stopping twice does nothing.
    pub fn stop(&self) {
        let mut lifecycle = self.lock();
        if lifecycle.state == LaneState::Stopped {
            return;
        }

        let was_started = lifecycle.state == LaneState::Started;
        lifecycle.state = LaneState::Stopped;
        lifecycle.tx = None;

        if !was_started {
            // Never started: nothing will ever drain the queue.
            lifecycle.rx = None;
            self.pending.reset();
        } else if self.policy == StopPolicy::Discard {
            self.cancel.cancel();
        }
        tracing::debug!(policy = %self.policy, was_started, "Worker lane stopping");
    }

    /// Current lifecycle state
    pub fn state(&self) -> LaneState {
        self.lock().state
    }

    /// Number of accepted actions whose cycle has not finished yet
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Wait until every accepted action has been processed (or discarded).
    ///
    /// Returns immediately when nothing is pending. If the lane was never
    /// started this waits until it is started or stopped.
    pub async fn idle(&self) {
        loop {
            let notified = self.pending.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for the lane task to exit. Only meaningful after [`stop`](Self::stop).
    pub async fn join(&self) {
        let task = self.lock().task.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "Worker lane task failed");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lifecycle<A>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A> Drop for Dispatcher<A> {
    fn drop(&mut self) {
        // Dropping the sender lets a draining lane finish on its own.
        if self.policy == StopPolicy::Discard {
            self.cancel.cancel();
        }
    }
}

struct Lane<A> {
    rx: mpsc::UnboundedReceiver<A>,
    handler: LaneHandler<A>,
    faults: Arc<dyn FaultSink>,
    cancel: CancellationToken,
    pending: Arc<Pending>,
}

impl<A: Action> Lane<A> {
    async fn run(mut self) {
        loop {
            let action = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(action) => action,
                    None => break,
                },
            };

            let name = action.name().to_string();
            let handler = self.handler.clone();
            let result = tokio::task::spawn_blocking(move || handler(action)).await;

            if let Err(err) = result {
                let message = if err.is_panic() {
                    panic_message(err.into_panic())
                } else {
                    err.to_string()
                };
                self.faults.report(&Fault::Lane {
                    action: name,
                    message,
                });
            }
            self.pending.done();
        }

        self.rx.close();
        let discarded = std::iter::from_fn(|| self.rx.try_recv().ok()).count();
        if discarded > 0 {
            tracing::debug!(discarded, "Worker lane discarded queued actions");
        }
        self.pending.reset();
        tracing::debug!("Worker lane exited");
    }
}
