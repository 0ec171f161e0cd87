//! The reduction engine
//!
//! Owns the current state and the three hook registries, and runs one
//! reduction cycle per action:
//!
//! ```text
//!  snapshot hooks + S0
//!        │
//!        ▼
//!  before(S0, a)   ── every middleware, concurrently ── barrier
//!        │
//!        ▼
//!  fold reducers   ── sequential, registration order ── publish S1
//!        │
//!        ▼
//!  has_changed(S1, S0) → on_changed(S1)
//!                  ── every listener, concurrently ──── barrier
//!        │
//!        ▼
//!  after(S1, a)    ── every middleware, concurrently ── barrier
//! ```
//!
//! The fold is the only place state is written. It runs under a lock so two
//! cycles never interleave their folds, even when synchronous dispatches race
//! with the worker lane.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rayon::prelude::*;

use crate::action::Action;
use crate::config::{shared_hook_pool, StoreConfig};
use crate::error::ConfigError;
use crate::fault::{panic_message, Fault, FaultSink, Phase, TracingFaultSink};
use crate::listener::StateListener;
use crate::middleware::Middleware;
use crate::profile::{CycleProfile, PhaseTimer, ProfileSink};
use crate::reducer::Reducer;
use crate::registry::Registry;

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The fold completed and its result was published.
    Committed {
        /// Listeners whose `on_changed` ran
        notified: usize,
    },
    /// A reducer failed; state was left at its pre-cycle value and the
    /// notify and after phases were skipped.
    Aborted(Fault),
}

impl CycleOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CycleOutcome::Committed { .. })
    }
}

/// Result of one reduction cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Sequence number of the cycle, starting at 1
    pub sequence: u64,
    pub outcome: CycleOutcome,
    pub profile: CycleProfile,
}

/// State container and cycle runner.
///
/// Most applications use it through [`Store`](crate::Store), which adds the
/// worker lane. The engine alone is enough for purely synchronous use.
pub struct ReductionEngine<S, A> {
    state: RwLock<Arc<S>>,
    fold_lock: Mutex<()>,
    reducers: Registry<dyn Reducer<S, A>>,
    middlewares: Registry<dyn Middleware<S, A>>,
    listeners: Registry<dyn StateListener<S>>,
    fault_sink: Arc<dyn FaultSink>,
    profile_sink: Option<Arc<dyn ProfileSink>>,
    trace_profile: AtomicBool,
    pool: Option<rayon::ThreadPool>,
    cycles: AtomicU64,
}

impl<S, A> std::fmt::Debug for ReductionEngine<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReductionEngine")
            .field("reducers", &self.reducers.len())
            .field("middlewares", &self.middlewares.len())
            .field("listeners", &self.listeners.len())
            .field("trace_profile", &self.trace_profile.load(Ordering::Relaxed))
            .field("cycles", &self.cycles.load(Ordering::Relaxed))
            .finish()
    }
}

impl<S, A> ReductionEngine<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    /// Create an engine with default configuration
    pub fn new(state: S) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
            fold_lock: Mutex::new(()),
            reducers: Registry::new(),
            middlewares: Registry::new(),
            listeners: Registry::new(),
            fault_sink: Arc::new(TracingFaultSink),
            profile_sink: None,
            trace_profile: AtomicBool::new(false),
            pool: None,
            cycles: AtomicU64::new(0),
        }
    }

    /// Create an engine from a configuration
    pub fn with_config(state: S, config: &StoreConfig) -> Result<Self, ConfigError> {
        let mut engine = Self::new(state);
        engine.pool = config.build_hook_pool()?;
        engine.trace_profile = AtomicBool::new(config.trace_profile);
        Ok(engine)
    }

    /// Replace the sink that receives collaborator faults
    pub fn set_fault_sink(&mut self, sink: Arc<dyn FaultSink>) {
        self.fault_sink = sink;
    }

    /// Set the sink that receives cycle profiles while profiling is enabled
    pub fn set_profile_sink(&mut self, sink: Arc<dyn ProfileSink>) {
        self.profile_sink = Some(sink);
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<S> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reducers(&self) -> &Registry<dyn Reducer<S, A>> {
        &self.reducers
    }

    pub fn middlewares(&self) -> &Registry<dyn Middleware<S, A>> {
        &self.middlewares
    }

    pub fn listeners(&self) -> &Registry<dyn StateListener<S>> {
        &self.listeners
    }

    pub fn fault_sink(&self) -> &Arc<dyn FaultSink> {
        &self.fault_sink
    }

    /// Enable or disable per-cycle profiling
    pub fn set_trace_profile(&self, enabled: bool) {
        self.trace_profile.store(enabled, Ordering::Relaxed);
    }

    pub fn trace_profile(&self) -> bool {
        self.trace_profile.load(Ordering::Relaxed)
    }

    /// Number of cycles started so far
    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Run one full reduction cycle on the calling thread.
    ///
    /// Blocks until every phase has finished. Collaborator faults are
    /// reported to the fault sink and never returned as errors.
    pub fn run_cycle(&self, action: &A) -> CycleReport {
        let sequence = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let mut timer = PhaseTimer::start();

        let reducers = self.reducers.snapshot();
        let middlewares = self.middlewares.snapshot();
        let listeners = self.listeners.snapshot();
        let before_state = self.state();

        timer.before(|| {
            self.fan_out(&middlewares[..], |middleware| {
                self.guard_middleware(Phase::Before, action, || {
                    middleware.before(&before_state, action)
                });
            });
        });

        let folded = timer.reduce(|| self.fold(&reducers, action));

        let outcome = match folded {
            Ok((old_state, new_state)) => {
                let notified =
                    timer.notify(|| self.notify(&listeners, action, &new_state, &old_state));

                timer.after(|| {
                    self.fan_out(&middlewares[..], |middleware| {
                        self.guard_middleware(Phase::After, action, || {
                            middleware.after(&new_state, action)
                        });
                    });
                });

                CycleOutcome::Committed { notified }
            }
            Err(fault) => {
                self.fault_sink.report(&fault);
                CycleOutcome::Aborted(fault)
            }
        };

        let profile = timer.finish(action.name());
        if self.trace_profile() {
            profile.emit();
            if let Some(sink) = &self.profile_sink {
                sink.record(&profile);
            }
        }

        CycleReport {
            sequence,
            outcome,
            profile,
        }
    }

    /// Fold every reducer over the current state and publish the result.
    ///
    /// Returns `(old, new)`. On failure nothing is published.
    fn fold(
        &self,
        reducers: &[Arc<dyn Reducer<S, A>>],
        action: &A,
    ) -> Result<(Arc<S>, Arc<S>), Fault> {
        let _guard = self.fold_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self.state();

        if reducers.is_empty() {
            return Ok((base.clone(), base));
        }

        let mut running = S::clone(&base);
        for (index, reducer) in reducers.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| reducer.reduce(running, action)));
            running = match result {
                Ok(Ok(next)) => next,
                Ok(Err(err)) => {
                    return Err(Fault::Reducer {
                        action: action.name().to_string(),
                        index,
                        message: err.to_string(),
                    })
                }
                Err(payload) => {
                    return Err(Fault::Reducer {
                        action: action.name().to_string(),
                        index,
                        message: panic_message(payload),
                    })
                }
            };
        }

        let next = Arc::new(running);
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        Ok((base, next))
    }

    fn notify(
        &self,
        listeners: &[Arc<dyn StateListener<S>>],
        action: &A,
        new_state: &S,
        old_state: &S,
    ) -> usize {
        let notified = AtomicUsize::new(0);
        self.fan_out(listeners, |listener| {
            let result = catch_unwind(AssertUnwindSafe(|| {
                if listener.has_changed(new_state, old_state) {
                    listener.on_changed(new_state);
                    notified.fetch_add(1, Ordering::Relaxed);
                }
            }));
            if let Err(payload) = result {
                self.fault_sink.report(&Fault::Listener {
                    action: action.name().to_string(),
                    message: panic_message(payload),
                });
            }
        });
        notified.into_inner()
    }

    fn guard_middleware(&self, phase: Phase, action: &A, hook: impl FnOnce()) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(hook)) {
            self.fault_sink.report(&Fault::Middleware {
                action: action.name().to_string(),
                phase,
                message: panic_message(payload),
            });
        }
    }

    /// Call `f` for every hook concurrently and return once all calls finished.
    fn fan_out<T>(&self, hooks: &[Arc<T>], f: impl Fn(&T) + Send + Sync)
    where
        T: ?Sized + Send + Sync,
    {
        match hooks {
            [] => {}
            [only] => f(&**only),
            _ => {
                let run = || hooks.par_iter().for_each(|hook| f(&**hook));
                let pool = match &self.pool {
                    Some(pool) => Some(pool),
                    None => shared_hook_pool(),
                };
                match pool {
                    Some(pool) => pool.install(run),
                    None => run(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::NamedAction;
    use crate::error::ReduceError;
    use crate::listener::{listener, watch};
    use crate::reducer::pure;
    use crate::testing::{CollectingFaultSink, CollectingProfileSink, RecordingListener};
    use std::sync::Barrier;
    use std::time::Duration;

    type TestAction = NamedAction<i64>;

    /// Blocks in `before` until its partner arrives too
    struct Rendezvous(Arc<Barrier>);

    impl Middleware<i64, TestAction> for Rendezvous {
        fn before(&self, _: &i64, _: &TestAction) {
            self.0.wait();
        }

        fn after(&self, _: &i64, _: &TestAction) {}
    }

    fn engine(initial: i64) -> ReductionEngine<i64, TestAction> {
        ReductionEngine::new(initial)
    }

    fn act(name: &str) -> TestAction {
        NamedAction::new(name, 0)
    }

    #[test]
    fn test_single_reducer_and_listener() {
        let engine = engine(0);
        engine.reducers().add(Arc::new(pure(|s: i64, _: &TestAction| s + 1)));
        let recorder = Arc::new(RecordingListener::<i64>::new());
        engine.listeners().add(recorder.clone());

        let report = engine.run_cycle(&act("inc"));

        assert_eq!(*engine.state(), 1);
        assert_eq!(report.outcome, CycleOutcome::Committed { notified: 1 });
        assert_eq!(recorder.changes(), vec![1]);
    }

    #[test]
    fn test_reducers_fold_in_registration_order() {
        let engine = engine(3);
        engine.reducers().add(Arc::new(pure(|s: i64, _: &TestAction| s + 1)));
        engine.reducers().add(Arc::new(pure(|s: i64, _: &TestAction| s * 2)));

        engine.run_cycle(&act("x"));
        assert_eq!(*engine.state(), 8);
    }

    #[test]
    fn test_failing_reducer_keeps_state_and_skips_listeners() {
        let sink = Arc::new(CollectingFaultSink::new());
        let mut engine = engine(10);
        engine.set_fault_sink(sink.clone());

        engine.reducers().add(Arc::new(pure(|s: i64, _: &TestAction| s + 1)));
        engine.reducers().add(Arc::new(|s: i64, a: &TestAction| {
            if a.name() == "bad" {
                Err(ReduceError::new("rejected"))
            } else {
                Ok(s)
            }
        }));
        let recorder = Arc::new(RecordingListener::<i64>::new());
        engine.listeners().add(recorder.clone());

        let report = engine.run_cycle(&act("bad"));

        assert_eq!(*engine.state(), 10);
        assert!(!report.outcome.is_committed());
        assert!(recorder.changes().is_empty());
        assert_eq!(
            sink.faults(),
            vec![Fault::Reducer {
                action: "bad".into(),
                index: 1,
                message: "rejected".into(),
            }]
        );
    }

    #[test]
    fn test_panicking_reducer_is_a_fault() {
        let sink = Arc::new(CollectingFaultSink::new());
        let mut engine = engine(1);
        engine.set_fault_sink(sink.clone());
        engine
            .reducers()
            .add(Arc::new(pure(|_: i64, _: &TestAction| -> i64 { panic!("bug") })));

        let report = engine.run_cycle(&act("x"));
        assert!(matches!(report.outcome, CycleOutcome::Aborted(Fault::Reducer { .. })));
        assert_eq!(*engine.state(), 1);
        assert_eq!(sink.len(), 1);

        // The engine keeps working afterwards
        engine.reducers().clear();
        engine.reducers().add(Arc::new(pure(|s: i64, _: &TestAction| s + 5)));
        engine.run_cycle(&act("y"));
        assert_eq!(*engine.state(), 6);
    }

    #[test]
    fn test_listener_not_notified_without_change() {
        let engine = engine(0);
        engine.reducers().add(Arc::new(pure(|s: i64, a: &TestAction| s + a.payload())));
        let recorder = Arc::new(RecordingListener::<i64>::new());
        engine.listeners().add(recorder.clone());

        let report = engine.run_cycle(&NamedAction::new("noop", 0));
        assert_eq!(report.outcome, CycleOutcome::Committed { notified: 0 });
        assert!(recorder.changes().is_empty());

        engine.run_cycle(&NamedAction::new("add", 2));
        assert_eq!(recorder.changes(), vec![2]);
    }

    #[test]
    fn test_panicking_hooks_are_isolated() {
        let sink = Arc::new(CollectingFaultSink::new());
        let mut engine = engine(0);
        engine.set_fault_sink(sink.clone());
        engine.reducers().add(Arc::new(pure(|s: i64, _: &TestAction| s + 1)));

        engine.listeners().add(Arc::new(watch(|_: &i64| panic!("listener bug"))));
        let recorder = Arc::new(RecordingListener::<i64>::new());
        engine.listeners().add(recorder.clone());

        let report = engine.run_cycle(&act("inc"));

        assert_eq!(*engine.state(), 1);
        assert_eq!(report.outcome, CycleOutcome::Committed { notified: 1 });
        assert_eq!(recorder.changes(), vec![1]);
        assert_eq!(
            sink.faults(),
            vec![Fault::Listener {
                action: "inc".into(),
                message: "listener bug".into(),
            }]
        );
    }

    #[test]
    fn test_has_changed_sees_new_then_old() {
        let engine = engine(5);
        engine.reducers().add(Arc::new(pure(|s: i64, _: &TestAction| s - 1)));
        let seen = Arc::new(Mutex::new(None));
        let record = seen.clone();
        engine.listeners().add(Arc::new(listener(
            move |new: &i64, old: &i64| {
                *record.lock().unwrap() = Some((*new, *old));
                false
            },
            |_: &i64| {},
        )));

        engine.run_cycle(&act("dec"));
        assert_eq!(*seen.lock().unwrap(), Some((4, 5)));
    }

    #[test]
    fn test_no_reducers_keeps_state_pointer() {
        let engine = engine(7);
        let before = engine.state();
        let report = engine.run_cycle(&act("x"));
        assert!(report.outcome.is_committed());
        assert!(Arc::ptr_eq(&before, &engine.state()));
    }

    #[test]
    fn test_profile_sink_only_when_enabled() {
        let profiles = Arc::new(CollectingProfileSink::new());
        let mut engine = engine(0);
        engine.set_profile_sink(profiles.clone());

        engine.run_cycle(&act("quiet"));
        assert!(profiles.profiles().is_empty());

        engine.set_trace_profile(true);
        let report = engine.run_cycle(&act("loud"));
        let recorded = profiles.profiles();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].action, "loud");
        assert_eq!(recorded[0], report.profile);
        assert!(report.profile.total >= report.profile.phase_sum());
    }

    #[test]
    fn test_cycle_sequence_numbers() {
        let engine = engine(0);
        assert_eq!(engine.run_cycle(&act("a")).sequence, 1);
        assert_eq!(engine.run_cycle(&act("b")).sequence, 2);
        assert_eq!(engine.cycle_count(), 2);
    }

    #[test]
    fn test_dedicated_pool_runs_hooks() {
        let config = StoreConfig::default().with_hook_threads(2);
        let engine: ReductionEngine<i64, TestAction> =
            ReductionEngine::with_config(0, &config).unwrap();

        let threads = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..4 {
            let threads = threads.clone();
            engine.listeners().add(Arc::new(listener(
                |_: &i64, _: &i64| true,
                move |_: &i64| {
                    let name = std::thread::current().name().map(str::to_string);
                    threads.lock().unwrap().push(name);
                },
            )));
        }

        let report = engine.run_cycle(&act("x"));
        assert_eq!(report.outcome, CycleOutcome::Committed { notified: 4 });

        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 4);
        assert!(threads
            .iter()
            .all(|name| name.as_deref().is_some_and(|n| n.starts_with("statelane-hook-"))));
    }

    #[test]
    fn test_default_fan_out_runs_hooks_side_by_side() {
        let engine = Arc::new(engine(0));
        let barrier = Arc::new(Barrier::new(2));
        engine.middlewares().add(Arc::new(Rendezvous(barrier.clone())));
        engine.middlewares().add(Arc::new(Rendezvous(barrier)));

        let (tx, rx) = std::sync::mpsc::channel();
        let runner = engine.clone();
        std::thread::spawn(move || {
            let _ = tx.send(runner.run_cycle(&act("meet")).outcome);
        });

        let outcome = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("before hooks never met");
        assert_eq!(outcome, CycleOutcome::Committed { notified: 0 });
    }
}
