//! Centralized state store with reducer pattern
//!
//! [`Store`] ties a [`ReductionEngine`] to a worker lane ([`Dispatcher`]).
//! It is a cheap handle: clones share the same state, hooks, and lane.

use std::any::TypeId;
use std::fmt;
use std::mem;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::action::Action;
use crate::config::{StopPolicy, StoreConfig};
use crate::engine::ReductionEngine;
use crate::error::{ConfigError, DispatchError, LaneError};
use crate::fault::FaultSink;
use crate::listener::StateListener;
use crate::middleware::Middleware;
use crate::profile::ProfileSink;
use crate::reducer::Reducer;
use crate::registry::{HookId, Registry};
use crate::worker::{Dispatcher, LaneHandler, LaneState};

/// Where a dispatched action is reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Queue on the worker lane and return immediately.
    #[default]
    Async,
    /// Run the whole cycle on the calling thread before returning.
    Sync,
}

/// Centralized, thread-safe state container.
///
/// # Type Parameters
/// * `S` - The application state type. Replaced, never mutated, on each cycle.
/// * `A` - The action type (must implement `Action`)
///
/// # Example
/// ```
/// use statelane_core::{pure, watch, NamedAction, Store};
///
/// let store: Store<i32, NamedAction<()>> = Store::new(0);
/// store.add_reducer(pure(|state: i32, _: &NamedAction<()>| state + 1));
/// store.add_listener(watch(|state: &i32| println!("now {state}")));
///
/// store.dispatch_sync(NamedAction::bare("inc")).unwrap();
/// assert_eq!(*store.state(), 1);
/// ```
///
/// Asynchronous dispatch needs the lane to be running inside a tokio runtime:
///
/// ```ignore
/// store.start()?;
/// store.dispatch(NamedAction::bare("inc"))?;
/// store.idle().await;
/// ```
pub struct Store<S, A> {
    engine: Arc<ReductionEngine<S, A>>,
    lane: Arc<Dispatcher<A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            lane: self.lane.clone(),
        }
    }
}

impl<S, A: Action> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("engine", &self.engine)
            .field("lane", &self.lane)
            .finish()
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    /// Create a store with default configuration
    pub fn new(state: S) -> Self {
        Self::from_engine(ReductionEngine::new(state), StopPolicy::default())
    }

    /// Create a store from a configuration
    pub fn with_config(state: S, config: StoreConfig) -> Result<Self, ConfigError> {
        Self::builder(state).config(config).build()
    }

    /// Start building a store with hooks and sinks pre-registered
    pub fn builder(state: S) -> StoreBuilder<S, A> {
        StoreBuilder::new(state)
    }

    fn from_engine(engine: ReductionEngine<S, A>, policy: StopPolicy) -> Self {
        Self {
            engine: Arc::new(engine),
            lane: Arc::new(Dispatcher::new(policy)),
        }
    }

    /// Start the worker lane on the current tokio runtime.
    ///
    /// Does nothing if already started. Fails after [`stop`](Self::stop).
    pub fn start(&self) -> Result<(), LaneError> {
        self.lane
            .start(self.lane_handler(), self.engine.fault_sink().clone())
    }

    /// Start the worker lane on a specific runtime
    pub fn start_on(&self, runtime: &Handle) -> Result<(), LaneError> {
        self.lane
            .start_on(runtime, self.lane_handler(), self.engine.fault_sink().clone())
    }

    fn lane_handler(&self) -> LaneHandler<A> {
        let engine = self.engine.clone();
        Arc::new(move |action: A| {
            engine.run_cycle(&action);
        })
    }

    /// Stop the worker lane. See [`StopPolicy`] for what happens to queued actions.
    ///
    /// Every later dispatch, in either mode, returns [`DispatchError::Stopped`].
    pub fn stop(&self) {
        self.lane.stop();
    }

    /// Queue an action on the worker lane and return immediately.
    ///
    /// Actions are accepted before [`start`](Self::start) and processed once
    /// the lane runs.
    pub fn dispatch(&self, action: A) -> Result<(), DispatchError> {
        self.lane.dispatch(action)
    }

    /// Run the reduction cycle for an action on the calling thread.
    ///
    /// Blocks for the whole cycle. Not ordered relative to actions already
    /// queued on the worker lane.
    pub fn dispatch_sync(&self, action: A) -> Result<(), DispatchError> {
        if self.lane.state() == LaneState::Stopped {
            tracing::debug!(action = %action.name(), "Dropping action dispatched after stop");
            return Err(DispatchError::Stopped);
        }
        self.engine.run_cycle(&action);
        Ok(())
    }

    /// Dispatch with an explicit [`DispatchMode`]
    pub fn dispatch_with(&self, action: A, mode: DispatchMode) -> Result<(), DispatchError> {
        match mode {
            DispatchMode::Async => self.dispatch(action),
            DispatchMode::Sync => self.dispatch_sync(action),
        }
    }

    /// Get a snapshot of the current state
    pub fn state(&self) -> Arc<S> {
        self.engine.state()
    }

    /// Register a reducer. Reducers run in registration order.
    ///
    /// Stateless reducers (fn items, closures without captures) are
    /// registered at most once: adding the same one again returns its id.
    pub fn add_reducer<R: Reducer<S, A> + 'static>(&self, reducer: R) -> HookId {
        let id = self
            .engine
            .reducers()
            .add_keyed(Arc::new(reducer), hook_key::<R>());
        tracing::debug!(%id, "Registered reducer");
        id
    }

    pub fn remove_reducer(&self, id: HookId) -> bool {
        let removed = self.engine.reducers().remove(id);
        if removed {
            tracing::debug!(%id, "Removed reducer");
        }
        removed
    }

    /// Register a middleware. Stateless middleware is registered at most once.
    pub fn add_middleware<M: Middleware<S, A> + 'static>(&self, middleware: M) -> HookId {
        let id = self
            .engine
            .middlewares()
            .add_keyed(Arc::new(middleware), hook_key::<M>());
        tracing::debug!(%id, "Registered middleware");
        id
    }

    pub fn remove_middleware(&self, id: HookId) -> bool {
        let removed = self.engine.middlewares().remove(id);
        if removed {
            tracing::debug!(%id, "Removed middleware");
        }
        removed
    }

    /// Register a state listener. Stateless listeners are registered at most once.
    pub fn add_listener<L: StateListener<S> + 'static>(&self, listener: L) -> HookId {
        let id = self
            .engine
            .listeners()
            .add_keyed(Arc::new(listener), hook_key::<L>());
        tracing::debug!(%id, "Registered listener");
        id
    }

    pub fn remove_listener(&self, id: HookId) -> bool {
        let removed = self.engine.listeners().remove(id);
        if removed {
            tracing::debug!(%id, "Removed listener");
        }
        removed
    }

    /// Reducer registry, for registering shared `Arc` hooks directly
    pub fn reducers(&self) -> &Registry<dyn Reducer<S, A>> {
        self.engine.reducers()
    }

    pub fn middlewares(&self) -> &Registry<dyn Middleware<S, A>> {
        self.engine.middlewares()
    }

    pub fn listeners(&self) -> &Registry<dyn StateListener<S>> {
        self.engine.listeners()
    }

    /// Enable or disable per-cycle profiling
    pub fn set_trace_profile(&self, enabled: bool) {
        self.engine.set_trace_profile(enabled);
    }

    /// The underlying engine
    pub fn engine(&self) -> &ReductionEngine<S, A> {
        &self.engine
    }

    /// Lifecycle state of the worker lane
    pub fn lane_state(&self) -> LaneState {
        self.lane.state()
    }

    /// Queued actions whose cycle has not finished
    pub fn pending(&self) -> usize {
        self.lane.pending()
    }

    /// Wait until every queued action has been reduced
    pub async fn idle(&self) {
        self.lane.idle().await;
    }

    /// Wait for the worker lane to exit after [`stop`](Self::stop)
    pub async fn join(&self) {
        self.lane.join().await;
    }
}

/// Identity of a hook that carries no data.
///
/// Every value of a zero-sized type is the same hook, so the type stands in for
/// the pointer identity a fresh `Arc` cannot provide.
fn hook_key<H: 'static>() -> Option<TypeId> {
    (mem::size_of::<H>() == 0).then(TypeId::of::<H>)
}

type Keyed<T> = (Arc<T>, Option<TypeId>);

/// Builder for [`Store`]
pub struct StoreBuilder<S, A> {
    state: S,
    config: StoreConfig,
    reducers: Vec<Keyed<dyn Reducer<S, A>>>,
    middlewares: Vec<Keyed<dyn Middleware<S, A>>>,
    listeners: Vec<Keyed<dyn StateListener<S>>>,
    fault_sink: Option<Arc<dyn FaultSink>>,
    profile_sink: Option<Arc<dyn ProfileSink>>,
}

impl<S, A> StoreBuilder<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    pub fn new(state: S) -> Self {
        Self {
            state,
            config: StoreConfig::default(),
            reducers: Vec::new(),
            middlewares: Vec::new(),
            listeners: Vec::new(),
            fault_sink: None,
            profile_sink: None,
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reducer<R: Reducer<S, A> + 'static>(mut self, reducer: R) -> Self {
        self.reducers.push((Arc::new(reducer), hook_key::<R>()));
        self
    }

    pub fn middleware<M: Middleware<S, A> + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push((Arc::new(middleware), hook_key::<M>()));
        self
    }

    pub fn listener<L: StateListener<S> + 'static>(mut self, listener: L) -> Self {
        self.listeners.push((Arc::new(listener), hook_key::<L>()));
        self
    }

    /// Where collaborator faults are reported. Defaults to `tracing`.
    pub fn fault_sink(mut self, sink: Arc<dyn FaultSink>) -> Self {
        self.fault_sink = Some(sink);
        self
    }

    /// Where cycle profiles go while profiling is enabled
    pub fn profile_sink(mut self, sink: Arc<dyn ProfileSink>) -> Self {
        self.profile_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Store<S, A>, ConfigError> {
        let mut engine = ReductionEngine::with_config(self.state, &self.config)?;
        if let Some(sink) = self.fault_sink {
            engine.set_fault_sink(sink);
        }
        if let Some(sink) = self.profile_sink {
            engine.set_profile_sink(sink);
        }
        for (reducer, key) in self.reducers {
            engine.reducers().add_keyed(reducer, key);
        }
        for (middleware, key) in self.middlewares {
            engine.middlewares().add_keyed(middleware, key);
        }
        for (listener, key) in self.listeners {
            engine.listeners().add_keyed(listener, key);
        }

        Ok(Store::from_engine(engine, self.config.stop_policy))
    }
}
