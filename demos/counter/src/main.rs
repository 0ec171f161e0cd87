//! Counter - Minimal statelane example
//!
//! Several producers dispatch actions concurrently onto one store while a
//! ticker runs in the background:
//! - State: What the app knows
//! - Actions: What can happen
//! - Reducer: How state changes
//! - Store: Where state lives, and the lane every async action goes through
//!
//! Run with `RUST_LOG=statelane=debug` to see every action, or `--trace` to
//! time each reduction cycle. `STATELANE_LOG_INCLUDE` and
//! `STATELANE_LOG_EXCLUDE` narrow which actions get logged.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use statelane::prelude::*;
use statelane::{ActionFilter, StopPolicy};

#[derive(Parser, Debug)]
#[command(name = "counter", about = "Concurrent producers feeding one statelane store")]
struct Args {
    /// Actions dispatched by each producer
    #[arg(long, default_value_t = 100)]
    count: usize,

    /// Number of concurrent producers
    #[arg(long, default_value_t = 4)]
    producers: usize,

    /// Record a timing profile for every cycle
    #[arg(long)]
    trace: bool,

    /// Run hooks on a dedicated pool of this many threads
    #[arg(long)]
    hook_threads: Option<usize>,

    /// Drop queued actions on shutdown instead of draining them
    #[arg(long)]
    discard: bool,
}

// ============================================================================
// State - What the app knows
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
struct CounterState {
    count: i64,
    ticks: u64,
    last_producer: Option<usize>,
}

// ============================================================================
// Actions - What can happen
// ============================================================================

#[derive(Action, Clone, Debug)]
#[action(rename_all = "snake_case")]
enum CounterAction {
    Add { producer: usize, by: i64 },
    Tick,
    Reset,
}

// ============================================================================
// Reducer - How state changes
// ============================================================================

fn reducer(
    mut state: CounterState,
    action: &CounterAction,
) -> Result<CounterState, ReduceError> {
    match action {
        CounterAction::Add { producer, by } => {
            state.count = state
                .count
                .checked_add(*by)
                .ok_or_else(|| ReduceError::new("counter overflow"))?;
            state.last_producer = Some(*producer);
        }
        CounterAction::Tick => state.ticks += 1,
        CounterAction::Reset => state = CounterState::default(),
    }
    Ok(state)
}

#[derive(Serialize)]
struct Summary<'a> {
    state: &'a CounterState,
    expected: i64,
    cycles: u64,
    profiled: usize,
    slowest: Option<&'a CycleProfile>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("counter=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = StoreConfig::from_env()?;
    config.trace_profile |= args.trace;
    if let Some(threads) = args.hook_threads {
        config.hook_threads = Some(threads);
    }
    if args.discard {
        config.stop_policy = StopPolicy::Discard;
    }
    info!(?config, producers = args.producers, count = args.count, "Counter starting");

    let profiles = Arc::new(Mutex::new(Vec::new()));
    let recorded = profiles.clone();
    let store = Store::builder(CounterState::default())
        .config(config)
        .reducer(reducer)
        .middleware(LoggingMiddleware::verbose().with_filter(ActionFilter::from_env()))
        .listener(select(
            |state: &CounterState| state.count / 100,
            |hundreds: &i64| info!(hundreds, "Crossed another hundred"),
        ))
        .profile_sink(Arc::new(move |profile: &CycleProfile| {
            if let Ok(mut profiles) = recorded.lock() {
                profiles.push(profile.clone());
            }
        }))
        .build()?;

    store.dispatch_sync(CounterAction::Reset)?;
    store.start()?;

    // Keeps ticking until the store refuses new actions.
    let ticker = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(5));
            loop {
                interval.tick().await;
                if store.dispatch(CounterAction::Tick).is_err() {
                    break;
                }
            }
        })
    };

    let producers: Vec<_> = (0..args.producers)
        .map(|producer| {
            let store = store.clone();
            let count = args.count;
            tokio::spawn(async move {
                for _ in 0..count {
                    store.dispatch(CounterAction::Add { producer, by: 1 })?;
                    tokio::task::yield_now().await;
                }
                Ok::<_, DispatchError>(())
            })
        })
        .collect();
    for producer in producers {
        producer.await??;
    }

    store.idle().await;
    store.stop();
    store.join().await;
    ticker.await?;

    let state = store.state();
    let profiles = profiles.lock().map(|p| p.clone()).unwrap_or_default();
    let summary = Summary {
        state: &state,
        expected: (args.producers * args.count) as i64,
        cycles: store.engine().cycle_count(),
        profiled: profiles.len(),
        slowest: profiles.iter().max_by_key(|p| p.total),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
