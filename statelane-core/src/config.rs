//! Store configuration

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::thread;

use crate::error::ConfigError;

/// Environment variable enabling cycle profiling (`1`, `true`, `yes`, `on`).
pub const ENV_TRACE_PROFILE: &str = "STATELANE_TRACE_PROFILE";
/// Environment variable selecting the [`StopPolicy`] (`drain` or `discard`).
pub const ENV_STOP_POLICY: &str = "STATELANE_STOP_POLICY";
/// Environment variable sizing a dedicated hook thread pool.
pub const ENV_HOOK_THREADS: &str = "STATELANE_HOOK_THREADS";

/// Lower bound on the shared hook pool size.
///
/// Hooks of one phase must be able to run side by side even on a single-CPU
/// host, where rayon's global pool has one thread.
pub const MIN_SHARED_HOOK_THREADS: usize = 4;

/// What happens to queued actions when the store is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Stop accepting actions, finish everything already queued, then exit.
    #[default]
    Drain,
    /// Stop accepting actions and drop queued actions that have not started.
    /// A cycle that is already running still completes.
    Discard,
}

impl StopPolicy {
    pub fn name(self) -> &'static str {
        match self {
            StopPolicy::Drain => "drain",
            StopPolicy::Discard => "discard",
        }
    }
}

impl fmt::Display for StopPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StopPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drain" => Ok(StopPolicy::Drain),
            "discard" => Ok(StopPolicy::Discard),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_STOP_POLICY,
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Emit a [`CycleProfile`](crate::CycleProfile) for every cycle.
    pub trace_profile: bool,
    /// Queue handling on `stop()`.
    pub stop_policy: StopPolicy,
    /// Size of a dedicated pool for middleware/listener fan-out.
    /// `None` uses a pool shared by every store, sized to the available
    /// parallelism but never below [`MIN_SHARED_HOOK_THREADS`].
    pub hook_threads: Option<usize>,
}

impl StoreConfig {
    /// Read configuration from `STATELANE_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_TRACE_PROFILE) {
            config.trace_profile = parse_flag(ENV_TRACE_PROFILE, &value)?;
        }
        if let Some(value) = lookup(ENV_STOP_POLICY) {
            config.stop_policy = value.parse()?;
        }
        if let Some(value) = lookup(ENV_HOOK_THREADS) {
            let threads = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: ENV_HOOK_THREADS,
                    value,
                })?;
            config.hook_threads = Some(threads);
        }

        Ok(config)
    }

    pub fn with_trace_profile(mut self, enabled: bool) -> Self {
        self.trace_profile = enabled;
        self
    }

    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    pub fn with_hook_threads(mut self, threads: usize) -> Self {
        self.hook_threads = Some(threads);
        self
    }

    /// Build the dedicated hook pool, if one was requested.
    pub(crate) fn build_hook_pool(&self) -> Result<Option<rayon::ThreadPool>, ConfigError> {
        let Some(threads) = self.hook_threads else {
            return Ok(None);
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("statelane-hook-{i}"))
            .build()?;
        Ok(Some(pool))
    }
}

/// The process-wide pool used by engines without a dedicated one.
///
/// Built on first use. `None` if the threads could not be spawned, in which
/// case fan-out falls back to rayon's global pool.
pub(crate) fn shared_hook_pool() -> Option<&'static rayon::ThreadPool> {
    static SHARED: OnceLock<Option<rayon::ThreadPool>> = OnceLock::new();

    SHARED
        .get_or_init(|| {
            let threads = thread::available_parallelism()
                .map_or(1, |n| n.get())
                .max(MIN_SHARED_HOOK_THREADS);
            let built = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("statelane-hook-shared-{i}"))
                .build();
            match built {
                Ok(pool) => {
                    tracing::debug!(threads, "Started shared hook pool");
                    Some(pool)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Falling back to the global rayon pool");
                    None
                }
            }
        })
        .as_ref()
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(!config.trace_profile);
        assert_eq!(config.stop_policy, StopPolicy::Drain);
        assert_eq!(config.hook_threads, None);
    }

    #[test]
    fn test_from_vars() {
        let config = StoreConfig::from_lookup(lookup(&[
            (ENV_TRACE_PROFILE, "yes"),
            (ENV_STOP_POLICY, " Discard "),
            (ENV_HOOK_THREADS, "4"),
        ]))
        .unwrap();

        assert!(config.trace_profile);
        assert_eq!(config.stop_policy, StopPolicy::Discard);
        assert_eq!(config.hook_threads, Some(4));
    }

    #[test]
    fn test_invalid_values() {
        let err = StoreConfig::from_lookup(lookup(&[(ENV_STOP_POLICY, "later")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_STOP_POLICY, .. }));

        let err = StoreConfig::from_lookup(lookup(&[(ENV_HOOK_THREADS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_HOOK_THREADS, .. }));

        let err = StoreConfig::from_lookup(lookup(&[(ENV_TRACE_PROFILE, "maybe")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value \"maybe\" for STATELANE_TRACE_PROFILE"
        );
    }

    #[test]
    fn test_builder_methods() {
        let config = StoreConfig::default()
            .with_trace_profile(true)
            .with_stop_policy(StopPolicy::Discard)
            .with_hook_threads(2);

        assert!(config.trace_profile);
        assert_eq!(config.stop_policy.to_string(), "discard");
        assert!(config.build_hook_pool().unwrap().is_some());
        assert!(StoreConfig::default().build_hook_pool().unwrap().is_none());
    }

    #[test]
    fn test_shared_pool_is_never_single_threaded() {
        let pool = shared_hook_pool().unwrap();
        assert!(pool.current_num_threads() >= MIN_SHARED_HOOK_THREADS);
        assert!(std::ptr::eq(pool, shared_hook_pool().unwrap()));
    }
}
