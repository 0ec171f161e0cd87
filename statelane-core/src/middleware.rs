//! Middleware hooks around the reduce phase
//!
//! Every registered middleware sees each action twice: once before the reducer
//! fold with the pre-cycle state, and once after listeners were notified with
//! the post-cycle state. Hooks of the same phase run concurrently, so a
//! middleware must not assume anything about its siblings. When several hooks
//! do need a relative order, put them inside one [`ComposedMiddleware`].

use std::fmt;

use crate::action::Action;

/// Side-effect hooks invoked around the reduce phase.
///
/// Middleware cannot influence the reduction result. Panics are caught and
/// reported as [`Fault::Middleware`](crate::Fault::Middleware) without
/// affecting sibling hooks.
pub trait Middleware<S, A>: Send + Sync {
    /// Called before the reducers run, with the pre-cycle state
    fn before(&self, state: &S, action: &A);

    /// Called after listeners were notified, with the post-cycle state
    fn after(&self, state: &S, action: &A);
}

/// A no-op middleware that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl<S, A> Middleware<S, A> for NoopMiddleware {
    fn before(&self, _state: &S, _action: &A) {}
    fn after(&self, _state: &S, _action: &A) {}
}

/// Environment variable with comma-separated action patterns to log.
pub const ENV_LOG_INCLUDE: &str = "STATELANE_LOG_INCLUDE";
/// Environment variable with comma-separated action patterns never to log.
pub const ENV_LOG_EXCLUDE: &str = "STATELANE_LOG_EXCLUDE";

/// Selects which actions [`LoggingMiddleware`] logs, by action name.
///
/// Names are matched case-insensitively. In a pattern `*` matches any run of
/// characters and `?` exactly one. A pattern ending in `/` covers a whole
/// namespace, so `todo/` behaves like `todo/*`.
///
/// An empty include list admits every name. Excludes win over includes.
///
/// ```
/// use statelane_core::ActionFilter;
///
/// let filter = ActionFilter::parse("todo/, Reset", "todo/tick*");
/// assert!(filter.allows("todo/add"));
/// assert!(filter.allows("reset"));
/// assert!(!filter.allows("todo/ticked"));
/// assert!(!filter.allows("user/login"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFilter {
    include: Vec<NamePattern>,
    exclude: Vec<NamePattern>,
}

impl Default for ActionFilter {
    /// Everything except `tick`, which fires too often to be worth logging.
    fn default() -> Self {
        Self::all().exclude("tick")
    }
}

impl ActionFilter {
    /// A filter that admits every action
    pub fn all() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Build a filter from comma-separated include and exclude lists
    pub fn parse(include: &str, exclude: &str) -> Self {
        Self {
            include: NamePattern::list(include),
            exclude: NamePattern::list(exclude),
        }
    }

    /// Read `STATELANE_LOG_INCLUDE` / `STATELANE_LOG_EXCLUDE`.
    ///
    /// Without an exclude variable the default `tick` exclusion stays.
    pub fn from_env() -> Self {
        let mut filter = Self::default();
        if let Ok(include) = std::env::var(ENV_LOG_INCLUDE) {
            filter.include = NamePattern::list(&include);
        }
        if let Ok(exclude) = std::env::var(ENV_LOG_EXCLUDE) {
            filter.exclude = NamePattern::list(&exclude);
        }
        filter
    }

    pub fn include(mut self, pattern: &str) -> Self {
        self.include.push(NamePattern::new(pattern));
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.exclude.push(NamePattern::new(pattern));
        self
    }

    /// Whether an action with this name should be logged
    pub fn allows(&self, name: &str) -> bool {
        let name: Vec<char> = name.chars().flat_map(char::to_lowercase).collect();
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(&name));
        included && !self.exclude.iter().any(|p| p.matches(&name))
    }
}

/// A lowercased action-name pattern
#[derive(Debug, Clone, PartialEq, Eq)]
struct NamePattern(Vec<char>);

impl NamePattern {
    fn new(pattern: &str) -> Self {
        let mut chars: Vec<char> = pattern.trim().chars().flat_map(char::to_lowercase).collect();
        if chars.last() == Some(&'/') {
            chars.push('*');
        }
        chars.dedup_by(|a, b| *a == '*' && *b == '*');
        Self(chars)
    }

    fn list(patterns: &str) -> Vec<Self> {
        patterns
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(Self::new)
            .collect()
    }

    fn matches(&self, name: &[char]) -> bool {
        wildcard(&self.0, name)
    }
}

fn wildcard(pattern: &[char], name: &[char]) -> bool {
    match (pattern.split_first(), name.split_first()) {
        (None, _) => name.is_empty(),
        (Some(('*', rest)), _) => {
            wildcard(rest, name)
                || name
                    .split_first()
                    .is_some_and(|(_, tail)| wildcard(pattern, tail))
        }
        (Some(_), None) => false,
        (Some(('?', rest)), Some((_, tail))) => wildcard(rest, tail),
        (Some((p, rest)), Some((c, tail))) => p == c && wildcard(rest, tail),
    }
}

/// Middleware that logs actions through `tracing` (for debugging)
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    /// Whether to log before the fold
    pub log_before: bool,
    /// Whether to log after the cycle
    pub log_after: bool,
    /// Which action names to log
    pub filter: ActionFilter,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
            filter: ActionFilter::default(),
        }
    }

    /// Create a logging middleware that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            ..Self::new()
        }
    }

    /// Replace the action name filter
    pub fn with_filter(mut self, filter: ActionFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl<S: fmt::Debug, A: Action> Middleware<S, A> for LoggingMiddleware {
    fn before(&self, state: &S, action: &A) {
        if self.log_before && self.filter.allows(action.name()) {
            tracing::debug!(action = %action.name(), state = ?state, "Dispatching action");
        }
    }

    fn after(&self, state: &S, action: &A) {
        if self.log_after && self.filter.allows(action.name()) {
            tracing::debug!(action = %action.name(), state = ?state, "Action processed");
        }
    }
}

/// Compose multiple middleware into a single middleware
///
/// Children run one after another on the same thread: `before` in insertion
/// order, `after` in reverse order so the hooks nest.
pub struct ComposedMiddleware<S, A> {
    middlewares: Vec<Box<dyn Middleware<S, A>>>,
}

impl<S, A> fmt::Debug for ComposedMiddleware<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedMiddleware")
            .field("middlewares_count", &self.middlewares.len())
            .finish()
    }
}

impl<S, A> Default for ComposedMiddleware<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A> ComposedMiddleware<S, A> {
    /// Create a new composed middleware
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Add a middleware to the composition
    pub fn add<M: Middleware<S, A> + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Box::new(middleware));
    }

    /// Builder-style [`add`](Self::add)
    pub fn with<M: Middleware<S, A> + 'static>(mut self, middleware: M) -> Self {
        self.add(middleware);
        self
    }

    /// Number of composed middleware
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether nothing was composed
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl<S, A> Middleware<S, A> for ComposedMiddleware<S, A> {
    fn before(&self, state: &S, action: &A) {
        for middleware in &self.middlewares {
            middleware.before(state, action);
        }
    }

    fn after(&self, state: &S, action: &A) {
        for middleware in self.middlewares.iter().rev() {
            middleware.after(state, action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::NamedAction;
    use std::sync::{Arc, Mutex};

    type TestAction = NamedAction<()>;

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware<i32, TestAction> for Tagged {
        fn before(&self, state: &i32, _action: &TestAction) {
            self.log.lock().unwrap().push(format!("{}:before:{}", self.tag, state));
        }

        fn after(&self, state: &i32, _action: &TestAction) {
            self.log.lock().unwrap().push(format!("{}:after:{}", self.tag, state));
        }
    }

    #[test]
    fn test_composed_nesting_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let composed = ComposedMiddleware::new()
            .with(Tagged { tag: "a", log: log.clone() })
            .with(Tagged { tag: "b", log: log.clone() });
        assert_eq!(composed.len(), 2);

        let action = NamedAction::bare("x");
        composed.before(&1, &action);
        composed.after(&2, &action);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:before:1", "b:before:1", "b:after:2", "a:after:2"]
        );
    }

    #[test]
    fn test_filter_defaults() {
        let filter = ActionFilter::default();
        assert!(filter.allows("inc"));
        assert!(!filter.allows("tick"));
        assert!(!filter.allows("Tick"));
        assert!(ActionFilter::all().allows("tick"));
    }

    #[test]
    fn test_filter_namespaces() {
        let filter = ActionFilter::parse(" todo/ , user/login ", "");
        assert!(filter.allows("todo/add"));
        assert!(filter.allows("TODO/Remove"));
        assert!(filter.allows("user/login"));
        assert!(!filter.allows("user/logout"));
        assert!(!filter.allows("todos/add"));
    }

    #[test]
    fn test_exclude_wins() {
        let filter = ActionFilter::all().include("todo/").exclude("*remove");
        assert!(filter.allows("todo/add"));
        assert!(!filter.allows("todo/remove"));
    }

    #[test]
    fn test_wildcards() {
        let matches = |pattern: &str, name: &str| ActionFilter::parse(pattern, "").allows(name);
        assert!(matches("tick", "tick"));
        assert!(!matches("tick", "ticktock"));
        assert!(matches("*error*", "DidError"));
        assert!(matches("in?", "inc"));
        assert!(!matches("in?", "in"));
        assert!(matches("a**b", "ab"));
        assert!(matches("*", ""));
    }

    #[test]
    fn test_logging_middleware_runs() {
        let middleware = LoggingMiddleware::verbose();
        let action = NamedAction::bare("inc");
        Middleware::<i32, TestAction>::before(&middleware, &0, &action);
        Middleware::<i32, TestAction>::after(&middleware, &1, &action);
    }
}
