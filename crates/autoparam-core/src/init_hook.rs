//! Deferred "after host initialization" hooks.
//!
//! Drivers are usually built while the host is still loading its records,
//! so anything that needs the final set of subscribed channels (starting
//! acquisition, priming caches) has to wait. The host's startup code owns an
//! [`InitHooks`] list, drivers register themselves by reference, and the
//! host calls [`InitHooks::run`] once initialization is complete.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

/// Something to run once the host has finished initializing.
pub trait AfterInit: Send + Sync {
    /// Called once, after the host has finished initializing.
    fn after_init(&self);
}

#[derive(Default)]
struct HookState {
    ran: bool,
    pending: Vec<Arc<dyn AfterInit>>,
}

/// Ordered list of [`AfterInit`] hooks.
///
/// Hooks run in registration order, each exactly once. A hook registered
/// after [`InitHooks::run`] runs immediately.
#[derive(Default)]
pub struct InitHooks {
    state: Mutex<HookState>,
}

impl InitHooks {
    /// Empty list that has not run yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `hook`, or run it now if the list already ran.
    pub fn register(&self, hook: Arc<dyn AfterInit>) {
        let mut state = self.state.lock();
        if state.ran {
            drop(state);
            debug!("Initialization already complete, running hook now");
            hook.after_init();
        } else {
            state.pending.push(hook);
        }
    }

    /// Run every pending hook. Later calls are no-ops.
    pub fn run(&self) {
        let pending = {
            let mut state = self.state.lock();
            if state.ran {
                return;
            }
            state.ran = true;
            std::mem::take(&mut state.pending)
        };
        info!(hooks = pending.len(), "Running after-init hooks");
        for hook in pending {
            hook.after_init();
        }
    }

    /// True once [`InitHooks::run`] has been called.
    pub fn has_run(&self) -> bool {
        self.state.lock().ran
    }
}

impl fmt::Debug for InitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InitHooks")
            .field("ran", &state.ran)
            .field("pending", &state.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl AfterInit for Counter {
        fn after_init(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_hooks_run_once() {
        let hooks = InitHooks::new();
        let counter = Arc::new(Counter::default());
        hooks.register(counter.clone());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        hooks.run();
        hooks.run();
        assert!(hooks.has_run());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_registration_runs_immediately() {
        let hooks = InitHooks::new();
        hooks.run();
        let counter = Arc::new(Counter::default());
        hooks.register(counter.clone());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
