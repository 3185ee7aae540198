//! At-most-once completion guard.
//!
//! Wraps the initialization completion callback so it can fire exactly
//! once. The driver's connect future resolves once by construction, but the
//! callback boundary is where a misbehaving event substrate would surface a
//! second terminal event; that case is not recoverable, because the
//! downstream pipeline may already have run against inconsistent state.

use std::mem;
use std::sync::Mutex;

use tracing::{error, warn};

use crate::error::BootstrapError;

/// Completion outcome: the successful payload, or the initialization error.
pub type Outcome<T> = std::result::Result<T, BootstrapError>;

type CompletionFn<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

enum GuardState<T> {
    Pending(CompletionFn<T>),
    Fired,
}

/// Guards a completion callback so it runs at most once.
///
/// The state is mutex-synchronized: terminal events may arrive from
/// whatever worker thread the async substrate runs the connect task on.
///
/// Second-completion rules:
/// - with an error: panics. A second erroring terminal event means the
///   connection substrate broke its single-terminal-event contract, and
///   internal state can no longer be trusted; under the release profile
///   (`panic = "abort"`) this terminates the process.
/// - without an error: logged and dropped.
pub struct CompletionGuard<T> {
    state: Mutex<GuardState<T>>,
}

impl<T> CompletionGuard<T> {
    pub fn new(on_complete: impl FnOnce(Outcome<T>) + Send + 'static) -> Self {
        Self {
            state: Mutex::new(GuardState::Pending(Box::new(on_complete))),
        }
    }

    /// Whether the wrapped callback has already run.
    pub fn fired(&self) -> bool {
        matches!(
            *self.state.lock().expect("completion guard poisoned"),
            GuardState::Fired
        )
    }

    /// Deliver a completion outcome through the guard.
    pub fn complete(&self, outcome: Outcome<T>) {
        let mut state = self.state.lock().expect("completion guard poisoned");
        match mem::replace(&mut *state, GuardState::Fired) {
            GuardState::Pending(callback) => {
                // Run the callback outside the lock; it may be arbitrarily
                // slow or re-enter guard accessors.
                drop(state);
                callback(outcome);
            }
            GuardState::Fired => {
                drop(state);
                match outcome {
                    Err(err) => {
                        error!(
                            error = %err,
                            "initialization completion fired twice with an error; \
                             the connection substrate violated its single-terminal-event contract"
                        );
                        panic!(
                            "fatal: initialization completed twice (second completion: {err})"
                        );
                    }
                    Ok(_) => {
                        warn!("initialization completion fired again after it already completed, ignoring");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_guard() -> (CompletionGuard<u32>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let guard = CompletionGuard::new(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        (guard, calls)
    }

    #[test]
    fn first_completion_passes_through() {
        let (guard, calls) = counting_guard();
        assert!(!guard.fired());
        guard.complete(Ok(7));
        assert!(guard.fired());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_clean_completion_is_dropped() {
        let (guard, calls) = counting_guard();
        guard.complete(Ok(1));
        guard.complete(Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_erroring_completion_escalates() {
        let (guard, calls) = counting_guard();
        guard.complete(Ok(1));

        let result = catch_unwind(AssertUnwindSafe(|| {
            guard.complete(Err(BootstrapError::UnrecognizedConnection));
        }));
        assert!(result.is_err(), "second erroring completion must panic");
        // the wrapped callback never ran a second time
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_is_send_and_sync() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<CompletionGuard<u32>>();
    }
}
