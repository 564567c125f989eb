//! Single-construction guard.
//!
//! A guarded [`Core`](crate::Core) takes the guard once at construction and
//! never gives it back. A second guarded construction in the same process
//! fails with [`CoreError::MultipleInstances`](crate::CoreError).

use std::sync::atomic::{AtomicBool, Ordering};

/// Guard used by [`CoreBuilder`](crate::CoreBuilder) unless told otherwise.
pub static PROCESS_GUARD: SingletonGuard = SingletonGuard::new();

/// Non-blocking, acquire-once flag.
#[derive(Debug, Default)]
pub struct SingletonGuard {
    held: AtomicBool,
}

impl SingletonGuard {
    /// A released guard.
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Take the guard. Returns `false` if it is already held.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the guard is held.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Release the guard so another core can be constructed.
    ///
    /// This breaks the one-core-per-process contract. Meant for tests and
    /// controlled reconfiguration only.
    pub fn reset(&self) {
        self.held.store(false, Ordering::Release);
    }
}
