//! Thread-scoped "current operation".
//!
//! Each thread holds at most one current meter identity: the most recently
//! started meter that has not terminated yet. Other threads never see it.
//! [`CurrentScope`] installs an identity for a lexical scope and restores the
//! previous one when dropped, on every exit path.

use std::cell::RefCell;
use std::sync::Arc;

use crate::factory::MeterEnv;
use crate::meter::{Meter, MeterIdentity};

/// Category used when no meter is active on the calling thread.
pub const FALLBACK_CATEGORY: &str = "???";

thread_local! {
    static CURRENT: RefCell<Option<Arc<MeterIdentity>>> = const { RefCell::new(None) };
}

/// Installs `identity` as current and returns what was current before.
pub(crate) fn set_current(identity: Arc<MeterIdentity>) -> Option<Arc<MeterIdentity>> {
    CURRENT
        .try_with(|slot| slot.borrow_mut().replace(identity))
        .ok()
        .flatten()
}

/// Puts `previous` back as the current identity, or its nearest ancestor
/// that has not terminated yet.
pub(crate) fn restore(previous: Option<Arc<MeterIdentity>>) {
    let live = live_ancestor(previous);
    // Fails only during thread teardown, when nobody can observe the slot.
    let _ = CURRENT.try_with(|slot| *slot.borrow_mut() = live);
}

/// Follows the chain of identities that were current when each one started,
/// stopping at the first one still running.
fn live_ancestor(mut candidate: Option<Arc<MeterIdentity>>) -> Option<Arc<MeterIdentity>> {
    while let Some(identity) = candidate {
        if !identity.is_terminated() {
            return Some(identity);
        }
        candidate = identity.previous();
    }
    None
}

pub(crate) fn current() -> Option<Arc<MeterIdentity>> {
    CURRENT.try_with(|slot| slot.borrow().clone()).ok().flatten()
}

pub(crate) fn is_current(identity: &Arc<MeterIdentity>) -> bool {
    CURRENT
        .try_with(|slot| {
            slot.borrow()
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, identity))
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// CurrentScope
// ---------------------------------------------------------------------------

/// RAII guard that keeps an identity current until dropped.
///
/// Restores the given previous identity on drop, including during unwinding.
#[must_use]
pub(crate) struct CurrentScope {
    previous: Option<Arc<MeterIdentity>>,
}

impl CurrentScope {
    pub(crate) fn install(
        identity: Arc<MeterIdentity>,
        previous: Option<Arc<MeterIdentity>>,
    ) -> Self {
        set_current(identity);
        Self { previous }
    }
}

impl Drop for CurrentScope {
    fn drop(&mut self) {
        restore(self.previous.take());
    }
}

// ---------------------------------------------------------------------------
// CurrentMeter
// ---------------------------------------------------------------------------

/// Read-only handle on the operation currently running on this thread.
///
/// Obtained from [`MeterFactory::current_meter`](crate::MeterFactory::current_meter).
/// When nothing is running the handle is a placeholder with category `"???"`.
#[derive(Clone)]
pub struct CurrentMeter {
    identity: Arc<MeterIdentity>,
}

impl CurrentMeter {
    pub(crate) fn active() -> Option<Self> {
        current().map(|identity| Self { identity })
    }

    pub(crate) fn fallback(env: Arc<MeterEnv>) -> Self {
        Self {
            identity: Arc::new(MeterIdentity::fallback(env)),
        }
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.identity.category
    }

    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.identity.operation.as_deref()
    }

    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.identity.parent.as_deref()
    }

    /// Zero for the placeholder.
    #[must_use]
    pub fn position(&self) -> i64 {
        self.identity.position
    }

    #[must_use]
    pub fn full_id(&self) -> String {
        self.identity.full_id()
    }

    /// True when no meter was running on this thread.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.identity.position == 0
    }

    /// Derives a sub-operation meter, see [`Meter::sub`].
    ///
    /// From the placeholder the child keeps category `"???"`, takes `name`
    /// as its operation and has no parent.
    #[must_use]
    pub fn sub(&self, name: &str) -> Meter {
        Meter::derive(&self.identity, name)
    }
}

impl std::fmt::Debug for CurrentMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentMeter")
            .field("category", &self.identity.category)
            .field("operation", &self.identity.operation)
            .field("position", &self.identity.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture;

    #[test]
    fn nothing_is_current_on_a_fresh_thread() {
        assert!(current().is_none());
        assert!(CurrentMeter::active().is_none());
    }

    #[test]
    fn scope_restores_previous_on_drop() {
        let (factory, _sink, _clock) = fixture();
        let outer = factory.meter("outer");
        let inner = factory.meter("inner");
        set_current(Arc::clone(outer.identity()));
        {
            let _scope = CurrentScope::install(Arc::clone(inner.identity()), current());
            assert!(is_current(inner.identity()));
        }
        assert!(is_current(outer.identity()));
        restore(None);
        assert!(current().is_none());
    }

    #[test]
    fn scope_restores_during_unwind() {
        let (factory, _sink, _clock) = fixture();
        let meter = factory.meter("panicky");
        let identity = Arc::clone(meter.identity());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _scope = CurrentScope::install(identity, None);
            panic!("inside scope");
        }));
        assert!(result.is_err());
        assert!(current().is_none());
    }

    #[test]
    fn restore_skips_terminated_identities() {
        let (factory, _sink, _clock) = fixture();
        let mut outer = factory.meter("outer");
        let mut middle = factory.meter("middle");
        let mut inner = factory.meter("inner");
        outer.start();
        middle.start();
        inner.start();
        middle.ok();
        assert!(is_current(inner.identity()));
        inner.ok();
        assert!(is_current(outer.identity()));
        outer.ok();
        assert!(current().is_none());
    }

    #[test]
    fn restore_of_terminated_root_leaves_slot_empty() {
        let (factory, _sink, _clock) = fixture();
        let mut meter = factory.meter("done");
        meter.start().ok();
        restore(Some(Arc::clone(meter.identity())));
        assert!(current().is_none());
    }

    #[test]
    fn current_is_thread_local() {
        let (factory, _sink, _clock) = fixture();
        let mut meter = factory.meter("main-thread");
        meter.start();
        assert!(is_current(meter.identity()));
        let seen_elsewhere = std::thread::spawn(|| current().is_some())
            .join()
            .unwrap();
        assert!(!seen_elsewhere);
        meter.ok();
    }

    #[test]
    fn fallback_handle_is_placeholder() {
        let (factory, _sink, _clock) = fixture();
        let handle = factory.current_meter();
        assert!(handle.is_fallback());
        assert_eq!(handle.category(), FALLBACK_CATEGORY);
        assert_eq!(handle.operation(), None);
    }
}
