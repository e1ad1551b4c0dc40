//! Lock-guarded values with movable, re-targetable guards.
//!
//! `Guarded<T>` pairs a mutex with the value it protects. Locking it yields a
//! [`Ref`], an exclusive handle that unlocks when dropped. A `Ref` over a
//! container can be *retargeted* onto one element of that container without
//! the lock ever being released in between, and can be *suspended* to run a
//! blocking wait or a callback with the lock released, reacquiring it before
//! the guard is touched again.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use parking_lot::{Mutex, MutexGuard};

/// Selects the part of a locked container a [`Ref`] exposes.
pub trait Projection<C> {
    type Target: ?Sized;

    /// Whether the target is present in `container`.
    fn locate(&self, container: &C) -> bool;

    fn project<'c>(&self, container: &'c C) -> &'c Self::Target;

    fn project_mut<'c>(&self, container: &'c mut C) -> &'c mut Self::Target;
}

/// The whole guarded value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Whole;

impl<C> Projection<C> for Whole {
    type Target = C;

    fn locate(&self, _container: &C) -> bool {
        true
    }

    fn project<'c>(&self, container: &'c C) -> &'c C {
        container
    }

    fn project_mut<'c>(&self, container: &'c mut C) -> &'c mut C {
        container
    }
}

/// One value of an ordered map, selected by key.
#[derive(Debug, Clone)]
pub struct Entry<K>(pub K);

impl<K: Ord, V> Projection<BTreeMap<K, V>> for Entry<K> {
    type Target = V;

    fn locate(&self, container: &BTreeMap<K, V>) -> bool {
        container.contains_key(&self.0)
    }

    fn project<'c>(&self, container: &'c BTreeMap<K, V>) -> &'c V {
        container
            .get(&self.0)
            .expect("guarded map entry removed while referenced")
    }

    fn project_mut<'c>(&self, container: &'c mut BTreeMap<K, V>) -> &'c mut V {
        container
            .get_mut(&self.0)
            .expect("guarded map entry removed while referenced")
    }
}

/// A value behind its own lock.
#[derive(Debug, Default)]
pub struct Guarded<T> {
    inner: Mutex<T>,
}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Blocks until the lock is free and returns an exclusive guard.
    pub fn lock(&self) -> Ref<'_, T> {
        Ref {
            guard: Some(self.inner.lock()),
            projection: Whole,
        }
    }

    pub fn try_lock(&self) -> OptionalRef<'_, T> {
        self.inner.try_lock().map(|guard| Ref {
            guard: Some(guard),
            projection: Whole,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

/// Exclusive access to `P::Target` inside a locked `C`.
///
/// Moving a `Ref` moves the lock with it. Once [`Ref::release`] has been
/// called the guard is spent and any further access panics.
pub struct Ref<'a, C, P: Projection<C> = Whole> {
    guard: Option<MutexGuard<'a, C>>,
    projection: P,
}

/// A lookup that may have found nothing. `None` holds no lock.
pub type OptionalRef<'a, C, P = Whole> = Option<Ref<'a, C, P>>;

impl<'a, C, P: Projection<C>> Ref<'a, C, P> {
    fn held(&self) -> &MutexGuard<'a, C> {
        self.guard.as_ref().expect("guard used after release")
    }

    fn held_mut(&mut self) -> &mut MutexGuard<'a, C> {
        self.guard.as_mut().expect("guard used after release")
    }

    /// Re-labels what the held lock protects. The lock stays held throughout.
    ///
    /// Panics if `projection` does not locate anything in the container.
    pub fn retarget<Q: Projection<C>>(mut self, projection: Q) -> Ref<'a, C, Q> {
        let guard = self.guard.take().expect("retarget of a released guard");
        assert!(
            projection.locate(&guard),
            "retarget onto an element that is not present"
        );
        Ref {
            guard: Some(guard),
            projection,
        }
    }

    /// Like [`Ref::retarget`], but unlocks and returns `None` when the element
    /// is missing.
    pub fn try_retarget<Q: Projection<C>>(mut self, projection: Q) -> OptionalRef<'a, C, Q> {
        let guard = self.guard.take().expect("retarget of a released guard");
        if projection.locate(&guard) {
            Some(Ref {
                guard: Some(guard),
                projection,
            })
        } else {
            None
        }
    }

    /// Unlocks now. The guard must not be used afterwards.
    pub fn release(&mut self) {
        let guard = self.guard.take().expect("release of a released guard");
        drop(guard);
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }

    /// Runs `f` with the lock released and reacquires it before returning,
    /// also when `f` unwinds.
    ///
    /// The target may have changed while the lock was released.
    pub fn suspend<R>(&mut self, f: impl FnOnce() -> R) -> R {
        MutexGuard::unlocked(self.held_mut(), f)
    }

    /// The whole locked container, regardless of the current projection.
    pub fn container(&self) -> &C {
        self.held()
    }
}

impl<C, P: Projection<C>> Deref for Ref<'_, C, P> {
    type Target = P::Target;

    fn deref(&self) -> &P::Target {
        self.projection.project(self.held())
    }
}

impl<C, P: Projection<C>> DerefMut for Ref<'_, C, P> {
    fn deref_mut(&mut self) -> &mut P::Target {
        let guard = self.guard.as_mut().expect("guard used after release");
        self.projection.project_mut(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lock_is_released_on_drop() {
        let g = Guarded::new(1u32);
        {
            let mut r = g.lock();
            *r += 1;
            assert!(g.is_locked());
        }
        assert!(!g.is_locked());
        assert_eq!(*g.lock(), 2);
    }

    #[test]
    fn moved_guard_keeps_lock() {
        let g = Guarded::new(String::from("a"));
        let r = g.lock();
        let mut moved = r;
        moved.push('b');
        assert!(g.is_locked());
        drop(moved);
        assert_eq!(g.lock().as_str(), "ab");
    }

    #[test]
    fn retarget_never_unlocks() {
        let g = Guarded::new(BTreeMap::from([("x", 1), ("y", 2)]));
        let map = g.lock();
        let mut y = map.retarget(Entry("y"));
        assert!(g.try_lock().is_none());
        *y = 20;
        assert_eq!(y.container().len(), 2);
        drop(y);
        assert_eq!(g.lock()[&"y"], 20);
    }

    #[test]
    fn try_retarget_missing_unlocks() {
        let g = Guarded::new(BTreeMap::from([(1, 'a')]));
        let found = g.lock().try_retarget(Entry(7));
        assert!(found.is_none());
        assert!(!g.is_locked());
    }

    #[test]
    #[should_panic(expected = "not present")]
    fn retarget_to_missing_panics() {
        let g: Guarded<BTreeMap<u8, u8>> = Guarded::default();
        let _ = g.lock().retarget(Entry(3));
    }

    #[test]
    #[should_panic(expected = "guard used after release")]
    fn use_after_release_panics() {
        let g = Guarded::new(0u8);
        let mut r = g.lock();
        r.release();
        assert!(!g.is_locked());
        assert_eq!(*r, 0);
    }

    #[test]
    fn suspend_releases_and_reacquires() {
        let g = Arc::new(Guarded::new(BTreeMap::from([(0u8, 0u32)])));
        let mut r = g.lock().retarget(Entry(0u8));
        *r = 1;
        let other = Arc::clone(&g);
        r.suspend(|| {
            // another thread can take the lock while we wait
            thread::spawn(move || {
                *other.lock().retarget(Entry(0u8)) += 10;
            })
            .join()
            .unwrap();
        });
        assert!(r.is_held());
        assert!(g.is_locked());
        assert_eq!(*r, 11);
    }

    #[test]
    fn suspend_relocks_after_unwind() {
        let g = Guarded::new(5i32);
        let mut r = g.lock();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            r.suspend(|| panic!("callback failed"))
        }));
        assert!(outcome.is_err());
        assert!(g.is_locked());
        assert_eq!(*r, 5);
    }
}
