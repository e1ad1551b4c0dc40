use std::collections::BTreeMap;
use std::sync::Arc;

use crate::guard::{Guarded, Ref};
use crate::handle::{NativeId, WindowHandle};

/// What a window thread has done so far. Written only by that thread, except
/// that the message handler running on it marks self-initiated closing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadState {
    pub has_opened: bool,
    pub is_closing: bool,
    /// The native window asked to close or was destroyed.
    pub closing_self: bool,
    /// The open/close counters said the window should no longer run.
    pub closing_externally: bool,
    pub native: Option<NativeId>,
}

/// A lifecycle entry: separately locked, shared between the map and the
/// thread it describes.
pub type ThreadEntry = Arc<Guarded<ThreadState>>;

pub type ThreadMap = BTreeMap<WindowHandle, ThreadEntry>;

/// Lock order is always map, then entry.
#[derive(Default)]
pub struct Threads {
    map: Guarded<ThreadMap>,
}

impl Threads {
    pub fn lock(&self) -> Ref<'_, ThreadMap> {
        self.map.lock()
    }

    pub fn get(&self, handle: &WindowHandle) -> Option<ThreadEntry> {
        self.map.lock().get(handle).cloned()
    }

    pub fn contains(&self, handle: &WindowHandle) -> bool {
        self.map.lock().contains_key(handle)
    }

    pub fn native(&self, handle: &WindowHandle) -> Option<NativeId> {
        let map = self.map.lock();
        let entry = map.get(handle)?;
        let native = entry.lock().native;
        native
    }

    /// Linear scan for the entry whose window is `native`. O(live windows).
    pub fn find_by_native(&self, native: NativeId) -> Option<(WindowHandle, ThreadEntry)> {
        let map = self.map.lock();
        let found = map
            .iter()
            .find(|(_, entry)| entry.lock().native == Some(native))
            .map(|(handle, entry)| (handle.clone(), Arc::clone(entry)));
        found
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregisters the entry of `handle`, then takes and drops its lock once
    /// so that a reader that found it through the map has finished with it.
    pub fn remove(&self, handle: &WindowHandle) {
        let mut map = self.map.lock();
        if let Some(entry) = map.remove(handle) {
            drop(entry.lock());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(threads: &Threads, handle: &WindowHandle, native: Option<NativeId>) -> ThreadEntry {
        let entry: ThreadEntry = Arc::new(Guarded::new(ThreadState {
            native,
            ..ThreadState::default()
        }));
        threads.lock().insert(handle.clone(), Arc::clone(&entry));
        entry
    }

    #[test]
    fn lookups_by_handle_and_native() {
        let t = Threads::default();
        let a = WindowHandle::new("a");
        let b = WindowHandle::numbered("b", 2);
        insert(&t, &a, Some(NativeId(1)));
        insert(&t, &b, Some(NativeId(2)));

        assert!(t.contains(&a));
        assert_eq!(t.native(&b), Some(NativeId(2)));
        let (handle, _) = t.find_by_native(NativeId(2)).unwrap();
        assert_eq!(handle, b);
        assert!(t.find_by_native(NativeId(9)).is_none());
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn remove_leaves_entry_unlocked() {
        let t = Threads::default();
        let h = WindowHandle::new("w");
        let entry = insert(&t, &h, None);
        t.remove(&h);
        assert!(!t.contains(&h));
        assert!(t.is_empty());
        assert!(!entry.is_locked());
        t.remove(&h);
    }
}
