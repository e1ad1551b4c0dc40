use std::collections::BTreeMap;

use crate::guard::{Entry, Guarded, Ref};
use crate::handle::WindowHandle;

/// How many times a handle has been opened and closed. Never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenClose {
    pub opens: u32,
    pub closes: u32,
}

impl OpenClose {
    /// A window should be alive exactly while this holds.
    pub fn wants_open(&self) -> bool {
        self.opens > self.closes
    }
}

/// What an `open` call must do after its increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Closes still match or outnumber opens.
    StaysClosed,
    /// The window should be running. `was_open` is true when it already
    /// should have been before this call.
    ShouldRun { was_open: bool },
}

type CounterMap = BTreeMap<WindowHandle, OpenClose>;

#[derive(Default)]
pub struct Counters {
    map: Guarded<CounterMap>,
}

impl Counters {
    fn entry(&self, handle: &WindowHandle) -> Ref<'_, CounterMap, Entry<WindowHandle>> {
        let mut map = self.map.lock();
        map.entry(handle.clone()).or_default();
        map.retarget(Entry(handle.clone()))
    }

    pub fn record_open(&self, handle: &WindowHandle) -> OpenOutcome {
        let mut counts = self.entry(handle);
        let was_open = counts.wants_open();
        counts.opens += 1;
        if counts.wants_open() {
            OpenOutcome::ShouldRun { was_open }
        } else {
            OpenOutcome::StaysClosed
        }
    }

    pub fn record_close(&self, handle: &WindowHandle) {
        self.entry(handle).closes += 1;
    }

    pub fn get(&self, handle: &WindowHandle) -> OpenClose {
        self.map.lock().get(handle).copied().unwrap_or_default()
    }

    pub fn is_open(&self, handle: &WindowHandle) -> bool {
        self.get(handle).wants_open()
    }
}
