use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::guard::{Entry, Guarded, OptionalRef, Ref};
use crate::handle::{NativeId, WindowHandle};
use crate::platform::NativeMessage;

/// Callback for a lifecycle event of one window.
pub type LifecycleDelegate = Arc<dyn Fn(&WindowHandle, NativeId) + Send + Sync>;

/// Callback seeing every native message. A non-zero result suppresses the
/// paint, move and resize delegates for that message.
pub type MessageDelegate = Arc<dyn Fn(&WindowHandle, NativeId, &NativeMessage) -> i64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started,
    Stopping,
    Paint,
    Move,
    Resize,
}

/// At most one callback per event for one handle, plus the native window
/// currently backing it.
#[derive(Clone)]
pub struct DelegateSet {
    pub handle: WindowHandle,
    pub native: Option<NativeId>,
    started: Option<LifecycleDelegate>,
    stopping: Option<LifecycleDelegate>,
    paint: Option<LifecycleDelegate>,
    moved: Option<LifecycleDelegate>,
    resize: Option<LifecycleDelegate>,
    message: Option<MessageDelegate>,
}

impl DelegateSet {
    fn new(handle: WindowHandle) -> Self {
        Self {
            handle,
            native: None,
            started: None,
            stopping: None,
            paint: None,
            moved: None,
            resize: None,
            message: None,
        }
    }

    fn slot_mut(&mut self, event: LifecycleEvent) -> &mut Option<LifecycleDelegate> {
        match event {
            LifecycleEvent::Started => &mut self.started,
            LifecycleEvent::Stopping => &mut self.stopping,
            LifecycleEvent::Paint => &mut self.paint,
            LifecycleEvent::Move => &mut self.moved,
            LifecycleEvent::Resize => &mut self.resize,
        }
    }

    pub fn get(&self, event: LifecycleEvent) -> Option<LifecycleDelegate> {
        match event {
            LifecycleEvent::Started => self.started.clone(),
            LifecycleEvent::Stopping => self.stopping.clone(),
            LifecycleEvent::Paint => self.paint.clone(),
            LifecycleEvent::Move => self.moved.clone(),
            LifecycleEvent::Resize => self.resize.clone(),
        }
    }

    pub fn message(&self) -> Option<MessageDelegate> {
        self.message.clone()
    }
}

impl fmt::Debug for DelegateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateSet")
            .field("handle", &self.handle)
            .field("native", &self.native)
            .field("started", &self.started.is_some())
            .field("stopping", &self.stopping.is_some())
            .field("paint", &self.paint.is_some())
            .field("moved", &self.moved.is_some())
            .field("resize", &self.resize.is_some())
            .field("message", &self.message.is_some())
            .finish()
    }
}

pub type DelegateMap = BTreeMap<WindowHandle, DelegateSet>;

/// Locked access to one handle's delegates.
pub type DelegateRef<'a> = Ref<'a, DelegateMap, Entry<WindowHandle>>;

#[derive(Default)]
pub struct Delegates {
    map: Guarded<DelegateMap>,
}

impl Delegates {
    /// The delegates of `handle`, created empty on first use.
    pub fn entry(&self, handle: &WindowHandle) -> DelegateRef<'_> {
        let mut map = self.map.lock();
        map.entry(handle.clone())
            .or_insert_with(|| DelegateSet::new(handle.clone()));
        map.retarget(Entry(handle.clone()))
    }

    /// Linear scan for the handle whose window is `native`. O(live windows).
    pub fn find_by_native(&self, native: NativeId) -> OptionalRef<'_, DelegateMap, Entry<WindowHandle>> {
        let map = self.map.lock();
        let handle = map
            .iter()
            .find(|(_, set)| set.native == Some(native))
            .map(|(handle, _)| handle.clone())?;
        map.try_retarget(Entry(handle))
    }

    /// Installs or replaces the callback for `event`; `None` removes it.
    pub fn set(&self, handle: &WindowHandle, event: LifecycleEvent, delegate: Option<LifecycleDelegate>) {
        *self.entry(handle).slot_mut(event) = delegate;
    }

    pub fn set_message(&self, handle: &WindowHandle, delegate: Option<MessageDelegate>) {
        self.entry(handle).message = delegate;
    }

    /// Drops every callback of `handle`, keeping its native identity.
    pub fn clear(&self, handle: &WindowHandle) {
        let mut set = self.entry(handle);
        let native = set.native;
        *set = DelegateSet::new(handle.clone());
        set.native = native;
    }
}
