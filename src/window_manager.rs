// Window lifecycle: open/close counting, one dedicated thread per live window,
// message pumping and delegate dispatch.
//
// `open` and `close` only move counters; the window thread compares them on
// every pump cycle and shuts itself down. Each handle has at most one live
// thread, and a new one is only spawned after the previous one has removed its
// lifecycle entry.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Sender};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::guard::Guarded;
use crate::handle::{NativeId, WindowHandle};
use crate::platform::{codes, NativeMessage, Platform, PlatformError};
use crate::registry::{
    Counters, Delegates, LifecycleEvent, OpenClose, OpenOutcome, ThreadEntry, Threads,
};

struct Shared {
    platform: Arc<dyn Platform>,
    config: Config,
    counters: Counters,
    delegates: Delegates,
    threads: Threads,
}

/// Opens, closes and tracks windows on one platform.
///
/// Cloning is cheap; clones share the same registries, so a delegate can hold
/// one and call back into the manager.
#[derive(Clone)]
pub struct WindowManager {
    shared: Arc<Shared>,
}

impl WindowManager {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self::with_config(platform, Config::default())
    }

    pub fn with_config(platform: Arc<dyn Platform>, config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                platform,
                config,
                counters: Counters::default(),
                delegates: Delegates::default(),
                threads: Threads::default(),
            }),
        }
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.shared.platform
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Counts one open of `handle` and makes sure a window thread runs if the
    /// counters now call for one.
    ///
    /// Returns once the window is running and its started delegate has
    /// returned, or immediately if it should stay closed. Blocks while a
    /// previous instance of the handle is still tearing down; there is no
    /// timeout.
    ///
    /// A failed open is taken back: its open is matched by a close, so
    /// `is_open` reads as it did before the call.
    pub fn open(&self, handle: &WindowHandle) -> Result<()> {
        let shared = &self.shared;
        let was_open = match shared.counters.record_open(handle) {
            OpenOutcome::StaysClosed => {
                debug!("{handle}: open absorbed by earlier close");
                return Ok(());
            }
            OpenOutcome::ShouldRun { was_open } => was_open,
        };

        let mut threads = shared.threads.lock();
        let step = shared.config.open_backoff_step;
        let mut delay = step;
        while let Some(entry) = threads.get(handle).cloned() {
            if !entry.lock().is_closing {
                if !was_open {
                    // its thread has not polled the counters since the last
                    // close and will now keep running
                    debug!("{handle}: keeping instance that has not seen its close");
                }
                return Ok(());
            }
            debug!("{handle}: waiting {delay:?} for previous instance to stop");
            let pause = delay;
            threads.suspend(|| thread::sleep(pause));
            delay += step;
        }

        let entry: ThreadEntry = Arc::new(Guarded::default());
        threads.insert(handle.clone(), Arc::clone(&entry));

        let (ready_tx, ready_rx) = bounded(1);
        let worker = Arc::clone(shared);
        let thread_handle = handle.clone();
        let spawned = thread::Builder::new()
            .name(format!("window {handle}"))
            .spawn(move || worker.run_window(thread_handle, entry, ready_tx));
        if let Err(source) = spawned {
            threads.remove(handle);
            drop(threads);
            shared.counters.record_close(handle);
            return Err(Error::ThreadSpawn {
                handle: handle.clone(),
                source,
            });
        }
        // the new thread needs the map to record its window
        drop(threads);

        let failure = match ready_rx.recv() {
            Ok(Ok(native)) => {
                debug!("{handle}: opened as {native}");
                return Ok(());
            }
            Ok(Err(source)) => Error::WindowCreation {
                handle: handle.clone(),
                source,
            },
            Err(_) => Error::ThreadLost(handle.clone()),
        };
        shared.counters.record_close(handle);
        Err(failure)
    }

    /// Counts one close. The window thread notices on its next pump cycle.
    pub fn close(&self, handle: &WindowHandle) {
        self.shared.counters.record_close(handle);
    }

    /// Whether opens outnumber closes. Says nothing about the window thread.
    pub fn is_open(&self, handle: &WindowHandle) -> bool {
        self.shared.counters.is_open(handle)
    }

    /// Whether a window thread for `handle` has been spawned and not yet
    /// finished tearing down.
    pub fn exists(&self, handle: &WindowHandle) -> bool {
        self.shared.threads.contains(handle)
    }

    pub fn counts(&self, handle: &WindowHandle) -> OpenClose {
        self.shared.counters.get(handle)
    }

    /// The native window currently backing `handle`.
    pub fn native(&self, handle: &WindowHandle) -> Option<NativeId> {
        self.shared.threads.native(handle)
    }

    /// The handle backed by `native`. Linear in the number of live windows.
    pub fn handle_of(&self, native: NativeId) -> Option<WindowHandle> {
        self.shared
            .threads
            .find_by_native(native)
            .map(|(handle, _)| handle)
    }

    /// Asks the platform to repaint the window of `handle`. Returns false if
    /// no native window is live.
    pub fn repaint(&self, handle: &WindowHandle) -> bool {
        match self.native(handle) {
            Some(native) => {
                self.shared.platform.request_redraw(native);
                true
            }
            None => false,
        }
    }

    /// Installs or replaces the callback for `event` on `handle`.
    pub fn register<F>(&self, handle: &WindowHandle, event: LifecycleEvent, delegate: F)
    where
        F: Fn(&WindowHandle, NativeId) + Send + Sync + 'static,
    {
        self.shared
            .delegates
            .set(handle, event, Some(Arc::new(delegate)));
    }

    pub fn register_started<F>(&self, handle: &WindowHandle, delegate: F)
    where
        F: Fn(&WindowHandle, NativeId) + Send + Sync + 'static,
    {
        self.register(handle, LifecycleEvent::Started, delegate);
    }

    pub fn register_stopping<F>(&self, handle: &WindowHandle, delegate: F)
    where
        F: Fn(&WindowHandle, NativeId) + Send + Sync + 'static,
    {
        self.register(handle, LifecycleEvent::Stopping, delegate);
    }

    pub fn register_paint<F>(&self, handle: &WindowHandle, delegate: F)
    where
        F: Fn(&WindowHandle, NativeId) + Send + Sync + 'static,
    {
        self.register(handle, LifecycleEvent::Paint, delegate);
    }

    pub fn register_move<F>(&self, handle: &WindowHandle, delegate: F)
    where
        F: Fn(&WindowHandle, NativeId) + Send + Sync + 'static,
    {
        self.register(handle, LifecycleEvent::Move, delegate);
    }

    pub fn register_resize<F>(&self, handle: &WindowHandle, delegate: F)
    where
        F: Fn(&WindowHandle, NativeId) + Send + Sync + 'static,
    {
        self.register(handle, LifecycleEvent::Resize, delegate);
    }

    /// Installs or replaces the callback that sees every native message. A
    /// non-zero return suppresses the paint, move and resize delegates for
    /// that message; close and destroy are handled regardless.
    pub fn register_message<F>(&self, handle: &WindowHandle, delegate: F)
    where
        F: Fn(&WindowHandle, NativeId, &NativeMessage) -> i64 + Send + Sync + 'static,
    {
        self.shared
            .delegates
            .set_message(handle, Some(Arc::new(delegate)));
    }

    pub fn unregister_all(&self, handle: &WindowHandle) {
        self.shared.delegates.clear(handle);
    }
}

/// Removes a window thread's traces when it exits, also by unwinding out of a
/// delegate.
struct Teardown<'a> {
    shared: &'a Shared,
    handle: &'a WindowHandle,
    native: NativeId,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        let (shared, handle, native) = (self.shared, self.handle, self.native);
        if thread::panicking() {
            error!("{handle}: window thread panicked, tearing {native} down");
        }
        shared.delegates.entry(handle).native = None;
        shared.platform.destroy_window(native);
        shared.threads.remove(handle);
        info!("{handle}: window stopped");
    }
}

impl Shared {
    fn run_window(
        &self,
        handle: WindowHandle,
        entry: ThreadEntry,
        ready: Sender<std::result::Result<NativeId, PlatformError>>,
    ) {
        let native = match self.platform.create_window(&handle.title()) {
            Ok(native) => native,
            Err(err) => {
                warn!("{handle}: native window creation failed: {err}");
                self.threads.remove(&handle);
                let _ = ready.send(Err(err));
                return;
            }
        };
        {
            let mut state = entry.lock();
            state.has_opened = true;
            state.native = Some(native);
        }
        // dropped before `ready`: an opener woken by the closed channel finds
        // the entry already gone
        let _teardown = Teardown {
            shared: self,
            handle: &handle,
            native,
        };
        info!("{handle}: window started as {native}");

        {
            let mut delegates = self.delegates.entry(&handle);
            delegates.native = Some(native);
            let started = delegates.get(LifecycleEvent::Started);
            delegates.release();
            if let Some(started) = started {
                started(&handle, native);
            }
        }
        let _ = ready.send(Ok(native));

        loop {
            self.platform
                .pump_messages(native, &mut |message| self.dispatch(native, message));
            thread::sleep(self.config.pump_interval);
            if self.should_stop(&handle, &entry) {
                break;
            }
        }

        let mut delegates = self.delegates.entry(&handle);
        if let Some(stopping) = delegates.get(LifecycleEvent::Stopping) {
            delegates.release();
            stopping(&handle, native);
        }
    }

    fn should_stop(&self, handle: &WindowHandle, entry: &ThreadEntry) -> bool {
        // Counters are read under the entry lock: an open that raced with this
        // check either is counted here or finds `is_closing` set.
        let mut state = entry.lock();
        if state.closing_self {
            debug!("{handle}: window closed itself");
            return true;
        }
        if !self.counters.is_open(handle) {
            state.closing_externally = true;
            state.is_closing = true;
            debug!("{handle}: close requested");
            return true;
        }
        false
    }

    fn dispatch(&self, native: NativeId, message: NativeMessage) -> i64 {
        let mut result = 0;
        if let Some(mut delegates) = self.delegates.find_by_native(native) {
            let handle = delegates.handle.clone();
            if let Some(on_message) = delegates.message() {
                result = delegates.suspend(|| on_message(&handle, native, &message));
            }
            if result == 0 {
                let event = match message.code {
                    codes::PAINT => Some(LifecycleEvent::Paint),
                    codes::MOVE => Some(LifecycleEvent::Move),
                    codes::SIZE => Some(LifecycleEvent::Resize),
                    _ => None,
                };
                if let Some(delegate) = event.and_then(|event| delegates.get(event)) {
                    delegates.release();
                    delegate(&handle, native);
                }
            }
        }

        match message.code {
            codes::CLOSE => {
                self.platform.destroy_window(native);
                self.mark_closing_self(native);
            }
            codes::DESTROY => self.mark_closing_self(native),
            _ => {}
        }
        result
    }

    fn mark_closing_self(&self, native: NativeId) {
        match self.threads.find_by_native(native) {
            Some((handle, entry)) => {
                let mut state = entry.lock();
                state.is_closing = true;
                state.closing_self = true;
                debug!("{handle}: {native} is going away");
            }
            None => error!("{native}: destroy for a window with no lifecycle entry"),
        }
    }
}
