//! Draw/blit coordination over each window's surface.
//!
//! One renderer and one blitter take turns on a window's surface. Four flags
//! per window decide who may proceed: `drawing`/`blitting` mark an active
//! span, `wants_to_draw`/`wants_to_blit` announce an intent before the caller
//! starts waiting. A blit that is already pending or running absorbs further
//! paint requests instead of queueing behind them.
//!
//! Waiting always happens with the flag lock released, so the window thread
//! (which blits from its paint handler) is never stuck behind a renderer that
//! merely holds the lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use log::{debug, error, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::guard::{Entry, Guarded, Ref};
use crate::handle::{NativeId, WindowHandle};
use crate::platform::{Frame, Platform};
use crate::surface::Surface;
use crate::types::{Color, Rect};
use crate::window_manager::WindowManager;

/// What one `draw` call puts on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawInfo {
    pub rect: Rect,
    pub color: Color,
}

/// Per-window span flags. `drawing` and `blitting` are never both set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawBlitState {
    pub blitting: bool,
    pub wants_to_blit: bool,
    pub drawing: bool,
    pub wants_to_draw: bool,
}

struct BackingStore {
    native: NativeId,
    surface: Surface,
}

type FlagMap = BTreeMap<WindowHandle, DrawBlitState>;

pub struct Drawing {
    platform: Arc<dyn Platform>,
    config: Config,
    surfaces: Guarded<BTreeMap<WindowHandle, BackingStore>>,
    flags: Guarded<FlagMap>,
}

impl Drawing {
    pub fn new(platform: Arc<dyn Platform>, config: Config) -> Self {
        Self {
            platform,
            config,
            surfaces: Guarded::default(),
            flags: Guarded::default(),
        }
    }

    /// A coordinator for the windows of `manager`, sharing its platform and
    /// configuration.
    pub fn for_manager(manager: &WindowManager) -> Arc<Self> {
        Arc::new(Self::new(
            Arc::clone(manager.platform()),
            manager.config().clone(),
        ))
    }

    /// Wires the lifecycle of `handle` to this coordinator: the surface is
    /// created when the window starts, released when it stops, blitted on
    /// paint and reallocated on resize.
    pub fn attach(self: &Arc<Self>, manager: &WindowManager, handle: &WindowHandle) {
        let this = Arc::clone(self);
        manager.register_started(handle, move |handle, native| {
            if let Err(err) = this.init(handle, native) {
                error!("{handle}: surface init failed: {err}");
            }
        });
        let this = Arc::clone(self);
        manager.register_stopping(handle, move |handle, _| {
            this.deinit(handle);
        });
        let this = Arc::clone(self);
        manager.register_paint(handle, move |handle, _| {
            if let Err(err) = this.paint(handle) {
                warn!("{handle}: paint failed: {err}");
            }
        });
        let this = Arc::clone(self);
        manager.register_resize(handle, move |handle, native| {
            if let Err(err) = this.resize(handle, native) {
                error!("{handle}: surface resize failed: {err}");
            }
        });
    }

    fn flags(&self, handle: &WindowHandle) -> Ref<'_, FlagMap, Entry<WindowHandle>> {
        let mut map = self.flags.lock();
        map.entry(handle.clone()).or_default();
        map.retarget(Entry(handle.clone()))
    }

    /// Snapshot of the span flags of `handle`.
    pub fn state(&self, handle: &WindowHandle) -> DrawBlitState {
        *self.flags(handle)
    }

    /// Allocates the surface of `handle` at the current client size of
    /// `native`, replacing any previous one.
    pub fn init(&self, handle: &WindowHandle, native: NativeId) -> Result<()> {
        let (width, height) = self
            .platform
            .client_size(native)
            .map_err(|source| Error::Platform { native, source })?;
        let surface = Surface::new(width, height)?;
        debug!(
            "{handle}: surface {}x{} for {native}",
            surface.width(),
            surface.height()
        );
        self.surfaces
            .lock()
            .insert(handle.clone(), BackingStore { native, surface });
        Ok(())
    }

    /// Releases the surface of `handle`. Returns false if there was none.
    pub fn deinit(&self, handle: &WindowHandle) -> bool {
        self.surfaces.lock().remove(handle).is_some()
    }

    /// Reallocates the surface at the new client size. Old contents are
    /// discarded.
    ///
    /// Takes the blit side of the exclusion first, so the swap never happens
    /// inside a drawing span or under a running blit.
    pub fn resize(&self, handle: &WindowHandle, native: NativeId) -> Result<()> {
        self.acquire_blit(handle, false);
        self.deinit(handle);
        let result = self.init(handle, native);
        self.flags(handle).blitting = false;
        result
    }

    pub fn surface_size(&self, handle: &WindowHandle) -> Option<(u32, u32)> {
        self.surfaces
            .lock()
            .get(handle)
            .map(|store| store.surface.size())
    }

    /// Starts a drawing span, waiting while a blit is running or pending.
    ///
    /// Panics if a span is already open or being opened for `handle`: there
    /// is one renderer per window.
    pub fn begin_drawing(&self, handle: &WindowHandle) {
        let mut state = self.flags(handle);
        assert!(
            !state.drawing && !state.wants_to_draw,
            "{handle}: begin_drawing while a drawing span is already open"
        );
        state.wants_to_draw = true;
        while state.blitting || state.wants_to_blit {
            let retry = self.config.draw_retry;
            state.suspend(|| thread::sleep(retry));
        }
        state.drawing = true;
        state.wants_to_draw = false;
    }

    pub fn end_drawing(&self, handle: &WindowHandle) {
        let mut state = self.flags(handle);
        assert!(state.drawing, "{handle}: end_drawing without begin_drawing");
        state.drawing = false;
    }

    /// Fills `info.rect` with `info.color`. Must be inside a drawing span.
    pub fn draw(&self, handle: &WindowHandle, info: &DrawInfo) -> Result<()> {
        self.with_surface(handle, |surface| surface.fill_rect(info.rect, info.color))
    }

    /// Fills the whole surface. Must be inside a drawing span.
    pub fn clear(&self, handle: &WindowHandle, color: Color) -> Result<()> {
        self.with_surface(handle, |surface| surface.fill(color))
    }

    fn with_surface(&self, handle: &WindowHandle, f: impl FnOnce(&mut Surface)) -> Result<()> {
        assert!(
            self.flags(handle).drawing,
            "{handle}: draw outside of a drawing span"
        );
        let mut store = self
            .surfaces
            .lock()
            .try_retarget(Entry(handle.clone()))
            .ok_or_else(|| Error::NoSurface(handle.clone()))?;
        f(&mut store.surface);
        Ok(())
    }

    /// Copies the surface onto the window.
    ///
    /// Returns `Ok(false)` without waiting when a blit is already running or
    /// pending for `handle`; otherwise waits for any drawing span to end,
    /// blits, and returns `Ok(true)`.
    pub fn paint(&self, handle: &WindowHandle) -> Result<bool> {
        if !self.acquire_blit(handle, true) {
            debug!("{handle}: paint coalesced into pending blit");
            return Ok(false);
        }
        let result = self.blit(handle);
        self.flags(handle).blitting = false;
        result.map(|()| true)
    }

    /// Marks a blit as running once no drawing span is open. With `coalesce`
    /// a blit that is already running or pending makes this return false;
    /// without it, this waits for that blit to finish.
    fn acquire_blit(&self, handle: &WindowHandle, coalesce: bool) -> bool {
        let retry = self.config.blit_retry;
        let mut state = self.flags(handle);
        while state.blitting || state.wants_to_blit {
            if coalesce {
                return false;
            }
            state.suspend(|| thread::sleep(retry));
        }
        // intent is visible before the lock is first released
        state.wants_to_blit = true;
        while state.drawing {
            state.suspend(|| thread::sleep(retry));
        }
        state.blitting = true;
        state.wants_to_blit = false;
        true
    }

    fn blit(&self, handle: &WindowHandle) -> Result<()> {
        let (native, width, height, pixels) = {
            let surfaces = self.surfaces.lock();
            let store = surfaces
                .get(handle)
                .ok_or_else(|| Error::NoSurface(handle.clone()))?;
            let surface = &store.surface;
            (
                store.native,
                surface.width(),
                surface.height(),
                surface.frame_pixels(self.config.assume_bgra),
            )
        };
        let frame = Frame {
            width,
            height,
            pixels: &pixels,
        };
        self.platform
            .blit(native, frame)
            .map_err(|source| Error::Platform { native, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{HeadlessPlatform, NativeMessage, PlatformError};
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    const RED: u32 = 0xFFFF_0000;

    fn fast_config() -> Config {
        Config {
            pump_interval: Duration::from_millis(1),
            draw_retry: Duration::from_millis(1),
            blit_retry: Duration::from_millis(1),
            open_backoff_step: Duration::from_millis(1),
            assume_bgra: false,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    fn standalone(width: u32, height: u32) -> (Arc<Drawing>, Arc<HeadlessPlatform>, WindowHandle, NativeId) {
        let platform = Arc::new(HeadlessPlatform::new(width, height));
        let native = platform.create_window("standalone").unwrap();
        let shared: Arc<dyn Platform> = platform.clone();
        let drawing = Arc::new(Drawing::new(shared, fast_config()));
        let handle = WindowHandle::new("standalone");
        drawing.init(&handle, native).unwrap();
        (drawing, platform, handle, native)
    }

    fn red_fill(width: f32, height: f32) -> DrawInfo {
        DrawInfo {
            rect: Rect::new(0.0, 0.0, width, height),
            color: Color::rgb(1.0, 0.0, 0.0),
        }
    }

    #[test]
    fn drawn_pixels_reach_the_window() {
        let (d, p, h, native) = standalone(8, 4);
        d.begin_drawing(&h);
        d.clear(&h, Color::black()).unwrap();
        d.draw(&h, &red_fill(2.0, 2.0)).unwrap();
        d.end_drawing(&h);
        assert!(d.paint(&h).unwrap());

        let frame = p.last_frame(native).unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.pixel(1, 1), Some(RED));
        assert_eq!(frame.pixel(5, 3), Some(0xFF00_0000));
        assert_eq!(d.state(&h), DrawBlitState::default());
    }

    #[test]
    #[should_panic(expected = "draw outside of a drawing span")]
    fn draw_outside_span_panics() {
        let (d, _, h, _) = standalone(4, 4);
        let _ = d.draw(&h, &red_fill(1.0, 1.0));
    }

    #[test]
    #[should_panic(expected = "already open")]
    fn nested_begin_drawing_panics() {
        let (d, _, h, _) = standalone(4, 4);
        d.begin_drawing(&h);
        d.begin_drawing(&h);
    }

    #[test]
    fn paint_without_surface_is_an_error() {
        let (d, _, h, _) = standalone(4, 4);
        assert!(d.deinit(&h));
        assert!(matches!(d.paint(&h), Err(Error::NoSurface(_))));
        // the failed blit still released its span
        assert_eq!(d.state(&h), DrawBlitState::default());
    }

    #[test]
    fn paint_while_blit_pending_returns_immediately() {
        let (d, p, h, native) = standalone(4, 4);
        d.begin_drawing(&h);

        let waiting = {
            let d = Arc::clone(&d);
            let h = h.clone();
            thread::spawn(move || d.paint(&h).unwrap())
        };
        assert!(wait_until(|| d.state(&h).wants_to_blit));

        // the first paint is parked behind the drawing span; this one must
        // not queue behind it
        assert!(!d.paint(&h).unwrap());
        assert_eq!(p.frame_count(native), 0);

        d.end_drawing(&h);
        assert!(waiting.join().unwrap());
        assert_eq!(p.frame_count(native), 1);
    }

    #[test]
    fn drawing_waits_for_pending_blit() {
        let (d, p, h, native) = standalone(4, 4);
        d.begin_drawing(&h);
        let painter = {
            let d = Arc::clone(&d);
            let h = h.clone();
            thread::spawn(move || d.paint(&h).unwrap())
        };
        assert!(wait_until(|| d.state(&h).wants_to_blit));
        d.end_drawing(&h);

        // the blitter announced itself first, so the next span starts after it
        d.begin_drawing(&h);
        assert_eq!(p.frame_count(native), 1);
        assert!(!d.state(&h).blitting);
        d.end_drawing(&h);
        assert!(painter.join().unwrap());
    }

    #[test]
    fn resize_waits_for_drawing_span() {
        let (d, p, h, native) = standalone(16, 16);
        d.begin_drawing(&h);
        assert!(p.resize(native, 6, 3));

        let resizer = {
            let d = Arc::clone(&d);
            let h = h.clone();
            thread::spawn(move || d.resize(&h, native).unwrap())
        };
        thread::sleep(Duration::from_millis(30));
        assert_eq!(d.surface_size(&h), Some((16, 16)));
        d.draw(&h, &red_fill(16.0, 16.0)).unwrap();
        d.end_drawing(&h);
        resizer.join().unwrap();
        assert_eq!(d.surface_size(&h), Some((6, 3)));
    }

    /// Forwards to a headless platform and counts blits that land inside a
    /// drawing span.
    struct Probe {
        inner: HeadlessPlatform,
        in_span: Arc<AtomicBool>,
        overlaps: AtomicUsize,
    }

    impl Platform for Probe {
        fn create_window(&self, title: &str) -> std::result::Result<NativeId, PlatformError> {
            self.inner.create_window(title)
        }

        fn destroy_window(&self, native: NativeId) {
            self.inner.destroy_window(native)
        }

        fn pump_messages(&self, native: NativeId, dispatch: &mut dyn FnMut(NativeMessage) -> i64) {
            self.inner.pump_messages(native, dispatch)
        }

        fn request_redraw(&self, native: NativeId) {
            self.inner.request_redraw(native)
        }

        fn client_size(&self, native: NativeId) -> std::result::Result<(u32, u32), PlatformError> {
            self.inner.client_size(native)
        }

        fn blit(&self, native: NativeId, frame: Frame<'_>) -> std::result::Result<(), PlatformError> {
            if self.in_span.load(Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_micros(rand::thread_rng().gen_range(0..150)));
            if self.in_span.load(Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.blit(native, frame)
        }
    }

    #[test]
    fn drawing_and_blitting_never_overlap() {
        let in_span = Arc::new(AtomicBool::new(false));
        let probe = Arc::new(Probe {
            inner: HeadlessPlatform::new(32, 32),
            in_span: Arc::clone(&in_span),
            overlaps: AtomicUsize::new(0),
        });
        let native = probe.create_window("probe").unwrap();
        let platform: Arc<dyn Platform> = probe.clone();
        let d = Arc::new(Drawing::new(platform, fast_config()));
        let h = WindowHandle::new("probe");
        d.init(&h, native).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let both_set = Arc::new(AtomicUsize::new(0));

        let producer = {
            let (d, h, in_span) = (Arc::clone(&d), h.clone(), Arc::clone(&in_span));
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for i in 0..200 {
                    d.begin_drawing(&h);
                    in_span.store(true, Ordering::SeqCst);
                    let shade = (i % 10) as f32 / 10.0;
                    d.draw(&h, &DrawInfo {
                        rect: Rect::new(0.0, 0.0, 32.0, 32.0),
                        color: Color::rgb(shade, shade, shade),
                    })
                    .unwrap();
                    thread::sleep(Duration::from_micros(rng.gen_range(0..200)));
                    in_span.store(false, Ordering::SeqCst);
                    d.end_drawing(&h);
                    thread::sleep(Duration::from_micros(rng.gen_range(0..100)));
                }
            })
        };
        let painters: Vec<_> = (0..2)
            .map(|_| {
                let (d, h, done) = (Arc::clone(&d), h.clone(), Arc::clone(&done));
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    while !done.load(Ordering::SeqCst) {
                        d.paint(&h).unwrap();
                        thread::sleep(Duration::from_micros(rng.gen_range(0..300)));
                    }
                })
            })
            .collect();
        let observer = {
            let (d, h, done, both_set) =
                (Arc::clone(&d), h.clone(), Arc::clone(&done), Arc::clone(&both_set));
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let state = d.state(&h);
                    if state.drawing && state.blitting {
                        both_set.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::yield_now();
                }
            })
        };

        producer.join().unwrap();
        done.store(true, Ordering::SeqCst);
        for painter in painters {
            painter.join().unwrap();
        }
        observer.join().unwrap();

        assert_eq!(probe.overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(both_set.load(Ordering::SeqCst), 0);
        assert!(probe.inner.frame_count(native) > 0);
    }

    #[test]
    fn surface_is_ready_when_open_returns() {
        let platform = Arc::new(HeadlessPlatform::new(16, 8));
        let shared: Arc<dyn Platform> = platform.clone();
        let manager = WindowManager::with_config(shared, fast_config());
        let drawing = Drawing::for_manager(&manager);

        for n in 0..50 {
            let h = WindowHandle::numbered("eager", n);
            drawing.attach(&manager, &h);
            manager.open(&h).unwrap();
            assert_eq!(drawing.surface_size(&h), Some((16, 8)));
            drawing.begin_drawing(&h);
            let cleared = drawing.clear(&h, Color::white());
            drawing.end_drawing(&h);
            cleared.unwrap();
            manager.close(&h);
        }
        assert!(wait_until(|| platform.live_count() == 0));
    }

    #[test]
    fn resize_event_reallocates_surface() {
        let platform = Arc::new(HeadlessPlatform::new(40, 20));
        let shared: Arc<dyn Platform> = platform.clone();
        let manager = WindowManager::with_config(shared, fast_config());
        let drawing = Drawing::for_manager(&manager);
        let h = WindowHandle::new("resizable");
        drawing.attach(&manager, &h);

        manager.open(&h).unwrap();
        assert!(wait_until(|| drawing.surface_size(&h) == Some((40, 20))));
        let native = manager.native(&h).unwrap();

        assert!(platform.resize(native, 64, 32));
        assert!(wait_until(|| drawing.surface_size(&h) == Some((64, 32))));

        drawing.begin_drawing(&h);
        drawing.draw(&h, &red_fill(64.0, 32.0)).unwrap();
        drawing.end_drawing(&h);
        manager.repaint(&h);
        assert!(wait_until(|| {
            platform
                .last_frame(native)
                .map(|f| f.width == 64 && f.height == 32 && f.pixel(63, 31) == Some(RED))
                .unwrap_or(false)
        }));

        manager.close(&h);
        assert!(wait_until(|| !manager.exists(&h)));
        assert_eq!(drawing.surface_size(&h), None);
    }
}
