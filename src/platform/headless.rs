//! A `Platform` with no display behind it.
//!
//! Windows are bookkeeping records with their own message queue. Tests (and
//! hosts without a screen) inject close, destroy, move and resize events
//! through the public helpers and inspect the frames that were blitted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace};

use super::{codes, Frame, NativeMessage, Platform, PlatformError};
use crate::guard::{Entry, Guarded};
use crate::handle::NativeId;

/// A copy of the most recent blit to a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl CapturedFrame {
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }
}

struct HeadlessWindow {
    title: String,
    size: (u32, u32),
    alive: bool,
    sender: Sender<NativeMessage>,
    receiver: Receiver<NativeMessage>,
    redraw_pending: bool,
    frames: u64,
    last_frame: Option<CapturedFrame>,
}

pub struct HeadlessPlatform {
    next_id: AtomicU64,
    default_size: (u32, u32),
    refusals: AtomicUsize,
    created: AtomicUsize,
    windows: Guarded<BTreeMap<NativeId, HeadlessWindow>>,
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        // same default client area as the GDI window class
        Self::new(240, 120)
    }
}

impl HeadlessPlatform {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            default_size: (width, height),
            refusals: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            windows: Guarded::default(),
        }
    }

    /// Makes the next `count` calls to `create_window` fail.
    pub fn refuse_next_creations(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Total number of native windows ever created.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Native windows created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.windows.lock().values().filter(|w| w.alive).count()
    }

    pub fn is_alive(&self, native: NativeId) -> bool {
        self.windows
            .lock()
            .get(&native)
            .map(|w| w.alive)
            .unwrap_or(false)
    }

    pub fn title(&self, native: NativeId) -> Option<String> {
        self.windows.lock().get(&native).map(|w| w.title.clone())
    }

    /// Live window with the given title, if any.
    pub fn find_live(&self, title: &str) -> Option<NativeId> {
        self.windows
            .lock()
            .iter()
            .find(|(_, w)| w.alive && w.title == title)
            .map(|(id, _)| *id)
    }

    pub fn frame_count(&self, native: NativeId) -> u64 {
        self.windows
            .lock()
            .get(&native)
            .map(|w| w.frames)
            .unwrap_or(0)
    }

    pub fn last_frame(&self, native: NativeId) -> Option<CapturedFrame> {
        self.windows
            .lock()
            .get(&native)
            .and_then(|w| w.last_frame.clone())
    }

    /// Queues an arbitrary message. Returns false if the window is gone.
    pub fn post(&self, native: NativeId, message: NativeMessage) -> bool {
        let windows = self.windows.lock();
        match windows.get(&native) {
            Some(w) if w.alive => w.sender.send(message).is_ok(),
            _ => false,
        }
    }

    /// Simulates the user clicking the close button.
    pub fn request_close(&self, native: NativeId) -> bool {
        self.post(native, NativeMessage::new(codes::CLOSE))
    }

    /// Simulates the window being torn down from outside the owning thread.
    pub fn notify_destroyed(&self, native: NativeId) -> bool {
        self.post(native, NativeMessage::new(codes::DESTROY))
    }

    pub fn move_to(&self, native: NativeId, x: i16, y: i16) -> bool {
        self.post(
            native,
            NativeMessage::with_params(codes::MOVE, 0, pack_words(x as u16, y as u16)),
        )
    }

    /// Changes the client area and queues a size message.
    pub fn resize(&self, native: NativeId, width: u32, height: u32) -> bool {
        let Some(mut window) = self.windows.lock().try_retarget(Entry(native)) else {
            return false;
        };
        if !window.alive {
            return false;
        }
        window.size = (width, height);
        let lparam = pack_words(width.min(0xFFFF) as u16, height.min(0xFFFF) as u16);
        window
            .sender
            .send(NativeMessage::with_params(codes::SIZE, 0, lparam))
            .is_ok()
    }
}

fn pack_words(low: u16, high: u16) -> i64 {
    (i64::from(high) << 16) | i64::from(low)
}

impl Platform for HeadlessPlatform {
    fn create_window(&self, title: &str) -> Result<NativeId, PlatformError> {
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(PlatformError::CreationRejected(format!(
                "headless creation refused for {title:?}"
            )));
        }

        let native = NativeId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = unbounded();
        self.windows.lock().insert(
            native,
            HeadlessWindow {
                title: title.to_owned(),
                size: self.default_size,
                alive: true,
                sender,
                receiver,
                redraw_pending: false,
                frames: 0,
                last_frame: None,
            },
        );
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!("headless window {native} created: {title:?}");
        Ok(native)
    }

    fn destroy_window(&self, native: NativeId) {
        if let Some(mut window) = self.windows.lock().try_retarget(Entry(native)) {
            if window.alive {
                window.alive = false;
                // drop anything still queued
                while window.receiver.try_recv().is_ok() {}
                debug!("headless window {native} destroyed");
            }
        }
    }

    fn pump_messages(&self, native: NativeId, dispatch: &mut dyn FnMut(NativeMessage) -> i64) {
        let (receiver, queued) = {
            let windows = self.windows.lock();
            match windows.get(&native) {
                Some(w) if w.alive => (w.receiver.clone(), w.receiver.len()),
                _ => return,
            }
        };
        // only what was queued on entry; messages posted by handlers wait for
        // the next batch
        for message in receiver.try_iter().take(queued) {
            if message.code == codes::PAINT {
                if let Some(mut w) = self.windows.lock().try_retarget(Entry(native)) {
                    w.redraw_pending = false;
                }
            }
            trace!("{native} <- {message:?}");
            dispatch(message);
        }
    }

    fn request_redraw(&self, native: NativeId) {
        if let Some(mut window) = self.windows.lock().try_retarget(Entry(native)) {
            if window.alive && !window.redraw_pending {
                window.redraw_pending = true;
                let _ = window.sender.send(NativeMessage::new(codes::PAINT));
            }
        }
    }

    fn client_size(&self, native: NativeId) -> Result<(u32, u32), PlatformError> {
        match self.windows.lock().get(&native) {
            Some(w) if w.alive => Ok(w.size),
            _ => Err(PlatformError::UnknownWindow(native)),
        }
    }

    fn blit(&self, native: NativeId, frame: Frame<'_>) -> Result<(), PlatformError> {
        let expected = frame.width as usize * frame.height as usize;
        if frame.pixels.len() != expected {
            return Err(PlatformError::FrameMismatch {
                width: frame.width,
                height: frame.height,
                pixels: frame.pixels.len(),
            });
        }
        let Some(mut window) = self.windows.lock().try_retarget(Entry(native)) else {
            return Err(PlatformError::UnknownWindow(native));
        };
        if !window.alive {
            return Err(PlatformError::UnknownWindow(native));
        }
        window.frames += 1;
        window.last_frame = Some(CapturedFrame {
            width: frame.width,
            height: frame.height,
            pixels: frame.pixels.to_vec(),
        });
        Ok(())
    }
}
