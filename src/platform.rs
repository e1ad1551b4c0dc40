//! The native windowing services this crate drives but does not implement.
//!
//! A `Platform` creates and destroys native windows, drains their message
//! queues, and copies finished frames onto them. Everything is addressed by
//! [`NativeId`]; the lifecycle manager maps those back to logical handles.

pub mod headless;

use thiserror::Error;

use crate::handle::NativeId;

pub use headless::HeadlessPlatform;

/// Message codes understood by the lifecycle manager. Values follow the Win32
/// numbering so a GDI-backed platform can pass its codes through untouched.
pub mod codes {
    pub const DESTROY: u32 = 0x0002;
    pub const MOVE: u32 = 0x0003;
    pub const SIZE: u32 = 0x0005;
    pub const PAINT: u32 = 0x000F;
    pub const CLOSE: u32 = 0x0010;
}

/// One queued native message: a code plus two opaque parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeMessage {
    pub code: u32,
    pub wparam: u64,
    pub lparam: i64,
}

impl NativeMessage {
    pub fn new(code: u32) -> Self {
        Self::with_params(code, 0, 0)
    }

    pub fn with_params(code: u32, wparam: u64, lparam: i64) -> Self {
        Self {
            code,
            wparam,
            lparam,
        }
    }
}

/// A finished frame, one `u32` per pixel, row-major, no padding.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u32],
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("unknown native window {0}")]
    UnknownWindow(NativeId),

    #[error("native window creation rejected: {0}")]
    CreationRejected(String),

    #[error("frame of {pixels} pixels does not match {width}x{height}")]
    FrameMismatch { width: u32, height: u32, pixels: usize },
}

pub trait Platform: Send + Sync {
    fn create_window(&self, title: &str) -> Result<NativeId, PlatformError>;

    /// Destroys the window. Destroying a window that is already gone is a
    /// no-op.
    fn destroy_window(&self, native: NativeId);

    /// Drains every message queued for `native` right now and hands each one
    /// to `dispatch`, which returns the window procedure result. Never blocks
    /// waiting for new messages.
    fn pump_messages(&self, native: NativeId, dispatch: &mut dyn FnMut(NativeMessage) -> i64);

    /// Asks for a paint message to be queued. Requests are coalesced.
    fn request_redraw(&self, native: NativeId);

    /// Current client-area size in pixels.
    fn client_size(&self, native: NativeId) -> Result<(u32, u32), PlatformError>;

    /// Copies `frame` onto the visible window.
    fn blit(&self, native: NativeId, frame: Frame<'_>) -> Result<(), PlatformError>;
}
