//! Threaded, double-buffered windows addressed by logical handle.
//!
//! [`WindowManager`] runs one thread per live window and resolves racing
//! `open`/`close` calls through counters. [`Drawing`] lets a renderer thread
//! fill a window's off-screen [`Surface`] while the window thread blits it,
//! never both at once. The native side is abstracted by [`Platform`];
//! [`HeadlessPlatform`] implements it without a display.

pub mod config;
pub mod drawing;
pub mod error;
pub mod guard;
pub mod handle;
pub mod platform;
pub mod registry;
pub mod surface;
pub mod types;
pub mod window_manager;

pub use config::Config;
pub use drawing::{DrawBlitState, DrawInfo, Drawing};
pub use error::{Error, Result};
pub use handle::{NativeId, WindowHandle};
pub use platform::{HeadlessPlatform, NativeMessage, Platform};
pub use registry::LifecycleEvent;
pub use surface::Surface;
pub use types::{Color, Rect, Vec2};
pub use window_manager::WindowManager;
