use thiserror::Error;

use crate::handle::{NativeId, WindowHandle};
use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum Error {
    /// The platform refused to create the native window for a handle.
    #[error("failed to create native window for {handle}")]
    WindowCreation {
        handle: WindowHandle,
        #[source]
        source: PlatformError,
    },

    #[error("cannot spawn window thread for {handle}")]
    ThreadSpawn {
        handle: WindowHandle,
        #[source]
        source: std::io::Error,
    },

    /// The window thread exited without reporting whether its window exists.
    #[error("window thread for {0} exited during start-up")]
    ThreadLost(WindowHandle),

    #[error("cannot allocate a {width}x{height} surface")]
    SurfaceAllocation { width: u32, height: u32 },

    #[error("no surface for {0}")]
    NoSurface(WindowHandle),

    #[error("platform call failed for {native}")]
    Platform {
        native: NativeId,
        #[source]
        source: PlatformError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
