//! Runtime tunables.
//!
//! Every wait in this crate is a fixed or linearly growing poll, never a
//! deadline; these are the step sizes. `Config::from_env` reads overrides from
//! `WINBUF_*` environment variables.

use std::env;
use std::time::Duration;

use log::warn;

#[derive(Debug, Clone)]
pub struct Config {
    /// Sleep between message pump batches on a window thread.
    pub pump_interval: Duration,
    /// Wait step while `begin_drawing` is held off by a blit.
    pub draw_retry: Duration,
    /// Wait step while a blit or resize is held off by drawing.
    pub blit_retry: Duration,
    /// Increment of the linear backoff used by `open` while a previous
    /// instance tears down.
    pub open_backoff_step: Duration,
    /// Hand surface bytes to the platform unchanged instead of converting
    /// RGBA to BGRA.
    pub assume_bgra: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pump_interval: Duration::from_millis(10),
            draw_retry: Duration::from_millis(10),
            blit_retry: Duration::from_millis(1),
            open_backoff_step: Duration::from_millis(1),
            assume_bgra: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pump_interval: millis_var("WINBUF_PUMP_INTERVAL_MS", defaults.pump_interval),
            draw_retry: millis_var("WINBUF_DRAW_RETRY_MS", defaults.draw_retry),
            blit_retry: millis_var("WINBUF_BLIT_RETRY_MS", defaults.blit_retry),
            open_backoff_step: millis_var("WINBUF_OPEN_BACKOFF_MS", defaults.open_backoff_step),
            assume_bgra: env::var("WINBUF_ASSUME_BGRA").is_ok(),
        }
    }
}

fn millis_var(name: &str, default: Duration) -> Duration {
    match env::var(name) {
        Ok(raw) => parse_millis(&raw).unwrap_or_else(|| {
            warn!("ignoring {name}={raw:?}: expected milliseconds");
            default
        }),
        Err(_) => default,
    }
}

fn parse_millis(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_millis)
}
