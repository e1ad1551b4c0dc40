//! Per-handle registries, one lock per map.
//!
//! `Counters` holds the open/close tallies, `Delegates` the lifecycle
//! callbacks, `Threads` the state of each running window thread. They are
//! independent so that a lookup in one never waits on another.

pub mod counters;
pub mod delegates;
pub mod threads;

pub use counters::{Counters, OpenClose, OpenOutcome};
pub use delegates::{
    DelegateRef, DelegateSet, Delegates, LifecycleDelegate, LifecycleEvent, MessageDelegate,
};
pub use threads::{ThreadEntry, ThreadState, Threads};
