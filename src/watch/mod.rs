//! File watching subsystem.
//!
//! # Data Flow
//! ```text
//! WatchConfig (root + globs)
//!     → pattern.rs (split into base directory + glob remainder)
//!     → watcher.rs (one OS registration per base, notify callback thread)
//!     → mpsc channel → dispatch task (kind filter, glob match)
//!     → ReloadSink::broadcast_reload
//! ```
//!
//! # Design Decisions
//! - No coalescing by default: N change events → N broadcasts
//! - Optional coalescing window via `watch.debounce_ms`
//! - Missing directories are skipped, not fatal

pub mod pattern;
pub mod watcher;

pub use pattern::WatchPattern;
pub use watcher::{FileWatcher, Registration, WatchError, WatchHandle};
