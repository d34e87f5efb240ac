//! Backend process subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig (command, args, env map, working dir)
//!     → launcher.rs (spawn child, pipe stdout/stderr to our console)
//!     → readiness.rs (optional: poll upstream until it accepts connections)
//!     → ServerProcess handle held by the session until shutdown
//! ```
//!
//! # Design Decisions
//! - Spawn failure is reported, never fatal
//! - Child is killed on drop, its process group with it on unix, so no
//!   session leaves an orphan behind

pub mod launcher;
pub mod readiness;

pub use launcher::{LaunchError, Readiness, ServerLauncher, ServerProcess};
pub use readiness::{wait_until_ready, ReadinessError};
