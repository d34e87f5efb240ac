//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs):
//!     Task → steps in order → Session (server, proxy, watcher handles)
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGINT/SIGTERM → stop watcher → stop proxy → kill backend → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: each step acknowledged before the next
//! - Ordered shutdown: reverse of startup
//! - Cancellation is whole-session only

pub mod orchestrator;
pub mod shutdown;
pub mod signals;

pub use orchestrator::{Orchestrator, OrchestratorError, Session, Step, Task, TaskState};
pub use shutdown::Shutdown;
