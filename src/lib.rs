//! devsync: development server with live reload.
//!
//! Starts the backend development server, puts a reload proxy in front of it
//! and refreshes connected browsers when templates or static assets change.
//!
//! ```text
//!                  ┌───────────────────────── devsync ──────────────────────────┐
//!                  │                                                             │
//!   Browser ──────▶│  proxy (axum) ──────── forward ───────▶ upstream :5000 ─────┼──▶ backend
//!      ▲           │    │  inject <script>                        ▲              │   (child process)
//!      │ ws reload │    │                                         │ spawn        │
//!      └───────────┼── ReloadHub ◀── watch (notify + glob)   process launcher   │
//!                  │                                                             │
//!                  └─────────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod process;
pub mod proxy;
pub mod watch;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::DevConfig;
pub use lifecycle::{Orchestrator, Session, Shutdown, Task};
pub use proxy::{ReloadHub, ReloadProxy};
