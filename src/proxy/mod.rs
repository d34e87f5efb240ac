//! Reload proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Browser request
//!     → server.rs (Axum router)
//!         /__devsync/client.js → inject.rs (reload client)
//!         /__devsync/ws        → websocket.rs (subscribe to ReloadHub)
//!         anything else        → upstream.rs (URI rewrite) → backend
//!     → server.rs (HTML? → inject.rs adds <script>)
//!     → Browser
//!
//! File watcher
//!     → reload.rs (ReloadHub::broadcast_reload)
//!     → websocket.rs (one text frame per connected client)
//! ```
//!
//! # Design Decisions
//! - No readiness coordination with the upstream; a dead upstream is a 502
//! - Only uncompressed `text/html` bodies are buffered; everything else streams
//! - The hub is the only state shared with the watcher

pub mod inject;
pub mod reload;
pub mod server;
pub mod upstream;
pub mod websocket;

pub use reload::{ReloadHub, ReloadMessage, ReloadSink};
pub use server::{ProxyError, ProxyHandle, ReloadProxy};
pub use upstream::{Upstream, UpstreamError};
