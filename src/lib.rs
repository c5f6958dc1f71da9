//! # Replaykit
//!
//! Replay runtime for recorded web sessions.
//!
//! Replaykit is the library generated replay scripts embed. A recorder
//! watches a person drive a web app and emits a straight-line script; this
//! crate supplies the parts of that script that must tolerate a live,
//! asynchronously loading page instead of the page the recording saw.
//!
//! ## Features
//!
//! - **Network settling** - Count in-flight xhr/fetch traffic and wait for
//!   a quiet window before each step, with a fail-open timeout
//! - **Locator fallback** - Resolve ranked candidate descriptors to one
//!   live element, preferring unique matches over ambiguous ones
//! - **Declarative requests** - Execute recorded API calls with credentials
//!   resolved from the browser's own storage at send time
//! - **Fact reconciliation** - Check that a number agrees across the UI,
//!   the database and the API before a run counts as green
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use replaykit::{HttpRequestExecutor, KeyValue, MemoryStorage, ReqwestTransport, RequestSpec};
//!
//! #[tokio::main]
//! async fn main() -> replaykit::Result<()> {
//!     // Credentials come from the page's storage at replay time
//!     let storage = Arc::new(
//!         MemoryStorage::new().with(replaykit::StorageKind::LocalStorage, "auth_token", "t0ken"),
//!     );
//!     let executor = HttpRequestExecutor::new(Arc::new(ReqwestTransport::new()), storage);
//!
//!     // Recorded steps are plain data
//!     let mut spec = RequestSpec::new("GET", "https://api.example.com/projects");
//!     spec.params.push(KeyValue::new("page", "1"));
//!
//!     let response = executor.execute(&spec).await?;
//!     println!("{} {}", response.status, response.status_text);
//!     Ok(())
//! }
//! ```
//!
//! ## Verifying a fact
//!
//! ```rust
//! use replaykit::{FactReconciler, FactSources};
//!
//! let sources = FactSources {
//!     ui_fragments: vec![r#"<span class="stat-number">5</span>"#.into()],
//!     db_row_sets: vec![vec![serde_json::json!({"count": 5})]],
//!     api_payloads: vec![serde_json::json!({"total_projects": 5})],
//! };
//!
//! assert!(FactReconciler::new().verify(&sources));
//! ```

pub mod error;
pub mod idle;
pub mod locator;
pub mod reconcile;
pub mod request;
pub mod runner;
pub mod storage;
pub mod transport;

// Re-exports
pub use error::{Error, Result};
pub use idle::{IdleMonitor, NetworkEvent, RequestCounter, ResourceType};
pub use locator::{
    ElementHandle, Locator, LocatorFactory, LocatorResolver, LocatorSpec, ResolvedElement,
};
pub use reconcile::{FactReconciler, FactSources};
pub use request::{
    AuthSpec, BodySpec, CredentialRef, FormField, HttpRequestExecutor, KeyValue, RawResponse,
    RequestSpec, ResponseBody,
};
pub use runner::ScriptRuntime;
pub use storage::{MemoryStorage, StorageAccessor, StorageKind};
pub use transport::{
    HttpTransport, ReqwestTransport, RequestPayload, TransportRequest, TransportResponse,
};

/// Timing knobs for one replay run
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Idle-monitor poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Per-candidate attach wait during locator resolution
    pub candidate_wait_ms: u64,
    /// Total budget for a default idle wait
    pub idle_timeout_ms: u64,
    /// Continuous quiet window required before a wait completes
    pub idle_window_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: idle::DEFAULT_POLL_INTERVAL_MS,
            candidate_wait_ms: locator::DEFAULT_CANDIDATE_WAIT_MS,
            idle_timeout_ms: idle::DEFAULT_IDLE_TIMEOUT_MS,
            idle_window_ms: idle::DEFAULT_IDLE_WINDOW_MS,
        }
    }
}

impl ReplayConfig {
    /// Tight timings for tests and demos against local backends
    pub fn snappy() -> Self {
        Self {
            poll_interval_ms: 10,
            candidate_wait_ms: 200,
            idle_timeout_ms: 1_000,
            idle_window_ms: 50,
        }
    }
}
