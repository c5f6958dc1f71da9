//! Per-page runtime facade for generated scripts
//!
//! Generated replay scripts are straight-line: navigate, settle, act,
//! verify. A [`ScriptRuntime`] bundles the pieces those lines need so the
//! generator emits one object and calls it between steps instead of
//! wiring four components by hand.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::idle::{IdleMonitor, NetworkEvent};
use crate::locator::{LocatorFactory, LocatorResolver, LocatorSpec, ResolvedElement};
use crate::reconcile::{FactReconciler, FactSources};
use crate::request::{HttpRequestExecutor, RawResponse, RequestSpec};
use crate::storage::StorageAccessor;
use crate::transport::HttpTransport;
use crate::ReplayConfig;

/// One page's replay runtime.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use replaykit::{
///     LocatorSpec, MemoryStorage, ReplayConfig, ReqwestTransport, ScriptRuntime,
/// };
/// # use replaykit::{Locator, LocatorFactory};
/// # struct PageBackend;
/// # impl LocatorFactory for PageBackend {
/// #     fn locator(&self, _: &LocatorSpec) -> replaykit::Result<Box<dyn Locator>> {
/// #         unimplemented!()
/// #     }
/// # }
///
/// # async fn demo() -> replaykit::Result<()> {
/// let runtime = ScriptRuntime::new(
///     Arc::new(PageBackend),
///     Arc::new(ReqwestTransport::new()),
///     Arc::new(MemoryStorage::new()),
/// );
///
/// // ... navigate the page, forwarding its network events ...
///
/// runtime.settle().await;
/// let element = runtime
///     .resolve(&[
///         LocatorSpec::css("#submit-btn"),
///         LocatorSpec::role("button", Some("Submit".into())),
///     ])
///     .await?;
/// println!("clicking {}", element.handle.id());
/// # Ok(())
/// # }
/// ```
pub struct ScriptRuntime {
    config: ReplayConfig,
    monitor: IdleMonitor,
    resolver: LocatorResolver,
    executor: HttpRequestExecutor,
    reconciler: FactReconciler,
}

impl ScriptRuntime {
    /// Create a runtime with default timings
    pub fn new(
        factory: Arc<dyn LocatorFactory>,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn StorageAccessor>,
    ) -> Self {
        Self::with_config(ReplayConfig::default(), factory, transport, storage)
    }

    /// Create a runtime with explicit timings
    pub fn with_config(
        config: ReplayConfig,
        factory: Arc<dyn LocatorFactory>,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn StorageAccessor>,
    ) -> Self {
        let monitor = IdleMonitor::from_config(&config);
        let resolver = LocatorResolver::new(factory)
            .with_candidate_wait(Duration::from_millis(config.candidate_wait_ms));
        let executor = HttpRequestExecutor::new(transport, storage);
        Self {
            config,
            monitor,
            resolver,
            executor,
            reconciler: FactReconciler::new(),
        }
    }

    /// Swap in a reconciler for a differently-named fact
    pub fn with_reconciler(mut self, reconciler: FactReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    // ===== Network settling =====

    /// Feed one page network event into the idle monitor.
    /// Scripts forward these from their page backend's event stream.
    pub fn observe(&self, event: &NetworkEvent) {
        self.monitor.observe(event);
    }

    /// Reset pending-request state after navigating to a new page
    pub fn attach_page(&self) {
        self.monitor.attach();
    }

    /// Let the page settle before the next step, using configured budgets
    pub async fn settle(&self) {
        self.monitor
            .wait_for_idle(self.config.idle_timeout_ms, self.config.idle_window_ms)
            .await;
    }

    /// Settle with explicit budgets for one slow step
    pub async fn settle_with(&self, timeout_ms: u64, idle_window_ms: u64) {
        self.monitor.wait_for_idle(timeout_ms, idle_window_ms).await;
    }

    /// The idle monitor, for wiring into page event plumbing
    pub fn monitor(&self) -> &IdleMonitor {
        &self.monitor
    }

    // ===== Element resolution =====

    /// Resolve a recorded candidate list to one live element
    pub async fn resolve(&self, candidates: &[LocatorSpec]) -> Result<ResolvedElement> {
        self.resolver.resolve(candidates).await
    }

    // ===== Recorded requests =====

    /// Execute one recorded request through the transport
    pub async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse> {
        self.executor.execute(spec).await
    }

    // ===== Fact verification =====

    /// Verify one cross-source fact
    pub fn verify(&self, sources: &FactSources) -> bool {
        self.reconciler.verify(sources)
    }

    /// Verify from captured JSON containers
    pub fn verify_json(
        &self,
        ui_fragments: &Value,
        db_row_sets: &Value,
        api_payloads: &Value,
    ) -> Result<bool> {
        self.reconciler
            .verify_json(ui_fragments, db_row_sets, api_payloads)
    }
}
