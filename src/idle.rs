//! Network-idle detection
//!
//! A replayed step must not start while the page is still loading data the
//! step depends on. The recorder cannot know how long that takes on the
//! machine running the replay, so the generated script counts in-flight
//! xhr/fetch requests and waits for the counter to stay at zero for a
//! continuous window before moving on.
//!
//! The wait is deliberately fail-open: when the page never settles inside
//! the timeout budget, the script proceeds anyway and lets the next step
//! succeed or fail on its own terms. A chat widget polling every 200ms
//! should slow a replay down, not kill it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::ReplayConfig;

/// Default poll interval for the idle loop
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default total budget for one idle wait
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

/// Default continuous quiet window required before a wait completes
pub const DEFAULT_IDLE_WINDOW_MS: u64 = 500;

// ===== Resource classification =====

/// Resource-type label carried by page network events.
///
/// Mirrors the labels browsers attach to request lifecycle notifications.
/// Only [`Xhr`](ResourceType::Xhr) and [`Fetch`](ResourceType::Fetch)
/// count toward the pending total: document, asset and websocket traffic
/// does not gate step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Xhr,
    Fetch,
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    Websocket,
    Other,
}

impl ResourceType {
    /// Parse a protocol-level label ("XHR", "Fetch", "Document", ...).
    /// Unknown labels map to [`ResourceType::Other`].
    pub fn from_protocol_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "xhr" => ResourceType::Xhr,
            "fetch" => ResourceType::Fetch,
            "document" => ResourceType::Document,
            "stylesheet" => ResourceType::Stylesheet,
            "script" => ResourceType::Script,
            "image" => ResourceType::Image,
            "font" => ResourceType::Font,
            "websocket" => ResourceType::Websocket,
            _ => ResourceType::Other,
        }
    }

    /// Whether requests of this type count toward the pending total
    pub fn is_counted(&self) -> bool {
        matches!(self, ResourceType::Xhr | ResourceType::Fetch)
    }
}

/// One page network lifecycle notification.
///
/// The generated script forwards these from whatever event source its page
/// backend exposes; the monitor only cares about the lifecycle kind and the
/// resource type.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    RequestStarted { resource_type: ResourceType },
    RequestFinished { resource_type: ResourceType },
    RequestFailed { resource_type: ResourceType },
}

impl NetworkEvent {
    /// Resource type carried by the event
    pub fn resource_type(&self) -> ResourceType {
        match self {
            NetworkEvent::RequestStarted { resource_type }
            | NetworkEvent::RequestFinished { resource_type }
            | NetworkEvent::RequestFailed { resource_type } => *resource_type,
        }
    }
}

// ===== Pending counter =====

/// Count of in-flight counted requests for one page.
///
/// Atomic because event callbacks and the idle poll loop may run on
/// different runtime threads. The count floors at zero: a finish event
/// without a matching start (response replay, double notification) must
/// not poison every later idle wait with a phantom pending request.
#[derive(Debug, Default)]
pub struct RequestCounter {
    pending: AtomicU64,
}

impl RequestCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self {
            pending: AtomicU64::new(0),
        }
    }

    /// Record a request start
    pub fn increment(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a request finish or failure. Saturates at zero.
    pub fn decrement(&self) {
        // checked_sub makes the unmatched-finish case a no-op
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Number of requests currently in flight
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Reset to zero, for reuse across page navigations
    pub fn reset(&self) {
        self.pending.store(0, Ordering::SeqCst);
    }
}

// ===== Idle monitor =====

/// Watches one page's request traffic and answers "has the network been
/// quiet long enough to run the next step?".
///
/// # Example
///
/// ```rust
/// use replaykit::{IdleMonitor, NetworkEvent, ResourceType};
///
/// # async fn demo() {
/// let monitor = IdleMonitor::new();
///
/// // The page backend forwards lifecycle events as they happen
/// monitor.observe(&NetworkEvent::RequestStarted {
///     resource_type: ResourceType::Fetch,
/// });
/// monitor.observe(&NetworkEvent::RequestFinished {
///     resource_type: ResourceType::Fetch,
/// });
///
/// // Proceed once nothing has been in flight for 500ms, or after 30s
/// monitor.wait_for_idle(30_000, 500).await;
/// # }
/// ```
#[derive(Debug)]
pub struct IdleMonitor {
    counter: RequestCounter,
    poll_interval: Duration,
}

impl Default for IdleMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleMonitor {
    /// Create a monitor with the default 100ms poll interval
    pub fn new() -> Self {
        Self::with_poll_interval(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Create a monitor with a custom poll interval
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            counter: RequestCounter::new(),
            poll_interval,
        }
    }

    /// Create a monitor using the configured poll interval
    pub fn from_config(config: &ReplayConfig) -> Self {
        Self::with_poll_interval(Duration::from_millis(config.poll_interval_ms))
    }

    /// Route one lifecycle event into the pending counter.
    ///
    /// Events whose resource type is not counted are ignored entirely, so
    /// stylesheet or image loads never hold a step back.
    pub fn observe(&self, event: &NetworkEvent) {
        if !event.resource_type().is_counted() {
            return;
        }
        match event {
            NetworkEvent::RequestStarted { .. } => self.counter.increment(),
            NetworkEvent::RequestFinished { .. } | NetworkEvent::RequestFailed { .. } => {
                self.counter.decrement()
            }
        }
        trace!("Pending requests: {}", self.counter.pending());
    }

    /// Reset pending state after the script navigates to a new page
    pub fn attach(&self) {
        self.counter.reset();
    }

    /// Number of counted requests currently in flight
    pub fn pending(&self) -> u64 {
        self.counter.pending()
    }

    /// [`wait_for_idle`](IdleMonitor::wait_for_idle) with the default 30s
    /// budget and 500ms window
    pub async fn wait_for_idle_default(&self) {
        self.wait_for_idle(DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_IDLE_WINDOW_MS)
            .await;
    }

    /// Wait until the page has been network-idle for a continuous
    /// `idle_window_ms`, or until `timeout_ms` elapses, whichever is first.
    ///
    /// Returns normally in both cases. The idle window restarts from zero
    /// whenever a counted request starts mid-wait; already-elapsed quiet
    /// time does not carry across activity.
    pub async fn wait_for_idle(&self, timeout_ms: u64, idle_window_ms: u64) {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let idle_window = Duration::from_millis(idle_window_ms);

        let mut idle_since: Option<Instant> = None;

        loop {
            if self.counter.pending() == 0 {
                let since = *idle_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= idle_window {
                    debug!(
                        "Network idle after {}ms (window {}ms)",
                        start.elapsed().as_millis(),
                        idle_window_ms
                    );
                    return;
                }
            } else {
                idle_since = None;
            }

            if start.elapsed() > timeout {
                debug!(
                    "Network still busy after {}ms, proceeding anyway ({} pending)",
                    timeout_ms,
                    self.counter.pending()
                );
                return;
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
