//! Integration tests for replaykit
//!
//! These run the full replay flow against in-memory collaborators: a fake
//! page backend for locators, a canned transport for requests and seeded
//! storage for credentials. No browser or network is required.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use replaykit::{
    ElementHandle, Error, FactReconciler, FactSources, HttpTransport, Locator, LocatorFactory,
    LocatorSpec, MemoryStorage, NetworkEvent, ReplayConfig, RequestSpec, ResourceType, Result,
    ScriptRuntime, StorageKind, TransportRequest, TransportResponse,
};

// ===== Fake page backend =====

#[derive(Clone, Copy)]
struct FakeElement {
    appears_after: Duration,
    matches: usize,
}

/// In-memory page: descriptors map to elements that may appear late
struct FakePage {
    opened_at: Instant,
    elements: HashMap<String, FakeElement>,
}

impl FakePage {
    fn new() -> Self {
        Self {
            opened_at: Instant::now(),
            elements: HashMap::new(),
        }
    }

    fn with_element(self, spec: &LocatorSpec, matches: usize) -> Self {
        self.with_delayed_element(spec, Duration::ZERO, matches)
    }

    fn with_delayed_element(
        mut self,
        spec: &LocatorSpec,
        appears_after: Duration,
        matches: usize,
    ) -> Self {
        self.elements.insert(
            spec.to_string(),
            FakeElement {
                appears_after,
                matches,
            },
        );
        self
    }
}

struct FakePageLocator {
    name: String,
    opened_at: Instant,
    element: Option<FakeElement>,
}

#[async_trait]
impl Locator for FakePageLocator {
    async fn wait_attached(&self, timeout: Duration) -> Result<()> {
        match self.element {
            Some(element) => {
                let remaining = element.appears_after.saturating_sub(self.opened_at.elapsed());
                if remaining <= timeout {
                    tokio::time::sleep(remaining).await;
                    Ok(())
                } else {
                    tokio::time::sleep(timeout).await;
                    Err(Error::backend(format!("{}: attach timed out", self.name)))
                }
            }
            None => {
                tokio::time::sleep(timeout).await;
                Err(Error::backend(format!("{}: attach timed out", self.name)))
            }
        }
    }

    async fn count(&self) -> Result<usize> {
        Ok(self
            .element
            .filter(|e| self.opened_at.elapsed() >= e.appears_after)
            .map(|e| e.matches)
            .unwrap_or(0))
    }

    async fn first(&self) -> Result<ElementHandle> {
        if self.count().await? == 0 {
            Err(Error::backend(format!("{}: no match", self.name)))
        } else {
            Ok(ElementHandle::new(format!("{}#0", self.name)))
        }
    }
}

impl LocatorFactory for FakePage {
    fn locator(&self, spec: &LocatorSpec) -> Result<Box<dyn Locator>> {
        let name = spec.to_string();
        Ok(Box::new(FakePageLocator {
            element: self.elements.get(&name).copied(),
            name,
            opened_at: self.opened_at,
        }))
    }
}

// ===== Canned transport =====

/// Transport replying with a fixed JSON body, recording what it was sent
struct CannedTransport {
    last: Mutex<Option<TransportRequest>>,
    body: String,
}

impl CannedTransport {
    fn replying(body: &str) -> Arc<Self> {
        Arc::new(Self {
            last: Mutex::new(None),
            body: body.to_string(),
        })
    }

    fn seen(&self) -> TransportRequest {
        self.last
            .lock()
            .unwrap()
            .clone()
            .expect("transport was never called")
    }
}

#[async_trait]
impl HttpTransport for CannedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        *self.last.lock().unwrap() = Some(request);
        Ok(TransportResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body_text: self.body.clone(),
        })
    }
}

fn runtime_with(page: FakePage, transport: Arc<CannedTransport>) -> ScriptRuntime {
    let storage = MemoryStorage::new().with(StorageKind::LocalStorage, "auth_token", "t0ken");
    ScriptRuntime::with_config(
        ReplayConfig::snappy(),
        Arc::new(page),
        transport,
        Arc::new(storage),
    )
}

// ===== Tests =====

#[tokio::test]
async fn full_replay_step_settles_resolves_executes_and_verifies() {
    let link = LocatorSpec::css("#dashboard-link");
    let page = FakePage::new().with_element(&link, 1);
    let transport = CannedTransport::replying(r#"{"total_projects": 5}"#);
    let runtime = runtime_with(page, transport.clone());

    // The page fires one data fetch on load
    runtime.observe(&NetworkEvent::RequestStarted {
        resource_type: ResourceType::Fetch,
    });
    runtime.observe(&NetworkEvent::RequestFinished {
        resource_type: ResourceType::Fetch,
    });
    runtime.settle().await;
    assert_eq!(runtime.monitor().pending(), 0);

    // Resolve the recorded click target
    let element = runtime
        .resolve(&[link.clone(), LocatorSpec::text("Dashboard")])
        .await
        .expect("element should resolve");
    assert_eq!(element.match_count, 1);
    assert_eq!(element.handle.id(), format!("{}#0", link));

    // Fire the recorded stats request with a storage-resolved token
    let mut spec = RequestSpec::new("GET", "https://app.test/api/stats");
    spec.auth = serde_json::from_value(json!({
        "type": "bearer",
        "sources": [{"storage": "localStorage", "key": "auth_token"}]
    }))
    .expect("auth spec should parse");

    let response = runtime.execute(&spec).await.expect("request should succeed");
    assert!(response.is_success());

    let seen = transport.seen();
    assert!(seen
        .headers
        .iter()
        .any(|(name, value)| name == "Authorization" && value == "Bearer t0ken"));

    // The number in the response must agree with the UI and the database
    let api_payload = response.body.as_json().expect("body should be JSON").clone();
    let sources = FactSources {
        ui_fragments: vec![r#"<span class="stat-number">5</span>"#.to_string()],
        db_row_sets: vec![vec![json!({"count": 5})]],
        api_payloads: vec![api_payload],
    };
    assert!(runtime.verify(&sources));
}

#[tokio::test]
async fn late_element_resolves_once_it_attaches() {
    let panel = LocatorSpec::css("#stats-panel");
    let page = FakePage::new().with_delayed_element(&panel, Duration::from_millis(80), 1);
    let runtime = runtime_with(page, CannedTransport::replying("{}"));

    let started = Instant::now();
    let element = runtime
        .resolve(&[panel.clone()])
        .await
        .expect("element should resolve after appearing");

    assert_eq!(element.handle.id(), format!("{}#0", panel));
    // Resolved after the element appeared, well before the candidate wait
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert!(started.elapsed() < Duration::from_millis(1_000));
}

#[tokio::test]
async fn missing_element_fails_not_found_within_the_candidate_wait() {
    let page = FakePage::new();
    let runtime = runtime_with(page, CannedTransport::replying("{}"));

    let started = Instant::now();
    let result = runtime
        .resolve(&[LocatorSpec::css("#gone"), LocatorSpec::xpath("//a[9]")])
        .await;

    match result {
        Err(Error::NotFound(_)) => {}
        other => panic!("expected NotFound, got {:?}", other.map(|r| r.handle)),
    }
    // Candidates waited concurrently: one snappy candidate-wait, not two
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_millis(2_000));
}

#[tokio::test]
async fn ambiguous_page_falls_back_to_least_ambiguous_candidate() {
    let broad = LocatorSpec::css(".card");
    let narrow = LocatorSpec::css(".card.active");
    let page = FakePage::new()
        .with_element(&broad, 6)
        .with_element(&narrow, 2);
    let runtime = runtime_with(page, CannedTransport::replying("{}"));

    let element = runtime
        .resolve(&[broad, narrow.clone()])
        .await
        .expect("fallback should pick something");

    assert_eq!(element.match_count, 2);
    assert_eq!(element.handle.id(), format!("{}#0", narrow));
}

#[tokio::test]
async fn settle_times_out_while_a_request_hangs() {
    let page = FakePage::new();
    let runtime = runtime_with(page, CannedTransport::replying("{}"));

    // A fetch that never finishes
    runtime.observe(&NetworkEvent::RequestStarted {
        resource_type: ResourceType::Fetch,
    });

    let started = Instant::now();
    runtime.settle_with(150, 5_000).await;

    // Fail-open: came back near the timeout with the request still pending
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(started.elapsed() < Duration::from_millis(2_000));
    assert_eq!(runtime.monitor().pending(), 1);

    // A fresh page attach clears the stuck counter
    runtime.attach_page();
    assert_eq!(runtime.monitor().pending(), 0);

    let started = Instant::now();
    runtime.settle_with(5_000, 30).await;
    assert!(started.elapsed() < Duration::from_millis(1_000));
}

#[tokio::test]
async fn asset_traffic_does_not_delay_settling() {
    let page = FakePage::new();
    let runtime = runtime_with(page, CannedTransport::replying("{}"));

    // Stylesheets and images are not counted
    runtime.observe(&NetworkEvent::RequestStarted {
        resource_type: ResourceType::Stylesheet,
    });
    runtime.observe(&NetworkEvent::RequestStarted {
        resource_type: ResourceType::Image,
    });

    let started = Instant::now();
    runtime.settle_with(5_000, 30).await;
    assert!(started.elapsed() < Duration::from_millis(1_000));
}

#[tokio::test]
async fn verify_json_flags_malformed_captures_as_recording_defects() {
    let page = FakePage::new();
    let runtime = runtime_with(page, CannedTransport::replying("{}"));

    let err = runtime
        .verify_json(
            &json!({"not": "an array"}),
            &json!([[{"count": 2}]]),
            &json!([{"total_projects": 2}]),
        )
        .expect_err("object container should be rejected");

    assert!(err.is_recording_defect());
}

#[tokio::test]
async fn custom_reconciler_rides_along_in_the_runtime() {
    let page = FakePage::new();
    let runtime = runtime_with(page, CannedTransport::replying("{}"))
        .with_reconciler(FactReconciler::with_fields("order-count", "n", "orders"));

    let sources = FactSources {
        ui_fragments: vec![r#"<em class="order-count">3</em>"#.to_string()],
        db_row_sets: vec![vec![json!({"n": "3"})]],
        api_payloads: vec![json!({"orders": 3})],
    };
    assert!(runtime.verify(&sources));
}

#[tokio::test]
async fn recorded_step_replays_from_its_json_form() {
    // A step exactly as a recorder would emit it
    let recorded = json!({
        "method": "POST",
        "url": "https://app.test/api/projects?source=replay",
        "params": [{"key": "notify", "value": "false"}],
        "headers": [{"key": "x-run", "value": "42"}],
        "auth": {"type": "bearer", "sources": [
            {"storage": "localStorage", "key": "auth_token"}
        ]},
        "body": {"type": "form", "fields": [
            {"name": "title", "value": "Shoreline"},
            {"name": "priority", "value": 2}
        ]}
    });
    let spec: RequestSpec = serde_json::from_value(recorded).expect("recorded step should parse");

    let page = FakePage::new();
    let transport = CannedTransport::replying(r#"{"id": 99}"#);
    let runtime = runtime_with(page, transport.clone());

    let response = runtime.execute(&spec).await.expect("request should succeed");
    assert_eq!(
        response.body.as_json().and_then(|v| v["id"].as_i64()),
        Some(99)
    );

    let seen = transport.seen();
    assert_eq!(seen.method, "POST");
    // Existing query string extended, not replaced
    assert_eq!(
        seen.url,
        "https://app.test/api/projects?source=replay&notify=false"
    );
    assert!(seen
        .headers
        .iter()
        .any(|(name, value)| name == "Authorization" && value == "Bearer t0ken"));
    assert!(seen
        .headers
        .iter()
        .any(|(name, value)| name == "x-run" && value == "42"));
}
