//! What a generated replay script looks like when it runs
//!
//! The page backend here is a tiny in-memory stand-in so the demo runs
//! without a browser; the recorded API call goes to httpbin.org and needs
//! network access. Run with: cargo run --example replay_script

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use replaykit::{
    ElementHandle, Error, Locator, LocatorFactory, LocatorSpec, MemoryStorage, NetworkEvent,
    ReplayConfig, ReqwestTransport, RequestSpec, ResourceType, Result, ScriptRuntime, StorageKind,
};

/// Stand-in page: a few elements with fixed match counts
struct DemoPage;

struct DemoLocator {
    name: String,
    matches: usize,
}

#[async_trait]
impl Locator for DemoLocator {
    async fn wait_attached(&self, timeout: Duration) -> Result<()> {
        if self.matches > 0 {
            Ok(())
        } else {
            tokio::time::sleep(timeout).await;
            Err(Error::backend(format!("{}: attach timed out", self.name)))
        }
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.matches)
    }

    async fn first(&self) -> Result<ElementHandle> {
        if self.matches == 0 {
            Err(Error::backend(format!("{}: no match", self.name)))
        } else {
            Ok(ElementHandle::new(format!("{}#0", self.name)))
        }
    }
}

impl LocatorFactory for DemoPage {
    fn locator(&self, spec: &LocatorSpec) -> Result<Box<dyn Locator>> {
        let name = spec.to_string();
        // The id selector from the recording is gone; the role survives
        let matches = match name.as_str() {
            "css:#create-project-btn" => 0,
            "css:.btn-primary" => 3,
            "role:button[name=New Project]" => 1,
            _ => 0,
        };
        Ok(Box::new(DemoLocator { name, matches }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("replaykit=info".parse().unwrap()),
        )
        .init();

    println!("=== Replaykit Script Demo ===\n");

    // In a real script the recorder emits this wiring; storage reflects
    // what the logged-in session holds at replay time
    let storage = MemoryStorage::new().with(StorageKind::LocalStorage, "auth_token", "demo-t0ken");
    let runtime = ScriptRuntime::with_config(
        ReplayConfig::snappy(),
        Arc::new(DemoPage),
        Arc::new(ReqwestTransport::new()),
        Arc::new(storage),
    );

    // Step 1: the dashboard fires a data fetch on load; wait it out
    println!("--- Step 1: settle after navigation ---");
    runtime.observe(&NetworkEvent::RequestStarted {
        resource_type: ResourceType::Fetch,
    });
    runtime.observe(&NetworkEvent::RequestFinished {
        resource_type: ResourceType::Fetch,
    });
    runtime.settle().await;
    println!("network settled, {} pending\n", runtime.monitor().pending());

    // Step 2: resolve the recorded click target from its candidate list
    println!("--- Step 2: resolve the recorded button ---");
    let candidates = vec![
        LocatorSpec::css("#create-project-btn"),
        LocatorSpec::css(".btn-primary"),
        LocatorSpec::role("button", Some("New Project".into())),
    ];
    let element = runtime.resolve(&candidates).await?;
    println!(
        "resolved to {} ({} match{})\n",
        element.handle.id(),
        element.match_count,
        if element.match_count == 1 { "" } else { "es" }
    );

    // Step 3: fire the recorded API call; the bearer token comes out of
    // the session's storage, not the recording
    println!("--- Step 3: execute the recorded request ---");
    let spec: RequestSpec = serde_json::from_str(
        r#"{
            "method": "POST",
            "url": "https://httpbin.org/anything/projects",
            "params": [{"key": "notify", "value": "false"}],
            "auth": {"type": "bearer", "sources": [
                {"storage": "localStorage", "key": "auth_token"}
            ]},
            "body": {"type": "json", "content": {"title": "Demo project"}}
        }"#,
    )?;
    let response = runtime.execute(&spec).await?;
    println!("{} {}", response.status, response.status_text);

    // httpbin echoes the request; show that the resolved token was sent
    if let Some(echo) = response.body.as_json() {
        println!("echoed url:  {}", echo["url"]);
        println!("echoed auth: {}", echo["headers"]["Authorization"]);
    }

    println!("\n=== Done ===");
    Ok(())
}
