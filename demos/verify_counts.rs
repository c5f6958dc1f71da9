//! Fact reconciliation walkthrough
//!
//! Runs entirely offline. Shows the three-source count check a generated
//! script performs at the end of a run, including how disagreement and
//! malformed captures differ. Run with: cargo run --example verify_counts

use replaykit::{FactReconciler, FactSources};
use serde_json::json;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("replaykit=debug".parse().unwrap()),
        )
        .init();

    println!("=== Replaykit Fact Check Demo ===\n");

    let reconciler = FactReconciler::new();

    // All three captures agree on 5 projects
    let agreeing = FactSources {
        ui_fragments: vec![r#"<span class="stat-number">5</span>"#.to_string()],
        db_row_sets: vec![vec![json!({"count": 5})]],
        api_payloads: vec![json!({"total_projects": 5, "status": "ok"})],
    };
    println!("all sources agree:      {}", outcome(reconciler.verify(&agreeing)));

    // The API still reports the old count
    let stale_api = FactSources {
        api_payloads: vec![json!({"total_projects": 4, "status": "ok"})],
        ..agreeing.clone()
    };
    println!("api is one behind:      {}", outcome(reconciler.verify(&stale_api)));

    // Database drivers often hand counts back as strings; that still agrees
    let stringly = FactSources {
        db_row_sets: vec![vec![json!({"count": "5"})]],
        ..agreeing.clone()
    };
    println!("db count is a string:   {}", outcome(reconciler.verify(&stringly)));

    // A capture that is not even the right shape is a recording defect,
    // reported as an error instead of a quiet false
    let malformed = reconciler.verify_json(
        &json!("<span class=\"stat-number\">5</span>"),
        &json!([[{"count": 5}]]),
        &json!([{"total_projects": 5}]),
    );
    match malformed {
        Err(e) => println!("malformed ui capture:   error ({})", e),
        Ok(v) => println!("malformed ui capture:   unexpectedly {}", outcome(v)),
    }

    println!("\n=== Done ===");
}

fn outcome(verified: bool) -> &'static str {
    if verified {
        "PASS"
    } else {
        "FAIL"
    }
}
