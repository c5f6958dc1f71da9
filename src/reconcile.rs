//! Cross-source fact reconciliation
//!
//! A verification step asks whether one business number agrees across
//! three independently captured views: the rendered UI, a database query
//! and an API payload. The check is a first-class replay outcome, so a
//! disagreement (or a value missing from any source) is a normal `false`,
//! never an error. Errors are reserved for captures whose shape is wrong,
//! which means the recording itself is broken.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Independently captured observations of one fact.
///
/// `ui_fragments` are raw markup snippets, `db_row_sets` are query results
/// (each a list of row objects), `api_payloads` are response documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactSources {
    #[serde(default)]
    pub ui_fragments: Vec<String>,
    #[serde(default)]
    pub db_row_sets: Vec<Vec<Value>>,
    #[serde(default)]
    pub api_payloads: Vec<Value>,
}

impl FactSources {
    /// Parse captured sources from a JSON document.
    ///
    /// Missing sections default to empty (the check then fails normally);
    /// sections with the wrong container shape are an invalid-input error.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::invalid_input(format!("malformed fact sources: {}", e)))
    }
}

/// Compares one integer fact across UI, database and API captures.
///
/// The default reconciler checks a project count: a `stat-number` marker
/// in the UI, a `count` field in the first database row, and a
/// `total_projects` field in the API payload.
#[derive(Debug, Clone)]
pub struct FactReconciler {
    ui_marker: String,
    db_field: String,
    api_field: String,
}

impl Default for FactReconciler {
    fn default() -> Self {
        Self {
            ui_marker: "stat-number".to_string(),
            db_field: "count".to_string(),
            api_field: "total_projects".to_string(),
        }
    }
}

impl FactReconciler {
    /// Create the default project-count reconciler
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reconciler for a differently-named fact
    pub fn with_fields(
        ui_marker: impl Into<String>,
        db_field: impl Into<String>,
        api_field: impl Into<String>,
    ) -> Self {
        Self {
            ui_marker: ui_marker.into(),
            db_field: db_field.into(),
            api_field: api_field.into(),
        }
    }

    /// True iff the same integer was extracted from all three sources.
    ///
    /// Any source where the marker or field is missing, or where the value
    /// does not parse as an integer, makes the whole check `false`.
    pub fn verify(&self, sources: &FactSources) -> bool {
        let ui = self.ui_value(&sources.ui_fragments);
        let db = self.db_value(&sources.db_row_sets);
        let api = self.api_value(&sources.api_payloads);

        debug!("Reconciling ui={:?} db={:?} api={:?}", ui, db, api);

        let agreed = match (ui, db, api) {
            (Some(ui), Some(db), Some(api)) => ui == db && db == api,
            _ => false,
        };
        if !agreed {
            info!(
                "Fact check failed for marker \"{}\": ui={:?} db={:?} api={:?}",
                self.ui_marker, ui, db, api
            );
        }
        agreed
    }

    /// Script-facing variant taking the captured JSON containers directly.
    /// Containers that are not arrays are an invalid-input error.
    pub fn verify_json(
        &self,
        ui_fragments: &Value,
        db_row_sets: &Value,
        api_payloads: &Value,
    ) -> Result<bool> {
        let sources = FactSources::from_value(serde_json::json!({
            "uiFragments": ui_fragments,
            "dbRowSets": db_row_sets,
            "apiPayloads": api_payloads,
        }))?;
        Ok(self.verify(&sources))
    }

    /// First fragment containing the marker, tags stripped, leading integer
    fn ui_value(&self, fragments: &[String]) -> Option<i64> {
        let fragment = fragments.iter().find(|f| f.contains(&self.ui_marker))?;
        parse_leading_int(&strip_tags(fragment))
    }

    /// Field from the first row of the first row-set that exposes it
    fn db_value(&self, row_sets: &[Vec<Value>]) -> Option<i64> {
        let field = row_sets
            .iter()
            .find_map(|rows| rows.first()?.get(self.db_field.as_str()))?;
        parse_int_value(field)
    }

    /// Field from the first payload that exposes it
    fn api_value(&self, payloads: &[Value]) -> Option<i64> {
        let field = payloads
            .iter()
            .find_map(|payload| payload.get(self.api_field.as_str()))?;
        parse_int_value(field)
    }
}

/// Remove markup tags, keeping text content
fn strip_tags(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

/// Leading base-10 integer: skip leading whitespace, take an optional
/// sign and then digits. `None` when no digits follow.
fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok().map(|n| sign * n)
}

/// Integer from a JSON value: numbers truncate toward zero, strings go
/// through the leading-integer parse, everything else is no value.
fn parse_int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sources(ui: &str, db_count: Value, api_total: Value) -> FactSources {
        FactSources {
            ui_fragments: vec![ui.to_string()],
            db_row_sets: vec![vec![json!({ "count": db_count })]],
            api_payloads: vec![json!({ "total_projects": api_total })],
        }
    }

    #[test]
    fn agreeing_sources_verify() {
        let sources = sources(
            r#"<span class="stat-number">5</span>"#,
            json!(5),
            json!(5),
        );
        assert!(FactReconciler::new().verify(&sources));
    }

    #[test]
    fn one_disagreeing_source_fails() {
        let sources = sources(
            r#"<span class="stat-number">5</span>"#,
            json!(5),
            json!(6),
        );
        assert!(!FactReconciler::new().verify(&sources));
    }

    #[test]
    fn string_counts_parse_like_numbers() {
        let sources = sources(r#"<b class="stat-number">12</b>"#, json!("12"), json!(12));
        assert!(FactReconciler::new().verify(&sources));
    }

    #[test]
    fn ui_number_with_trailing_text_still_parses() {
        // parse stops at the first non-digit, like the recorders' runtime
        let sources = sources(
            r#"<span class="stat-number">5 projects</span>"#,
            json!(5),
            json!(5),
        );
        assert!(FactReconciler::new().verify(&sources));
    }

    #[test]
    fn missing_ui_marker_fails_normally() {
        let sources = sources(r#"<span class="headline">5</span>"#, json!(5), json!(5));
        assert!(!FactReconciler::new().verify(&sources));
    }

    #[test]
    fn unparseable_ui_text_fails_normally() {
        let sources = sources(
            r#"<span class="stat-number">five</span>"#,
            json!(5),
            json!(5),
        );
        assert!(!FactReconciler::new().verify(&sources));
    }

    #[test]
    fn empty_sources_fail_normally() {
        assert!(!FactReconciler::new().verify(&FactSources::default()));
    }

    #[test]
    fn db_lookup_skips_row_sets_without_the_field() {
        let sources = FactSources {
            ui_fragments: vec![r#"<i class="stat-number">3</i>"#.to_string()],
            db_row_sets: vec![
                vec![],
                vec![json!({ "id": 7 })],
                vec![json!({ "count": 3, "id": 7 })],
            ],
            api_payloads: vec![json!({ "total_projects": 3 })],
        };
        assert!(FactReconciler::new().verify(&sources));
    }

    #[test]
    fn api_lookup_skips_payloads_without_the_field() {
        let sources = FactSources {
            ui_fragments: vec![r#"<i class="stat-number">3</i>"#.to_string()],
            db_row_sets: vec![vec![json!({ "count": 3 })]],
            api_payloads: vec![json!({ "status": "ok" }), json!({ "total_projects": 3 })],
        };
        assert!(FactReconciler::new().verify(&sources));
    }

    #[test]
    fn fractional_counts_truncate() {
        let sources = sources(r#"<span class="stat-number">5</span>"#, json!(5.9), json!(5));
        assert!(FactReconciler::new().verify(&sources));
    }

    #[test]
    fn negative_counts_compare_exactly() {
        let sources = sources(
            r#"<span class="stat-number">-2</span>"#,
            json!(-2),
            json!(-2),
        );
        assert!(FactReconciler::new().verify(&sources));
    }

    #[test]
    fn boolean_count_is_no_value() {
        let sources = sources(r#"<span class="stat-number">1</span>"#, json!(true), json!(1));
        assert!(!FactReconciler::new().verify(&sources));
    }

    #[test]
    fn nested_markup_strips_to_inner_text() {
        assert_eq!(
            strip_tags(r#"<div class="stat-number"><strong>42</strong> total</div>"#),
            "42 total"
        );
    }

    #[test]
    fn leading_int_parse_matches_recorder_runtime() {
        assert_eq!(parse_leading_int("  42 items"), Some(42));
        assert_eq!(parse_leading_int("-7"), Some(-7));
        assert_eq!(parse_leading_int("+9"), Some(9));
        assert_eq!(parse_leading_int("items 42"), None);
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("-"), None);
    }

    #[test]
    fn custom_fields_reconcile_other_facts() {
        let reconciler = FactReconciler::with_fields("user-total", "n", "total_users");
        let sources = FactSources {
            ui_fragments: vec![r#"<span class="user-total">9</span>"#.to_string()],
            db_row_sets: vec![vec![json!({ "n": 9 })]],
            api_payloads: vec![json!({ "total_users": 9 })],
        };
        assert!(reconciler.verify(&sources));
    }

    #[test]
    fn verify_json_accepts_array_containers() {
        let reconciler = FactReconciler::new();
        let verified = reconciler
            .verify_json(
                &json!([r#"<span class="stat-number">5</span>"#]),
                &json!([[{ "count": 5 }]]),
                &json!([{ "total_projects": 5 }]),
            )
            .unwrap();
        assert!(verified);
    }

    #[test]
    fn verify_json_rejects_non_array_containers() {
        let reconciler = FactReconciler::new();
        let result = reconciler.verify_json(
            &json!("not an array"),
            &json!([[{ "count": 5 }]]),
            &json!([{ "total_projects": 5 }]),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn from_value_defaults_missing_sections() {
        let sources = FactSources::from_value(json!({})).unwrap();
        assert!(sources.ui_fragments.is_empty());
        assert!(!FactReconciler::new().verify(&sources));
    }
}
