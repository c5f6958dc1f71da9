//! Declarative HTTP request execution
//!
//! A recorded API step is one serializable [`RequestSpec`]: method, URL,
//! query params, headers, an auth section and a body section. Executing it
//! builds the final URL and header set, resolves credential references
//! against the live browser's storage, encodes the body, and hands the
//! whole thing to the transport.
//!
//! Credentials are resolved fresh on every call. A recording made against
//! one account replays cleanly against another because the token is read
//! from the current session's storage, never from the recording.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::{StorageAccessor, StorageKind};
use crate::transport::{HttpTransport, RequestPayload, TransportRequest};

// ===== Recorded shapes =====

/// One recorded key/value entry (query param or header)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl KeyValue {
    /// Create an entry
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Entries with a blank key or value are dropped during building
    fn is_blank(&self) -> bool {
        self.key.trim().is_empty() || self.value.trim().is_empty()
    }
}

/// Reference to a credential living in the browser's own storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    pub storage: StorageKind,
    pub key: String,
}

impl CredentialRef {
    /// Create a reference
    pub fn new(storage: StorageKind, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }
}

/// Authentication section of a recorded request.
///
/// Serialized with a `type` tag (`none` / `bearer` / `basic`), matching
/// what recorders emit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthSpec {
    /// No Authorization header
    #[default]
    None,
    /// `Authorization: Bearer <token>`. A literal token wins; otherwise
    /// the first configured source is looked up in browser storage.
    Bearer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sources: Vec<CredentialRef>,
    },
    /// `Authorization: Basic <base64(user:pass)>`. Literal credentials win
    /// when both are present; otherwise both halves are resolved from
    /// storage references.
    #[serde(rename_all = "camelCase")]
    Basic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username_ref: Option<CredentialRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password_ref: Option<CredentialRef>,
    },
}

/// One recorded form entry; values may be any JSON scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: Value,
}

impl FormField {
    /// Create a field
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Body section of a recorded request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BodySpec {
    /// No body
    #[default]
    None,
    /// JSON document sent verbatim
    Json { content: Value },
    /// Urlencoded form
    Form {
        #[serde(default)]
        fields: Vec<FormField>,
    },
}

/// One declarative recorded request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<KeyValue>,
    #[serde(default)]
    pub auth: AuthSpec,
    #[serde(default)]
    pub body: BodySpec,
}

impl RequestSpec {
    /// Create a bare spec; params, headers, auth and body start empty
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
            auth: AuthSpec::None,
            body: BodySpec::None,
        }
    }
}

// ===== Response =====

/// Response body after a best-effort JSON parse
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Body parsed as JSON
    Json(Value),
    /// Body kept as raw text
    Text(String),
}

impl ResponseBody {
    /// Parsed JSON document, when the body was JSON
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    /// Raw text, when the body was not JSON
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Json(_) => None,
            ResponseBody::Text(text) => Some(text),
        }
    }
}

/// Structured outcome of one executed request.
///
/// HTTP error statuses are responses, not errors; scripts inspect
/// `status` themselves.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
}

impl RawResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ===== Executor =====

/// Executes declarative request specs through a transport.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use replaykit::{HttpRequestExecutor, MemoryStorage, ReqwestTransport, RequestSpec};
///
/// # async fn demo() -> replaykit::Result<()> {
/// let executor = HttpRequestExecutor::new(
///     Arc::new(ReqwestTransport::new()),
///     Arc::new(MemoryStorage::new()),
/// );
///
/// let spec: RequestSpec = serde_json::from_str(
///     r#"{
///         "method": "GET",
///         "url": "https://api.example.com/projects",
///         "params": [{"key": "page", "value": "1"}],
///         "auth": {"type": "bearer", "sources": [
///             {"storage": "localStorage", "key": "auth_token"}
///         ]}
///     }"#,
/// )?;
///
/// let response = executor.execute(&spec).await?;
/// println!("{} {}", response.status, response.status_text);
/// # Ok(())
/// # }
/// ```
pub struct HttpRequestExecutor {
    transport: Arc<dyn HttpTransport>,
    storage: Arc<dyn StorageAccessor>,
}

impl HttpRequestExecutor {
    /// Create an executor over a transport and a credential storage
    pub fn new(transport: Arc<dyn HttpTransport>, storage: Arc<dyn StorageAccessor>) -> Self {
        Self { transport, storage }
    }

    /// Build and send one recorded request.
    ///
    /// The response body is JSON-parsed on a best-effort basis; bodies
    /// that do not parse come back as raw text.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse> {
        let url = build_url(&spec.url, &spec.params);

        let mut headers: Vec<(String, String)> = spec
            .headers
            .iter()
            .filter(|header| !header.is_blank())
            .map(|header| (header.key.clone(), header.value.clone()))
            .collect();

        // Auth always wins over a recorded Authorization header; a stale
        // recorded token must never shadow the resolved one.
        if let Some(authorization) = self.authorization_value(&spec.auth).await? {
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
            headers.push(("Authorization".to_string(), authorization));
        }

        let payload = build_payload(&spec.body);

        debug!("Executing {} {}", spec.method, url);
        let raw = self
            .transport
            .send(TransportRequest {
                method: spec.method.clone(),
                url: url.clone(),
                headers,
                payload,
            })
            .await?;
        info!("{} {} -> {}", spec.method, url, raw.status);

        let body = match serde_json::from_str::<Value>(&raw.body_text) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(raw.body_text),
        };

        Ok(RawResponse {
            status: raw.status,
            status_text: raw.status_text,
            headers: raw.headers,
            body,
        })
    }

    /// Compute the Authorization header value, if any.
    ///
    /// Unresolvable credentials omit the header rather than failing the
    /// request: the server's own 401 is a more useful failure than a
    /// local guess.
    async fn authorization_value(&self, auth: &AuthSpec) -> Result<Option<String>> {
        match auth {
            AuthSpec::None => Ok(None),

            AuthSpec::Bearer { token, sources } => {
                if let Some(token) = token.as_deref().filter(|t| !t.trim().is_empty()) {
                    return Ok(Some(format!("Bearer {}", token)));
                }
                match self.resolve_first(sources).await? {
                    Some(token) => Ok(Some(format!("Bearer {}", token))),
                    None => {
                        debug!("Bearer token unresolved, omitting Authorization header");
                        Ok(None)
                    }
                }
            }

            AuthSpec::Basic {
                username,
                password,
                username_ref,
                password_ref,
            } => {
                let literal_user = username.as_deref().filter(|u| !u.trim().is_empty());
                let literal_pass = password.as_deref().filter(|p| !p.trim().is_empty());

                let pair = match (literal_user, literal_pass) {
                    (Some(user), Some(pass)) => Some((user.to_string(), pass.to_string())),
                    _ => {
                        let user = self.resolve_ref(username_ref.as_ref()).await?;
                        let pass = self.resolve_ref(password_ref.as_ref()).await?;
                        user.zip(pass)
                    }
                };

                match pair {
                    Some((user, pass)) => {
                        use base64::Engine;
                        let encoded = base64::engine::general_purpose::STANDARD
                            .encode(format!("{}:{}", user, pass));
                        Ok(Some(format!("Basic {}", encoded)))
                    }
                    None => {
                        debug!("Basic credentials unresolved, omitting Authorization header");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Resolve the first configured source. A miss on that source does not
    /// fall through to later ones: the recorder lists where the token
    /// lives, not a search path.
    async fn resolve_first(&self, sources: &[CredentialRef]) -> Result<Option<String>> {
        let Some(source) = sources.iter().find(|s| !s.key.trim().is_empty()) else {
            return Ok(None);
        };
        let value = self.storage.get(source.storage, &source.key).await?;
        if value.is_none() {
            debug!("No {} entry for \"{}\"", source.storage.name(), source.key);
        }
        Ok(value.filter(|v| !v.trim().is_empty()))
    }

    /// Resolve one optional credential reference
    async fn resolve_ref(&self, source: Option<&CredentialRef>) -> Result<Option<String>> {
        let Some(source) = source.filter(|s| !s.key.trim().is_empty()) else {
            return Ok(None);
        };
        let value = self.storage.get(source.storage, &source.key).await?;
        Ok(value.filter(|v| !v.trim().is_empty()))
    }
}

// ===== Building blocks =====

/// Append non-blank params to the base URL, extending any query string the
/// recording already carries.
fn build_url(base: &str, params: &[KeyValue]) -> String {
    use url::form_urlencoded;

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    let mut appended = false;
    for param in params.iter().filter(|p| !p.is_blank()) {
        serializer.append_pair(&param.key, &param.value);
        appended = true;
    }
    if !appended {
        return base.to_string();
    }

    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, serializer.finish())
}

/// Reduce the recorded body section to its wire-ready payload
fn build_payload(body: &BodySpec) -> RequestPayload {
    match body {
        BodySpec::None => RequestPayload::Empty,
        BodySpec::Json { content } => RequestPayload::Json(content.clone()),
        BodySpec::Form { fields } => {
            // Object semantics: first appearance fixes the position, a
            // later duplicate name overwrites the value.
            let mut flattened: Vec<(String, String)> = Vec::with_capacity(fields.len());
            for field in fields.iter().filter(|f| !f.name.trim().is_empty()) {
                let value = coerce_to_string(&field.value);
                if let Some(existing) = flattened.iter_mut().find(|(name, _)| *name == field.name)
                {
                    existing.1 = value;
                } else {
                    flattened.push((field.name.clone(), value));
                }
            }
            RequestPayload::Form(flattened)
        }
    }
}

/// Flatten a recorded form value to the string the wire format needs.
/// Strings pass through unquoted; everything else renders as JSON text.
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
