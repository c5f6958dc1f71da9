//! Candidate locator resolution
//!
//! A recorded interaction rarely survives replay with a single selector:
//! ids churn, classes get renamed, text moves. The recorder therefore
//! stores several ranked descriptors for the same logical element, and
//! this module picks the best live match among them at replay time.
//!
//! Resolution is deliberately forgiving about individual candidates (a
//! selector that errors or times out is just skipped) and strict about
//! the overall outcome: an empty or malformed candidate list is a defect
//! in the recording, and zero live matches across all candidates is a
//! hard failure of the step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default per-candidate attach wait during resolution
pub const DEFAULT_CANDIDATE_WAIT_MS: u64 = 3_000;

/// Stack-allocated storage for typical candidate lists
type CandidateVec<T> = SmallVec<[T; 4]>;

// ===== Descriptors =====

/// Structured locator descriptor recorded for one candidate.
///
/// Descriptors are plain data. Evaluation happens behind a
/// [`LocatorFactory`] that dispatches on the variant; recorded strings are
/// never executed as code.
///
/// The serialized form matches what recorders emit:
///
/// ```json
/// {"kind": "css", "args": "#submit-btn"}
/// {"kind": "role", "args": {"role": "button", "name": "Submit"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "lowercase")]
pub enum LocatorSpec {
    /// CSS selector
    Css(String),
    /// XPath expression
    XPath(String),
    /// Visible text content
    Text(String),
    /// ARIA role, optionally narrowed by accessible name
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl LocatorSpec {
    /// Convenience constructor for CSS candidates
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Convenience constructor for XPath candidates
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// Convenience constructor for visible-text candidates
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Convenience constructor for role candidates
    pub fn role(role: impl Into<String>, name: Option<String>) -> Self {
        Self::Role {
            role: role.into(),
            name,
        }
    }

    /// Whether the descriptor carries enough data to evaluate.
    /// Blank selector strings and blank roles are recording defects.
    pub fn is_well_formed(&self) -> bool {
        match self {
            LocatorSpec::Css(s) | LocatorSpec::XPath(s) | LocatorSpec::Text(s) => {
                !s.trim().is_empty()
            }
            LocatorSpec::Role { role, .. } => !role.trim().is_empty(),
        }
    }
}

impl std::fmt::Display for LocatorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocatorSpec::Css(s) => write!(f, "css:{}", s),
            LocatorSpec::XPath(s) => write!(f, "xpath:{}", s),
            LocatorSpec::Text(s) => write!(f, "text:{}", s),
            LocatorSpec::Role {
                role,
                name: Some(name),
            } => write!(f, "role:{}[name={}]", role, name),
            LocatorSpec::Role { role, name: None } => write!(f, "role:{}", role),
        }
    }
}

// ===== Backend contract =====

/// Handle to one live element chosen by the resolver.
///
/// The id is opaque to this crate; the page backend that minted it knows
/// how to act on it (click, type, read).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(String);

impl ElementHandle {
    /// Wrap a backend element id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Backend element id
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// One lazy locator bound to a candidate descriptor.
///
/// Implementations query the live page on every call rather than caching
/// results; the page can change between the attach wait and the count.
#[async_trait]
pub trait Locator: Send + Sync {
    /// Wait until at least one match is attached to the page, up to
    /// `timeout`. Err when nothing attached in time or the query failed.
    async fn wait_attached(&self, timeout: Duration) -> Result<()>;

    /// Number of elements currently matching
    async fn count(&self) -> Result<usize>;

    /// Handle to the first element currently matching
    async fn first(&self) -> Result<ElementHandle>;
}

/// Turns recorded descriptors into lazy locators for one page.
pub trait LocatorFactory: Send + Sync {
    /// Build a locator for one descriptor. Err when the backend cannot
    /// express the descriptor at all.
    fn locator(&self, spec: &LocatorSpec) -> Result<Box<dyn Locator>>;
}

/// A resolved element together with the live match count that produced it.
/// `match_count == 1` means the pick was unambiguous.
#[derive(Debug, Clone)]
pub struct ResolvedElement {
    pub handle: ElementHandle,
    pub match_count: usize,
}

// ===== Resolver =====

/// Ranked-candidate resolver.
///
/// Given the recorder's candidate list (best guess first), resolution:
///
/// 1. rejects empty or malformed lists outright,
/// 2. lets every candidate wait for an attached match concurrently,
///    swallowing individual timeouts and failures,
/// 3. prefers the highest-ranked candidate matching exactly one element,
/// 4. otherwise falls back to the candidate with the smallest nonzero
///    match count (earliest wins ties) and takes its first element,
/// 5. fails with a not-found error when nothing matched at all.
pub struct LocatorResolver {
    factory: Arc<dyn LocatorFactory>,
    candidate_wait: Duration,
}

impl LocatorResolver {
    /// Create a resolver with the default per-candidate wait
    pub fn new(factory: Arc<dyn LocatorFactory>) -> Self {
        Self {
            factory,
            candidate_wait: Duration::from_millis(DEFAULT_CANDIDATE_WAIT_MS),
        }
    }

    /// Override the per-candidate attach wait
    pub fn with_candidate_wait(mut self, candidate_wait: Duration) -> Self {
        self.candidate_wait = candidate_wait;
        self
    }

    /// Resolve a candidate list to one live element.
    ///
    /// The returned [`ResolvedElement`] records how many elements the
    /// winning candidate matched, so callers can tell a clean single match
    /// from a first-of-many fallback.
    pub async fn resolve(&self, candidates: &[LocatorSpec]) -> Result<ResolvedElement> {
        if candidates.is_empty() {
            return Err(Error::invalid_input("candidate list is empty"));
        }
        if let Some(bad) = candidates.iter().find(|c| !c.is_well_formed()) {
            return Err(Error::invalid_input(format!(
                "malformed locator descriptor: {}",
                bad
            )));
        }

        let mut locators: CandidateVec<Box<dyn Locator>> = SmallVec::new();
        for spec in candidates {
            locators.push(self.factory.locator(spec)?);
        }

        // Every candidate waits for the page concurrently; a candidate that
        // never attaches or errors is skipped, not fatal. All waits run to
        // completion so the counts below see a settled page.
        let waits = locators
            .iter()
            .map(|locator| locator.wait_attached(self.candidate_wait));
        for (index, outcome) in join_all(waits).await.into_iter().enumerate() {
            if let Err(e) = outcome {
                debug!("Candidate {} ({}) never attached: {}", index, candidates[index], e);
            }
        }

        // Live match counts, in recording priority order. A failed count is
        // treated as zero matches for that candidate.
        let mut counts: CandidateVec<usize> = SmallVec::new();
        for (index, locator) in locators.iter().enumerate() {
            let count = match locator.count().await {
                Ok(count) => count,
                Err(e) => {
                    debug!("Candidate {} ({}) count failed: {}", index, candidates[index], e);
                    0
                }
            };
            counts.push(count);
        }

        // A candidate matching exactly one element wins on recording
        // priority, regardless of what lower-ranked candidates matched.
        for (index, &count) in counts.iter().enumerate() {
            if count == 1 {
                let handle = locators[index].first().await?;
                info!("Resolved {} uniquely (candidate {})", candidates[index], index);
                return Ok(ResolvedElement {
                    handle,
                    match_count: 1,
                });
            }
        }

        // No unique match anywhere: least-ambiguous candidate wins, with
        // recording priority breaking ties.
        let mut best: Option<(usize, usize)> = None;
        for (index, &count) in counts.iter().enumerate() {
            if count > 0 && best.map_or(true, |(_, smallest)| count < smallest) {
                best = Some((index, count));
            }
        }

        if let Some((index, count)) = best {
            warn!(
                "Ambiguous resolution for {}: {} matches, taking the first",
                candidates[index], count
            );
            let handle = locators[index].first().await?;
            return Ok(ResolvedElement {
                handle,
                match_count: count,
            });
        }

        Err(Error::not_found(format!(
            "no candidate matched: [{}]",
            candidates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}
