//! Mock auth service for unit and integration testing.
//!
//! Implements both [`TokenIssuer`] and [`ApprovalSubmitter`]. Calls succeed
//! by default — issuance mints `issued-token-<n>` — and tests can queue
//! failures for either endpoint. Every call is recorded for inspection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ApprovalSubmitter, AuthError, TokenIssuer};

/// One recorded [`TokenIssuer::issue_token`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    pub secret: Vec<u8>,
    pub server_url: String,
}

/// One recorded [`ApprovalSubmitter::submit_approval`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRecord {
    pub token: String,
    pub public_key: String,
    pub legacy_envelope: Vec<u8>,
    pub versioned_envelope: Vec<u8>,
    pub server_url: String,
}

#[derive(Default)]
struct State {
    issued: Vec<IssueRecord>,
    approvals: Vec<ApprovalRecord>,
    issue_results: VecDeque<Result<String, AuthError>>,
    approval_results: VecDeque<Result<(), AuthError>>,
    approval_delay: Option<Duration>,
}

/// A mock auth backend with recorded calls and scriptable failures.
#[derive(Default)]
pub struct MockAuthService {
    state: Mutex<State>,
}

impl MockAuthService {
    /// Creates a service where every call succeeds until told otherwise.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the result of the next `issue_token` call. Unqueued calls
    /// succeed with a minted token.
    pub fn queue_issue(&self, result: Result<String, AuthError>) {
        self.state.lock().issue_results.push_back(result);
    }

    /// Queues the result of the next `submit_approval` call. Unqueued
    /// calls succeed.
    pub fn queue_approval(&self, result: Result<(), AuthError>) {
        self.state.lock().approval_results.push_back(result);
    }

    /// Makes every `submit_approval` call sleep first, so tests can hold
    /// a flow open at its last await point.
    pub fn set_approval_delay(&self, delay: Duration) {
        self.state.lock().approval_delay = Some(delay);
    }

    /// Every issuance call so far, oldest first.
    pub fn issued(&self) -> Vec<IssueRecord> {
        self.state.lock().issued.clone()
    }

    /// Every approval call so far, oldest first.
    pub fn approvals(&self) -> Vec<ApprovalRecord> {
        self.state.lock().approvals.clone()
    }
}

#[async_trait]
impl TokenIssuer for MockAuthService {
    async fn issue_token(&self, secret: &[u8], server_url: &str) -> Result<String, AuthError> {
        let mut state = self.state.lock();
        state.issued.push(IssueRecord {
            secret: secret.to_vec(),
            server_url: server_url.to_string(),
        });
        let minted = format!("issued-token-{}", state.issued.len());
        state.issue_results.pop_front().unwrap_or(Ok(minted))
    }
}

#[async_trait]
impl ApprovalSubmitter for MockAuthService {
    async fn submit_approval(
        &self,
        token: &str,
        public_key: &str,
        legacy_envelope: &[u8],
        versioned_envelope: &[u8],
        server_url: &str,
    ) -> Result<(), AuthError> {
        let delay = self.state.lock().approval_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.approvals.push(ApprovalRecord {
            token: token.to_string(),
            public_key: public_key.to_string(),
            legacy_envelope: legacy_envelope.to_vec(),
            versioned_envelope: versioned_envelope.to_vec(),
            server_url: server_url.to_string(),
        });
        state.approval_results.pop_front().unwrap_or(Ok(()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
