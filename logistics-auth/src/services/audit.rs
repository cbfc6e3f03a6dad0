//! Append-only audit trail for security-relevant events.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::models::AuditEntry;

/// Caller network metadata attached to audit entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }
}

/// Audit sink. There is no update or delete operation.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), anyhow::Error>;

    /// Entries in `org_id` where `user_id` is the actor or the subject, newest first.
    async fn find_for_user(
        &self,
        org_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, anyhow::Error>;
}

/// Best-effort front for an [`AuditRecorder`].
///
/// Recording failures are logged and counted, never returned, so an audit
/// outage cannot change the outcome of the operation being audited.
#[derive(Clone)]
pub struct AuditTrail {
    recorder: Arc<dyn AuditRecorder>,
}

impl AuditTrail {
    pub fn new(recorder: Arc<dyn AuditRecorder>) -> Self {
        Self { recorder }
    }

    pub async fn record(&self, entry: AuditEntry) {
        match self.recorder.record(&entry).await {
            Ok(()) => {
                metrics::counter!("audit_events_total", "action" => entry.action.as_str())
                    .increment(1);
            }
            Err(e) => {
                metrics::counter!("audit_write_failures_total").increment(1);
                tracing::warn!(
                    action = %entry.action,
                    org_id = %entry.org_id,
                    user_id = ?entry.user_id,
                    error = %e,
                    "Failed to record audit entry"
                );
            }
        }
    }

    pub async fn find_for_user(
        &self,
        org_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, anyhow::Error> {
        self.recorder.find_for_user(org_id, user_id, limit).await
    }
}

/// Process-local audit log for tests and local development.
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditRecorder for InMemoryAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Audit log mutex poisoned: {}", e))?
            .push(entry.clone());
        Ok(())
    }

    async fn find_for_user(
        &self,
        org_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, anyhow::Error> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Audit log mutex poisoned: {}", e))?;

        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.org_id == org_id && e.concerns_user(user_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
