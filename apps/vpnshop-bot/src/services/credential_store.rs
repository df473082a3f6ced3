use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CredentialError, PanelError};
use crate::xui::{BYTES_PER_GB, ClientSpec, PanelApi};

/// What the remote side actually did for a successful call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    Created,
    Updated,
    /// An orphaned client under the same label was removed and re-added.
    Repaired,
    /// Nothing existed remotely; the client was created from scratch.
    Recreated,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create(
        &self,
        credential_id: Uuid,
        label: &str,
        expiry_ms: i64,
    ) -> Result<RemoteOutcome, CredentialError>;

    async fn update(
        &self,
        credential_id: Uuid,
        label: &str,
        expiry_ms: i64,
    ) -> Result<RemoteOutcome, CredentialError>;
}

/// Capped exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            multiplier: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy)]
enum PanelOp {
    Add,
    Update,
}

impl PanelOp {
    fn name(self) -> &'static str {
        match self {
            PanelOp::Add => "add",
            PanelOp::Update => "update",
        }
    }
}

/// `CredentialStore` backed by a 3x-ui panel.
pub struct PanelCredentialStore<P> {
    panel: P,
    policy: RetryPolicy,
    data_cap_bytes: u64,
    connection_limit: u32,
}

impl<P: PanelApi> PanelCredentialStore<P> {
    pub fn new(panel: P, policy: RetryPolicy, data_cap_gb: u64) -> Self {
        Self {
            panel,
            policy,
            data_cap_bytes: data_cap_gb.saturating_mul(BYTES_PER_GB),
            connection_limit: 1,
        }
    }

    fn spec(&self, credential_id: Uuid, label: &str, expiry_ms: i64) -> ClientSpec {
        ClientSpec {
            id: credential_id,
            label: label.to_string(),
            expiry_ms,
            data_cap_bytes: self.data_cap_bytes,
            connection_limit: self.connection_limit,
            enable: true,
        }
    }

    async fn attempt(&self, op: PanelOp, spec: &ClientSpec) -> Result<(), PanelError> {
        self.panel.login().await?;
        match op {
            PanelOp::Add => self.panel.add_client(spec).await,
            PanelOp::Update => self.panel.update_client(spec).await,
        }
    }

    /// Runs `op` with a fresh login per attempt. Divergence stops the loop at once.
    async fn retrying(&self, op: PanelOp, spec: &ClientSpec) -> Result<(), CredentialError> {
        let mut attempt = 1;
        loop {
            let err = match self.attempt(op, spec).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if err.is_divergence() || self.rejected_for_missing_client(op, spec, &err).await {
                return Err(CredentialError::Inconsistent(err));
            }
            if attempt >= self.policy.max_attempts {
                return Err(CredentialError::Unavailable {
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                label = %spec.label,
                attempt,
                "Panel {} failed: {}. Retrying in {:?}",
                op.name(),
                err,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// The panel does not word a missing-client update consistently, so a
    /// rejected update is checked against the client list.
    async fn rejected_for_missing_client(
        &self,
        op: PanelOp,
        spec: &ClientSpec,
        err: &PanelError,
    ) -> bool {
        if !matches!((op, err), (PanelOp::Update, PanelError::Rejected(_))) {
            return false;
        }
        match self.panel.find_by_label(&spec.label).await {
            Ok(Some(client)) => client.id != spec.id.to_string(),
            Ok(None) => true,
            Err(e) => {
                warn!(label = %spec.label, "Could not check client after rejected update: {}", e);
                false
            }
        }
    }

    /// One-shot repair: drop whatever sits under the label, then add `spec` again.
    async fn repair(&self, spec: &ClientSpec) -> Result<RemoteOutcome, CredentialError> {
        let orphan = match self.panel.login().await {
            Ok(()) => self.panel.find_by_label(&spec.label).await,
            Err(e) => Err(e),
        };

        let outcome = match orphan {
            Ok(Some(orphan)) => {
                info!(label = %spec.label, orphan_id = %orphan.id, "Removing orphaned panel client");
                if let Err(e) = self.panel.delete_client(&orphan.id).await {
                    warn!(label = %spec.label, "Failed to delete orphaned client: {}", e);
                }
                RemoteOutcome::Repaired
            }
            Ok(None) => RemoteOutcome::Recreated,
            Err(e) => {
                warn!(label = %spec.label, "Orphan lookup failed, recreating anyway: {}", e);
                RemoteOutcome::Recreated
            }
        };

        match self.retrying(PanelOp::Add, spec).await {
            Ok(()) => Ok(outcome),
            Err(CredentialError::Inconsistent(source)) => Err(CredentialError::Unavailable {
                attempts: 1,
                source,
            }),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<P: PanelApi> CredentialStore for PanelCredentialStore<P> {
    async fn create(
        &self,
        credential_id: Uuid,
        label: &str,
        expiry_ms: i64,
    ) -> Result<RemoteOutcome, CredentialError> {
        let spec = self.spec(credential_id, label, expiry_ms);
        match self.retrying(PanelOp::Add, &spec).await {
            Ok(()) => {
                info!(label, %credential_id, "Panel client created");
                Ok(RemoteOutcome::Created)
            }
            Err(CredentialError::Inconsistent(e)) => {
                warn!(label, "Create diverged ({}), repairing", e);
                self.repair(&spec).await
            }
            Err(e) => Err(e),
        }
    }

    async fn update(
        &self,
        credential_id: Uuid,
        label: &str,
        expiry_ms: i64,
    ) -> Result<RemoteOutcome, CredentialError> {
        let spec = self.spec(credential_id, label, expiry_ms);
        match self.retrying(PanelOp::Update, &spec).await {
            Ok(()) => {
                info!(label, %credential_id, "Panel client updated");
                Ok(RemoteOutcome::Updated)
            }
            Err(CredentialError::Inconsistent(e)) => {
                warn!(label, "Update diverged ({}), repairing", e);
                self.repair(&spec).await
            }
            Err(e) => Err(e),
        }
    }
}
