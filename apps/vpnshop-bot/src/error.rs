use thiserror::Error;

/// Failures talking to the 3x-ui panel.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("panel transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("panel login rejected: {0}")]
    Auth(String),

    #[error("panel returned HTTP {status}")]
    Http { status: u16 },

    #[error("client not found on panel: {0}")]
    NotFound(String),

    #[error("client already exists on panel: {0}")]
    Duplicate(String),

    #[error("panel rejected request: {0}")]
    Rejected(String),

    #[error("malformed panel response: {0}")]
    Malformed(String),
}

impl PanelError {
    /// Divergence between ledger and panel. These are repaired, not retried.
    pub fn is_divergence(&self) -> bool {
        matches!(self, PanelError::NotFound(_) | PanelError::Duplicate(_))
    }
}

/// Terminal outcome of a credential store call, as seen by the engine.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("remote credential store unavailable after {attempts} attempt(s): {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: PanelError,
    },

    /// Remote state diverged from the ledger; only surfaces inside the adapter.
    #[error("remote credential state diverged: {0}")]
    Inconsistent(PanelError),
}

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("user {0} is not registered")]
    UnknownUser(i64),

    #[error("requested expiry for user {user_id} is out of range")]
    OutOfRange { user_id: i64 },

    #[error(transparent)]
    Remote(#[from] CredentialError),

    #[error("ledger row for user {user_id} disappeared during commit")]
    LedgerInconsistent { user_id: i64 },

    #[error(transparent)]
    Ledger(#[from] anyhow::Error),
}

/// Errors surfaced by user-triggered entitlement events.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("user {0} is not registered")]
    UnknownUser(i64),

    #[error("rate limited, retry in {}s", .retry_after.num_seconds())]
    RateLimited { retry_after: chrono::Duration },

    #[error(transparent)]
    Grant(#[from] GrantError),

    #[error(transparent)]
    Ledger(#[from] anyhow::Error),
}
