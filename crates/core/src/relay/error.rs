use super::builder::BuildError;
use super::request::ValidationError;
use super::rpc::RpcError;
use super::settlement::DecodeError;

/// Failure on the synchronous part of an invocation. Nothing was submitted
/// unless the variant is [`InvokeError::Submission`], and no event is ever
/// recorded.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to load source account: {0}")]
    AccountLookup(#[source] RpcError),
    #[error("failed to build transaction: {0}")]
    Build(#[from] BuildError),
    #[error("failed to submit transaction: {0}")]
    Submission(#[source] RpcError),
}

impl InvokeError {
    /// Whether the caller's input (or its resolution) was at fault rather
    /// than the ledger.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, InvokeError::Submission(_))
    }
}

/// Why a submitted transaction produced no event.
#[derive(Debug, thiserror::Error)]
pub enum SettlementFailure {
    #[error("transaction {tx_id} failed with status {status:?}")]
    Failed { tx_id: String, status: String },
    #[error("transaction {tx_id} not settled after {attempts} attempts")]
    Exhausted { tx_id: String, attempts: u32 },
    #[error("transaction {tx_id} settled with an unreadable result: {source}")]
    Decode {
        tx_id: String,
        #[source]
        source: DecodeError,
    },
}

impl SettlementFailure {
    pub fn tx_id(&self) -> &str {
        match self {
            SettlementFailure::Failed { tx_id, .. }
            | SettlementFailure::Exhausted { tx_id, .. }
            | SettlementFailure::Decode { tx_id, .. } => tx_id,
        }
    }
}
