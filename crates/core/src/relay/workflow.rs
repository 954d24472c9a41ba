//! Invocation and retrieval workflows.
//!
//! An invocation moves through
//!
//! ```text
//! Validating -> Building -> Submitting -> (ack) -> Settling -> Recording
//! ```
//!
//! Everything up to submission runs on the caller's task and fails with an
//! [`InvokeError`]. Once the RPC accepts the transaction the caller gets the
//! transaction id back and settlement continues on a supervised background
//! task. Settlement failures are logged and never reach the caller.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::{JoinError, JoinHandle};

use super::builder::{self, SourceAccount};
use super::error::{InvokeError, SettlementFailure};
use super::events::{EventMeta, EventRecord, EventStore};
use super::network::{NetworkContext, NetworkRegistry};
use super::request::{
    coerce_amount, format_timestamp, resolve_time_zone, ContractIdentifier, InvocationRequest,
    ValidationError,
};
use super::settlement::{settle, SettlementOutcome, SettlementPolicy};

// =============================================================================
// TaskSupervisor
// =============================================================================

/// Spawns background tasks and tracks how many are still running.
#[derive(Debug, Clone, Default)]
pub struct TaskSupervisor {
    in_flight: Arc<AtomicUsize>,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(self.in_flight.clone());
        tokio::spawn(async move {
            let _guard = guard;
            task.await
        })
    }
}

// =============================================================================
// Invocation
// =============================================================================

/// What a background settlement ended with.
#[derive(Debug)]
pub enum SettlementReport {
    Recorded(EventRecord),
    NotRecorded(SettlementFailure),
}

/// Handle to a background settlement. Dropping it does not cancel the task.
#[derive(Debug)]
pub struct SettlementHandle(JoinHandle<SettlementReport>);

impl SettlementHandle {
    pub async fn join(self) -> Result<SettlementReport, JoinError> {
        self.0.await
    }
}

/// Immediate acknowledgment of an accepted submission.
#[derive(Debug)]
pub struct InvocationAck {
    /// Transaction id (64 hex characters).
    pub id: String,
    pub settlement: SettlementHandle,
}

/// Fields of the event that will be recorded if the transaction settles.
struct PendingEvent {
    tx_id: String,
    contract_id: String,
    network: String,
    amount: u64,
    timestamp: String,
    unix_time: i64,
}

pub struct InvocationWorkflow {
    networks: Arc<NetworkRegistry>,
    store: Arc<EventStore>,
    policy: Arc<SettlementPolicy>,
    supervisor: TaskSupervisor,
}

impl InvocationWorkflow {
    pub fn new(
        networks: Arc<NetworkRegistry>,
        store: Arc<EventStore>,
        policy: SettlementPolicy,
        supervisor: TaskSupervisor,
    ) -> Self {
        Self {
            networks,
            store,
            policy: Arc::new(policy),
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    pub async fn invoke(&self, request: InvocationRequest) -> Result<InvocationAck, InvokeError> {
        // Validating
        let network = self.networks.resolve(&request.network)?;
        let amount = coerce_amount(request.increment_amount.as_ref())?;
        let contract = ContractIdentifier::parse(&request.contract_id)?;
        let time_zone = resolve_time_zone(request.time_zone.as_deref());

        let account = network
            .rpc()
            .get_account(&network.public_key_strkey())
            .await
            .map_err(InvokeError::AccountLookup)?;

        // Building
        let source = SourceAccount {
            public_key: network.public_key(),
            sequence: account.sequence,
        };
        let tx = builder::build(
            &contract,
            &source,
            network.signing_key(),
            amount,
            &network.passphrase,
        )?;

        // Submitting
        let submitted_at = Utc::now();
        let tx_id = network
            .rpc()
            .submit_transaction(&tx)
            .await
            .map_err(InvokeError::Submission)?;

        tracing::info!(
            tx_id = %tx_id,
            network = %network.name,
            contract_id = %contract,
            amount,
            "transaction submitted"
        );

        let pending = PendingEvent {
            tx_id: tx_id.clone(),
            contract_id: contract.to_hex(),
            network: network.name.clone(),
            amount,
            timestamp: format_timestamp(submitted_at, time_zone),
            unix_time: submitted_at.timestamp(),
        };
        let handle = self.supervisor.spawn(settle_and_record(
            network,
            self.store.clone(),
            self.policy.clone(),
            pending,
        ));

        Ok(InvocationAck {
            id: tx_id,
            settlement: SettlementHandle(handle),
        })
    }
}

async fn settle_and_record(
    network: Arc<NetworkContext>,
    store: Arc<EventStore>,
    policy: Arc<SettlementPolicy>,
    pending: PendingEvent,
) -> SettlementReport {
    let tx_id = pending.tx_id.clone();
    let failure = match settle(&tx_id, network.rpc(), &policy).await {
        Ok(SettlementOutcome::Success { value, attempts }) => {
            let record = EventRecord {
                transaction_id: pending.tx_id.clone(),
                contract_id: pending.contract_id,
                network: pending.network,
                increment_amount: pending.amount.to_string(),
                total: value.to_string(),
                timestamp: pending.timestamp,
                meta: EventMeta {
                    id: pending.tx_id,
                    timestamp: pending.unix_time,
                },
            };
            let evicted = store.record(record.clone());
            tracing::info!(tx_id = %tx_id, attempts, total = value, "event recorded");
            if !evicted.is_empty() {
                tracing::debug!(tx_id = %tx_id, evicted = evicted.len(), "event log trimmed");
            }
            return SettlementReport::Recorded(record);
        }
        Ok(SettlementOutcome::Failed { status, .. }) => SettlementFailure::Failed { tx_id, status },
        Ok(SettlementOutcome::Unknown { attempts }) => {
            SettlementFailure::Exhausted { tx_id, attempts }
        }
        Err(source) => SettlementFailure::Decode { tx_id, source },
    };

    tracing::warn!(tx_id = %failure.tx_id(), error = %failure, "settlement produced no event");
    SettlementReport::NotRecorded(failure)
}

// =============================================================================
// Retrieval
// =============================================================================

/// One page of a query. `cursor` is set only when more records remain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<EventRecord>,
    pub cursor: Option<String>,
}

pub struct RetrievalWorkflow {
    networks: Arc<NetworkRegistry>,
    store: Arc<EventStore>,
}

impl RetrievalWorkflow {
    pub fn new(networks: Arc<NetworkRegistry>, store: Arc<EventStore>) -> Self {
        Self { networks, store }
    }

    /// Newest `limit` events for the contract (default 3).
    pub fn trigger(
        &self,
        network: &str,
        contract_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<EventRecord>, ValidationError> {
        self.networks.resolve(network)?;
        Ok(self.store.read(network, contract_id, limit))
    }

    /// Like [`trigger`](Self::trigger), resuming after `cursor` when given.
    pub fn query(
        &self,
        network: &str,
        contract_id: &str,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> Result<Page, ValidationError> {
        self.networks.resolve(network)?;

        let after = match cursor.map(str::trim).filter(|c| !c.is_empty()) {
            Some(token) => Some(decode_cursor(token)?),
            None => None,
        };
        let (records, more) =
            self.store
                .read_after(network, contract_id, limit, after.as_deref());

        let cursor = if more {
            records.last().map(|e| encode_cursor(&e.transaction_id))
        } else {
            None
        };
        Ok(Page { records, cursor })
    }
}

fn encode_cursor(tx_id: &str) -> String {
    base64::encode(tx_id)
}

fn decode_cursor(token: &str) -> Result<String, ValidationError> {
    let bytes = base64::decode(token).map_err(|_| ValidationError::InvalidCursor)?;
    String::from_utf8(bytes).map_err(|_| ValidationError::InvalidCursor)
}

// =============================================================================
// Tests
// =============================================================================
