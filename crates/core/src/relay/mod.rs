//! Increment relay: validates webhook actions, submits the contract
//! invocation, and records settled results.

pub mod builder;
pub mod error;
pub mod events;
pub mod network;
pub mod request;
pub mod rpc;
pub mod settlement;
pub mod workflow;

pub use error::{InvokeError, SettlementFailure};
pub use events::{EventRecord, EventStore};
pub use network::{NetworkContext, NetworkRegistry};
pub use request::{InvocationRequest, ValidationError};
pub use rpc::{LedgerRpc, SorobanRpcClient};
pub use settlement::{SettlementOutcome, SettlementPolicy};
pub use workflow::{InvocationWorkflow, Page, RetrievalWorkflow, TaskSupervisor};

#[cfg(any(test, feature = "testing"))]
pub use rpc::MockLedgerRpc;
