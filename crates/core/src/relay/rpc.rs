//! Ledger RPC collaborator: account lookup, submission and status queries.
//!
//! ## Architecture
//!
//! The relay talks to a Soroban RPC endpoint through the [`LedgerRpc`] trait so
//! that the workflows can be driven by a scripted source in tests.
//! [`SorobanRpcClient`] is the production implementation and speaks JSON-RPC
//! 2.0 over HTTP:
//!
//! | method                 | params        | result                         |
//! |------------------------|---------------|--------------------------------|
//! | `getAccount`           | `[G... key]`  | `{id, sequence}`               |
//! | `sendTransaction`      | `[b64 XDR]`   | `{id, status, error?}`         |
//! | `getTransactionStatus` | `[tx hash]`   | `{id, status, results?, error?}` |

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::builder::SignedTransaction;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("RPC request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("failed to parse RPC response: {0}")]
    Parse(String),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("{0}")]
    Other(String),
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub id: String,
    pub sequence: i64,
}

/// One entry of `results`; `xdr` is a base64 `ScVal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub xdr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStatus {
    #[serde(default)]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub results: Vec<TransactionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl TransactionStatus {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

pub type RpcFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RpcError>> + Send + 'a>>;

// =============================================================================
// Trait: LedgerRpc
// =============================================================================

/// Abstraction over the Soroban RPC for testability.
pub trait LedgerRpc: Send + Sync + 'static {
    /// Fetch the account's current sequence number.
    fn get_account<'a>(&'a self, public_key: &'a str) -> RpcFuture<'a, AccountInfo>;

    /// Submit a signed transaction. Returns the transaction id on acceptance
    /// and [`RpcError::Rejected`] when the RPC refuses it.
    fn submit_transaction<'a>(&'a self, tx: &'a SignedTransaction) -> RpcFuture<'a, String>;

    /// Query the settlement status of a submitted transaction.
    fn get_transaction_status<'a>(&'a self, tx_id: &'a str) -> RpcFuture<'a, TransactionStatus>;
}

// =============================================================================
// Production: SorobanRpcClient
// =============================================================================

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RawAccount {
    id: String,
    sequence: Value,
}

#[derive(Deserialize)]
struct RawSubmission {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<Value>,
}

/// JSON-RPC client for a single Soroban RPC endpoint.
pub struct SorobanRpcClient {
    client: reqwest::Client,
    url: String,
}

impl SorobanRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RpcError::Http)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn call<P, T>(&self, method: &str, params: P) -> Result<T, RpcError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        tracing::debug!(method, url = %self.url, "RPC call");

        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (response.result, response.error) {
            (_, Some(e)) => Err(RpcError::Remote {
                code: e.code,
                message: e.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcError::Parse(format!(
                "{method}: response carried neither result nor error"
            ))),
        }
    }
}

fn parse_sequence(value: &Value) -> Result<i64, RpcError> {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| RpcError::Parse(format!("account sequence {s:?}: {e}"))),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| RpcError::Parse(format!("account sequence {n} out of range"))),
        other => Err(RpcError::Parse(format!(
            "account sequence has unexpected type: {other}"
        ))),
    }
}

impl LedgerRpc for SorobanRpcClient {
    fn get_account<'a>(&'a self, public_key: &'a str) -> RpcFuture<'a, AccountInfo> {
        Box::pin(async move {
            let raw: RawAccount = self.call("getAccount", [public_key]).await?;
            Ok(AccountInfo {
                sequence: parse_sequence(&raw.sequence)?,
                id: raw.id,
            })
        })
    }

    fn submit_transaction<'a>(&'a self, tx: &'a SignedTransaction) -> RpcFuture<'a, String> {
        Box::pin(async move {
            let envelope = tx
                .to_xdr_base64()
                .map_err(|e| RpcError::Other(e.to_string()))?;
            let raw: RawSubmission = self.call("sendTransaction", [envelope]).await?;

            if raw.status.eq_ignore_ascii_case("error") {
                let reason = raw
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no reason given".to_string());
                return Err(RpcError::Rejected(reason));
            }
            if raw.id.is_empty() {
                // Older endpoints omit the id on acceptance; the local hash is
                // the same value.
                return Ok(tx.id());
            }
            Ok(raw.id)
        })
    }

    fn get_transaction_status<'a>(&'a self, tx_id: &'a str) -> RpcFuture<'a, TransactionStatus> {
        Box::pin(async move { self.call("getTransactionStatus", [tx_id]).await })
    }
}

// =============================================================================
// Mock: MockLedgerRpc (test / testing feature)
// =============================================================================

#[cfg(any(test, feature = "testing"))]
pub use mock::MockLedgerRpc;

#[cfg(any(test, feature = "testing"))]
mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use stellar_xdr::curr::{Limits, ScVal, WriteXdr};

    use super::*;

    /// Scripted RPC: statuses are served in order, then `"pending"` forever.
    pub struct MockLedgerRpc {
        sequence: i64,
        statuses: Mutex<VecDeque<Result<TransactionStatus, RpcError>>>,
        submitted: Mutex<Vec<String>>,
        /// Whether account lookups should fail.
        pub account_unreachable: bool,
        /// Whether submissions should be rejected.
        pub reject_submissions: bool,
        account_calls: AtomicUsize,
        submit_calls: AtomicUsize,
        status_calls: AtomicUsize,
    }

    impl MockLedgerRpc {
        pub fn new(sequence: i64) -> Self {
            Self {
                sequence,
                statuses: Mutex::new(VecDeque::new()),
                submitted: Mutex::new(Vec::new()),
                account_unreachable: false,
                reject_submissions: false,
                account_calls: AtomicUsize::new(0),
                submit_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
            }
        }

        pub fn with_statuses(
            self,
            statuses: impl IntoIterator<Item = Result<TransactionStatus, RpcError>>,
        ) -> Self {
            self.statuses.lock().unwrap().extend(statuses);
            self
        }

        pub fn pending() -> TransactionStatus {
            TransactionStatus {
                id: String::new(),
                status: "pending".to_string(),
                results: Vec::new(),
                error: None,
            }
        }

        pub fn success(total: u64) -> TransactionStatus {
            Self::success_with(ScVal::U64(total))
        }

        pub fn success_with(value: ScVal) -> TransactionStatus {
            let xdr = base64::encode(value.to_xdr(Limits::none()).unwrap());
            TransactionStatus {
                id: String::new(),
                status: "success".to_string(),
                results: vec![TransactionResult { xdr }],
                error: None,
            }
        }

        pub fn account_calls(&self) -> usize {
            self.account_calls.load(Ordering::SeqCst)
        }

        pub fn submit_calls(&self) -> usize {
            self.submit_calls.load(Ordering::SeqCst)
        }

        pub fn status_calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }

        pub fn total_calls(&self) -> usize {
            self.account_calls() + self.submit_calls() + self.status_calls()
        }

        pub fn submitted(&self) -> Vec<String> {
            self.submitted.lock().unwrap().clone()
        }
    }

    impl LedgerRpc for MockLedgerRpc {
        fn get_account<'a>(&'a self, public_key: &'a str) -> RpcFuture<'a, AccountInfo> {
            self.account_calls.fetch_add(1, Ordering::SeqCst);
            if self.account_unreachable {
                return Box::pin(async { Err(RpcError::Other("mock failure".to_string())) });
            }
            let info = AccountInfo {
                id: public_key.to_string(),
                sequence: self.sequence,
            };
            Box::pin(async move { Ok(info) })
        }

        fn submit_transaction<'a>(&'a self, tx: &'a SignedTransaction) -> RpcFuture<'a, String> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_submissions {
                return Box::pin(async { Err(RpcError::Rejected("tx_bad_seq".to_string())) });
            }
            let id = tx.id();
            self.submitted.lock().unwrap().push(id.clone());
            Box::pin(async move { Ok(id) })
        }

        fn get_transaction_status<'a>(
            &'a self,
            tx_id: &'a str,
        ) -> RpcFuture<'a, TransactionStatus> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Self::pending()));
            let next = next.map(|mut status| {
                status.id = tx_id.to_string();
                status
            });
            Box::pin(async move { next })
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::matchers::{json_decoded, request};
    use httptest::responders::json_encoded;
    use httptest::{all_of, Expectation, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> SorobanRpcClient {
        SorobanRpcClient::new(server.url("/").to_string(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn get_account_parses_string_sequence() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/"),
                request::body(json_decoded(|body: &Value| {
                    body["method"] == "getAccount" && body["params"][0] == "GABC"
                })),
            ])
            .respond_with(json_encoded(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "id": "GABC", "sequence": "8589934592" }
            }))),
        );

        let account = client_for(&server).get_account("GABC").await.unwrap();
        assert_eq!(account.id, "GABC");
        assert_eq!(account.sequence, 8_589_934_592);
    }

    #[tokio::test]
    async fn remote_error_is_surfaced() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/")).respond_with(
                json_encoded(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32600, "message": "account not found" }
                })),
            ),
        );

        let err = client_for(&server).get_account("GABC").await.unwrap_err();
        match err {
            RpcError::Remote { code, message } => {
                assert_eq!(code, -32600);
                assert_eq!(message, "account not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn transaction_status_with_results() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/")).respond_with(
                json_encoded(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "id": "abcd",
                        "status": "success",
                        "results": [{ "xdr": "AAAABQAAAAAAAAAF" }]
                    }
                })),
            ),
        );

        let status = client_for(&server)
            .get_transaction_status("abcd")
            .await
            .unwrap();
        assert!(status.is_success());
        assert_eq!(status.results.len(), 1);
        assert_eq!(status.results[0].xdr, "AAAABQAAAAAAAAAF");
    }

    #[tokio::test]
    async fn pending_status_without_results() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/")).respond_with(
                json_encoded(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": { "id": "abcd", "status": "pending" }
                })),
            ),
        );

        let status = client_for(&server)
            .get_transaction_status("abcd")
            .await
            .unwrap();
        assert!(!status.is_success());
        assert!(status.results.is_empty());
    }

    fn signed_tx() -> SignedTransaction {
        let key = ed25519_dalek::SigningKey::from_bytes(&[5u8; 32]);
        let account = crate::relay::builder::SourceAccount {
            public_key: key.verifying_key().to_bytes(),
            sequence: 10,
        };
        crate::relay::builder::build(
            &crate::relay::request::ContractIdentifier::new([9u8; 32]),
            &account,
            &key,
            5,
            "Standalone Network ; February 2017",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn send_transaction_posts_envelope() {
        use stellar_xdr::curr::{Limits, ReadXdr, TransactionEnvelope};

        let tx = signed_tx();
        let expected = tx.to_xdr_base64().unwrap();
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/"),
                request::body(json_decoded(move |body: &Value| {
                    let Some(envelope) = body["params"][0].as_str() else {
                        return false;
                    };
                    let decodes = base64::decode(envelope)
                        .ok()
                        .and_then(|bytes| {
                            TransactionEnvelope::from_xdr(bytes, Limits::none()).ok()
                        })
                        .is_some();
                    body["method"] == "sendTransaction" && envelope == expected && decodes
                })),
            ])
            .respond_with(json_encoded(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "id": "deadbeef", "status": "pending" }
            }))),
        );

        let id = client_for(&server).submit_transaction(&tx).await.unwrap();
        assert_eq!(id, "deadbeef");
    }

    #[tokio::test]
    async fn send_transaction_error_status_is_rejection() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/")).respond_with(
                json_encoded(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "id": "deadbeef",
                        "status": "ERROR",
                        "error": { "code": "tx_bad_seq" }
                    }
                })),
            ),
        );

        let err = client_for(&server)
            .submit_transaction(&signed_tx())
            .await
            .unwrap_err();
        match err {
            RpcError::Rejected(reason) => assert!(reason.contains("tx_bad_seq"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn send_transaction_without_id_uses_local_hash() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/")).respond_with(
                json_encoded(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": { "status": "pending" }
                })),
            ),
        );

        let tx = signed_tx();
        let id = client_for(&server).submit_transaction(&tx).await.unwrap();
        assert_eq!(id, tx.id());
        assert_eq!(id.len(), 64);
    }

    #[test]
    fn parse_sequence_accepts_numbers_and_strings() {
        assert_eq!(parse_sequence(&json!("12")).unwrap(), 12);
        assert_eq!(parse_sequence(&json!(12)).unwrap(), 12);
        assert!(parse_sequence(&json!("twelve")).is_err());
        assert!(parse_sequence(&json!(null)).is_err());
    }

    #[tokio::test]
    async fn mock_serves_scripted_statuses_then_pending() {
        let rpc = MockLedgerRpc::new(1).with_statuses([Ok(MockLedgerRpc::success(3))]);
        let first = rpc.get_transaction_status("tx").await.unwrap();
        assert!(first.is_success());
        assert_eq!(first.id, "tx");
        let second = rpc.get_transaction_status("tx").await.unwrap();
        assert_eq!(second.status, "pending");
        assert_eq!(rpc.status_calls(), 2);
    }
}
