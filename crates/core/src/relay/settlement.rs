//! Settlement poller.
//!
//! Soroban RPC confirmation is eventually consistent: a transaction that has
//! not settled yet and one that never will look the same from here. The poller
//! therefore keeps asking until it sees `"success"` or runs out of attempts.
//! Statuses listed in [`SettlementPolicy::fail_fast_statuses`] end polling
//! early; the list is empty by default.

use std::time::Duration;

use stellar_xdr::curr::{Limits, ReadXdr, ScVal};

use super::rpc::{LedgerRpc, TransactionStatus};

/// Status queries per settlement before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Pause between status queries.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Statuses treated as a permanent failure. Compared case-insensitively.
    pub fail_fast_statuses: Vec<String>,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_POLL_DELAY,
            fail_fast_statuses: Vec::new(),
        }
    }
}

impl SettlementPolicy {
    fn is_terminal_failure(&self, status: &str) -> bool {
        self.fail_fast_statuses
            .iter()
            .any(|s| s.eq_ignore_ascii_case(status))
    }

    /// Upper bound on how long a settlement can take, excluding RPC latency.
    ///
    /// There is no pause after the last attempt, so this is
    /// `(max_attempts - 1) * delay`, not `max_attempts * delay`.
    pub fn max_wait(&self) -> Duration {
        self.delay
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Settled; `value` is the contract's return value.
    Success { value: u64, attempts: u32 },
    /// A status configured as terminal was observed.
    Failed { status: String, attempts: u32 },
    /// Attempt budget exhausted without success.
    Unknown { attempts: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("success status carried no results")]
    MissingResult,
    #[error("result is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("result is not a valid ScVal: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),
    #[error("expected a u64 result, got {0}")]
    UnexpectedType(String),
}

/// Decode the contract return value from the first result of a status.
pub fn decode_result_value(status: &TransactionStatus) -> Result<u64, DecodeError> {
    let first = status.results.first().ok_or(DecodeError::MissingResult)?;
    let bytes = base64::decode(first.xdr.trim())?;
    match ScVal::from_xdr(bytes, Limits::none())? {
        ScVal::U64(value) => Ok(value),
        other => Err(DecodeError::UnexpectedType(format!("{other:?}"))),
    }
}

/// Poll `tx_id` until it settles or `policy.max_attempts` is used up.
///
/// RPC errors count as a non-success attempt. A success status whose result
/// cannot be decoded ends polling with a [`DecodeError`].
pub async fn settle(
    tx_id: &str,
    rpc: &dyn LedgerRpc,
    policy: &SettlementPolicy,
) -> Result<SettlementOutcome, DecodeError> {
    let mut attempts = 0u32;

    while attempts < policy.max_attempts {
        attempts += 1;

        match rpc.get_transaction_status(tx_id).await {
            Ok(status) if status.is_success() => {
                let value = decode_result_value(&status)?;
                tracing::info!(tx_id, attempts, value, "transaction settled");
                return Ok(SettlementOutcome::Success { value, attempts });
            }
            Ok(status) if policy.is_terminal_failure(&status.status) => {
                tracing::warn!(tx_id, attempts, status = %status.status, "transaction failed");
                return Ok(SettlementOutcome::Failed {
                    status: status.status,
                    attempts,
                });
            }
            Ok(status) => {
                tracing::debug!(tx_id, attempts, status = %status.status, "not settled yet");
            }
            Err(e) => {
                tracing::debug!(tx_id, attempts, error = %e, "status query failed");
            }
        }

        if attempts < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Ok(SettlementOutcome::Unknown { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::rpc::{MockLedgerRpc, RpcError, TransactionResult};
    use stellar_xdr::curr::{ScSymbol, WriteXdr};

    fn pending() -> Result<TransactionStatus, RpcError> {
        Ok(MockLedgerRpc::pending())
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let rpc = MockLedgerRpc::new(1).with_statuses([
            pending(),
            pending(),
            Ok(MockLedgerRpc::success(5)),
        ]);
        let start = tokio::time::Instant::now();

        let outcome = settle("tx", &rpc, &SettlementPolicy::default()).await.unwrap();

        assert_eq!(
            outcome,
            SettlementOutcome::Success {
                value: 5,
                attempts: 3
            }
        );
        assert_eq!(rpc.status_calls(), 3);
        assert_eq!(start.elapsed(), DEFAULT_POLL_DELAY * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_ten_non_success_statuses() {
        let rpc = MockLedgerRpc::new(1).with_statuses((0..10).map(|_| pending()));
        let policy = SettlementPolicy::default();
        let start = tokio::time::Instant::now();

        let outcome = settle("tx", &rpc, &policy).await.unwrap();

        assert_eq!(outcome, SettlementOutcome::Unknown { attempts: 10 });
        assert_eq!(rpc.status_calls(), 10);
        assert_eq!(start.elapsed(), policy.max_wait());
    }

    #[tokio::test(start_paused = true)]
    async fn rpc_errors_count_as_attempts() {
        let rpc = MockLedgerRpc::new(1).with_statuses([
            Err(RpcError::Other("timeout".to_string())),
            Ok(MockLedgerRpc::success(9)),
        ]);

        let outcome = settle("tx", &rpc, &SettlementPolicy::default()).await.unwrap();

        assert_eq!(
            outcome,
            SettlementOutcome::Success {
                value: 9,
                attempts: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_keeps_polling_by_default() {
        let failed = TransactionStatus {
            status: "error".to_string(),
            ..MockLedgerRpc::pending()
        };
        let rpc = MockLedgerRpc::new(1)
            .with_statuses([Ok(failed), Ok(MockLedgerRpc::success(1))]);

        let outcome = settle("tx", &rpc, &SettlementPolicy::default()).await.unwrap();

        assert!(matches!(outcome, SettlementOutcome::Success { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fast_status_stops_polling() {
        let failed = TransactionStatus {
            status: "ERROR".to_string(),
            ..MockLedgerRpc::pending()
        };
        let rpc = MockLedgerRpc::new(1).with_statuses([pending(), Ok(failed)]);
        let policy = SettlementPolicy {
            fail_fast_statuses: vec!["error".to_string()],
            ..SettlementPolicy::default()
        };

        let outcome = settle("tx", &rpc, &policy).await.unwrap();

        assert_eq!(
            outcome,
            SettlementOutcome::Failed {
                status: "ERROR".to_string(),
                attempts: 2
            }
        );
        assert_eq!(rpc.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_success_is_an_error() {
        let symbol = ScVal::Symbol(ScSymbol("oops".to_string().try_into().unwrap()));
        let rpc = MockLedgerRpc::new(1).with_statuses([Ok(MockLedgerRpc::success_with(symbol))]);

        let err = settle("tx", &rpc, &SettlementPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DecodeError::UnexpectedType(_)));
        assert_eq!(rpc.status_calls(), 1);
    }

    #[test]
    fn decode_rejects_missing_and_garbage_results() {
        let mut status = MockLedgerRpc::success(1);
        status.results.clear();
        assert!(matches!(
            decode_result_value(&status),
            Err(DecodeError::MissingResult)
        ));

        status.results.push(TransactionResult {
            xdr: "***".to_string(),
        });
        assert!(matches!(
            decode_result_value(&status),
            Err(DecodeError::Base64(_))
        ));

        status.results[0].xdr = base64::encode([0u8, 0, 0]);
        assert!(matches!(
            decode_result_value(&status),
            Err(DecodeError::Xdr(_))
        ));
    }

    #[test]
    fn decode_reads_u64() {
        let xdr = base64::encode(ScVal::U64(1004).to_xdr(Limits::none()).unwrap());
        let status = TransactionStatus {
            results: vec![TransactionResult { xdr }],
            ..MockLedgerRpc::success(0)
        };
        assert_eq!(decode_result_value(&status).unwrap(), 1004);
    }

    #[test]
    fn max_wait_matches_default_budget() {
        assert_eq!(
            SettlementPolicy::default().max_wait(),
            Duration::from_secs(45)
        );
        let single = SettlementPolicy {
            max_attempts: 1,
            ..SettlementPolicy::default()
        };
        assert_eq!(single.max_wait(), Duration::ZERO);
    }
}
