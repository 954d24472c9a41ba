//! Builds the signed `increment` invocation transaction.
//!
//! ## Shape
//!
//! ```text
//! Transaction (fee 100, seq = account seq + 1, time bounds 0/0)
//! └─ InvokeHostFunction
//!    └─ InvokeContract { contract, "increment", [U64(amount)] }
//! Soroban data footprint
//!    read-only : ContractData(contract, LedgerKeyContractInstance)
//!    read-write: ContractData(contract, Symbol("COUNTER"))
//! ```
//!
//! The footprint is fixed: the builder cannot introspect contracts and only
//! knows the single-counter layout declared by [`READ_ONLY_FOOTPRINT`] and
//! [`READ_WRITE_FOOTPRINT`].

use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    ContractDataDurability, ContractId, DecoratedSignature, Hash, HostFunction,
    InvokeContractArgs, InvokeHostFunctionOp, LedgerFootprint, LedgerKey, LedgerKeyContractData,
    Limits, Memo, MuxedAccount, Operation, OperationBody, Preconditions, ScAddress, ScBytes,
    ScSymbol, ScVal, SequenceNumber, Signature as XdrSignature, SignatureHint, SorobanResources,
    SorobanTransactionData, SorobanTransactionDataExt, StringM, TimeBounds, TimePoint,
    Transaction, TransactionEnvelope, TransactionExt, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, TransactionV1Envelope, Uint256, VecM, WriteXdr,
};

use super::request::ContractIdentifier;

/// Contract function invoked by every relayed action.
pub const INCREMENT_FN: &str = "increment";

/// Storage symbol of the counter the contract mutates.
pub const COUNTER_SYMBOL: &str = "COUNTER";

/// Fixed inclusion fee in stroops.
pub const BASE_FEE: u32 = 100;

/// Ledger entries the builder declares in every footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootprintKey {
    /// The contract instance entry (code reference).
    ContractCode,
    /// The persistent `COUNTER` entry.
    Counter,
}

pub const READ_ONLY_FOOTPRINT: &[FootprintKey] = &[FootprintKey::ContractCode];
pub const READ_WRITE_FOOTPRINT: &[FootprintKey] = &[FootprintKey::Counter];

impl FootprintKey {
    pub fn ledger_key(self, contract: &ContractIdentifier) -> Result<LedgerKey, BuildError> {
        let key = match self {
            FootprintKey::ContractCode => ScVal::LedgerKeyContractInstance,
            FootprintKey::Counter => ScVal::Symbol(symbol(COUNTER_SYMBOL)?),
        };
        Ok(LedgerKey::ContractData(LedgerKeyContractData {
            contract: contract_address(contract),
            key,
            durability: ContractDataDurability::Persistent,
        }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("XDR encoding failed: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),
    #[error("account sequence {0} cannot be advanced")]
    SequenceOverflow(i64),
}

/// Source account as fetched from the ledger immediately before building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceAccount {
    pub public_key: [u8; 32],
    /// Current (last used) sequence number.
    pub sequence: i64,
}

/// A built and signed invocation, ready for a single submission.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    envelope: TransactionV1Envelope,
    hash: [u8; 32],
}

impl SignedTransaction {
    pub fn envelope(&self) -> TransactionEnvelope {
        TransactionEnvelope::Tx(self.envelope.clone())
    }

    pub fn transaction(&self) -> &Transaction {
        &self.envelope.tx
    }

    pub fn signatures(&self) -> &[DecoratedSignature] {
        self.envelope.signatures.as_slice()
    }

    /// Network-bound transaction hash (what the signature covers).
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Hex transaction id, 64 characters.
    pub fn id(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn fee(&self) -> u32 {
        self.envelope.tx.fee
    }

    pub fn sequence(&self) -> i64 {
        self.envelope.tx.seq_num.0
    }

    pub fn preconditions(&self) -> &Preconditions {
        &self.envelope.tx.cond
    }

    pub fn footprint(&self) -> Option<&LedgerFootprint> {
        match &self.envelope.tx.ext {
            TransactionExt::V1(data) => Some(&data.resources.footprint),
            TransactionExt::V0 => None,
        }
    }

    pub fn invocation(&self) -> Option<&InvokeContractArgs> {
        let op = self.envelope.tx.operations.first()?;
        match &op.body {
            OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
                host_function: HostFunction::InvokeContract(args),
                ..
            }) => Some(args),
            _ => None,
        }
    }

    /// Ordered argument view: contract id bytes, function symbol, then the
    /// call arguments.
    pub fn arguments(&self) -> Option<Vec<ScVal>> {
        let args = self.invocation()?;
        let ScAddress::Contract(ContractId(Hash(contract))) = &args.contract_address else {
            return None;
        };
        let mut out = Vec::with_capacity(2 + args.args.len());
        out.push(ScVal::Bytes(ScBytes(contract.to_vec().try_into().ok()?)));
        out.push(ScVal::Symbol(args.function_name.clone()));
        out.extend(args.args.iter().cloned());
        Some(out)
    }

    /// Base64 XDR of the full envelope, as submitted to the RPC.
    pub fn to_xdr_base64(&self) -> Result<String, BuildError> {
        let bytes = self.envelope().to_xdr(Limits::none())?;
        Ok(base64::encode(bytes))
    }
}

/// SHA-256 of the network passphrase.
pub fn network_id(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

pub fn contract_address(contract: &ContractIdentifier) -> ScAddress {
    ScAddress::Contract(ContractId(Hash(*contract.as_bytes())))
}

fn symbol(name: &str) -> Result<ScSymbol, BuildError> {
    Ok(ScSymbol(StringM::try_from(name.to_string())?))
}

fn transaction_hash(tx: &Transaction, network_id: &[u8; 32]) -> Result<[u8; 32], BuildError> {
    let payload = TransactionSignaturePayload {
        network_id: Hash(*network_id),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    let bytes = payload.to_xdr(Limits::none())?;
    Ok(Sha256::digest(&bytes).into())
}

/// Build and sign the `increment(amount)` invocation.
///
/// `account.sequence` must be fresh: a stale value is only detected by the
/// network and is never retried here.
pub fn build(
    contract: &ContractIdentifier,
    account: &SourceAccount,
    signing_key: &SigningKey,
    amount: u64,
    network_passphrase: &str,
) -> Result<SignedTransaction, BuildError> {
    let seq_num = account
        .sequence
        .checked_add(1)
        .ok_or(BuildError::SequenceOverflow(account.sequence))?;

    let host_function = HostFunction::InvokeContract(InvokeContractArgs {
        contract_address: contract_address(contract),
        function_name: symbol(INCREMENT_FN)?,
        args: vec![ScVal::U64(amount)].try_into()?,
    });

    let read_only = READ_ONLY_FOOTPRINT
        .iter()
        .map(|k| k.ledger_key(contract))
        .collect::<Result<Vec<_>, _>>()?;
    let read_write = READ_WRITE_FOOTPRINT
        .iter()
        .map(|k| k.ledger_key(contract))
        .collect::<Result<Vec<_>, _>>()?;

    let soroban_data = SorobanTransactionData {
        ext: SorobanTransactionDataExt::V0,
        resources: SorobanResources {
            footprint: LedgerFootprint {
                read_only: read_only.try_into()?,
                read_write: read_write.try_into()?,
            },
            instructions: 0,
            disk_read_bytes: 0,
            write_bytes: 0,
        },
        resource_fee: 0,
    };

    let operation = Operation {
        source_account: None,
        body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
            host_function,
            auth: VecM::default(),
        }),
    };

    let tx = Transaction {
        source_account: MuxedAccount::Ed25519(Uint256(account.public_key)),
        fee: BASE_FEE,
        seq_num: SequenceNumber(seq_num),
        // Unbounded: zero max_time means no upper bound.
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(0),
        }),
        memo: Memo::None,
        operations: vec![operation].try_into()?,
        ext: TransactionExt::V1(soroban_data),
    };

    let hash = transaction_hash(&tx, &network_id(network_passphrase))?;
    let signature = signing_key.sign(&hash);

    let public = signing_key.verifying_key().to_bytes();
    let mut hint = [0u8; 4];
    hint.copy_from_slice(&public[28..]);
    let decorated = DecoratedSignature {
        hint: SignatureHint(hint),
        signature: XdrSignature(signature.to_bytes().to_vec().try_into()?),
    };

    Ok(SignedTransaction {
        envelope: TransactionV1Envelope {
            tx,
            signatures: vec![decorated].try_into()?,
        },
        hash,
    })
}
