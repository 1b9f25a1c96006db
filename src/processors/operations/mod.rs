//! Operation rows and the registry of operation kinds.
//!
//! Each operation kind is a variant registered in an [`OperationRegistry`].
//! Dispatch asks the variants in registration order; the first to claim the
//! operation supplies its details, participants and assets. Kinds introduced
//! by a protocol newer than the ledger's are not offered to it.

use std::sync::Arc;

use tracing::debug;

use super::{LedgerTransactionProcessor, ProcessorError, Result, Toid};
use crate::history::rows::HistoryOperationRow;
use crate::history::LedgerBatch;
use crate::ledger::{LedgerCloseRecord, LedgerTransaction};
use crate::proto::{Asset, Operation, OperationType};

mod variants;

use variants::Typed;

/// First protocol version carrying experimental operation kinds.
pub const EXPERIMENTAL_PROTOCOL_VERSION: u32 = 25;

/// Operation details, serialized as a JSON object.
pub type Details = serde_json::Map<String, serde_json::Value>;

/// One operation within its transaction.
#[derive(Debug, Clone, Copy)]
pub struct OperationContext<'a> {
    pub tx: &'a LedgerTransaction,
    pub op: &'a Operation,
    /// 0-based position within the transaction.
    pub index: usize,
    pub protocol_version: u32,
}

impl<'a> OperationContext<'a> {
    pub fn new(tx: &'a LedgerTransaction, index: usize, protocol_version: u32) -> Option<Self> {
        tx.operations().get(index).map(|op| Self {
            tx,
            op,
            index,
            protocol_version,
        })
    }

    /// Effective source account of the operation.
    pub fn source(&self) -> &'a str {
        self.tx.operation_source(self.index)
    }

    pub fn malformed(&self, kind: &'static str, reason: impl Into<String>) -> ProcessorError {
        ProcessorError::MalformedOperation {
            tx_hash: self.tx.hash_hex(),
            index: self.index,
            kind,
            reason: reason.into(),
        }
    }
}

/// Handles one family of operations.
///
/// Each method returns `None` to decline the operation, leaving it to the
/// next variant.
pub trait OperationVariant: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lowest protocol version the variant is offered.
    fn min_protocol(&self) -> u32 {
        0
    }

    fn details(&self, ctx: &OperationContext<'_>) -> Option<Result<Details>>;

    /// Accounts participating besides the operation source.
    fn participants(&self, ctx: &OperationContext<'_>) -> Option<Result<Vec<String>>>;

    fn assets(&self, ctx: &OperationContext<'_>) -> Option<Result<Vec<Asset>>>;
}

/// Ordered collection of operation variants.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    variants: Vec<Arc<dyn OperationVariant>>,
}

impl OperationRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in operation kind.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Arc::new(Typed::<variants::CreateAccount>::new()))
            .register(Arc::new(Typed::<variants::Payment>::new()))
            .register(Arc::new(Typed::<variants::PathPaymentStrictReceive>::new()))
            .register(Arc::new(Typed::<variants::ChangeTrust>::new()))
            .register(Arc::new(Typed::<variants::AccountMerge>::new()))
            .register(Arc::new(Typed::<variants::ManageData>::new()))
            .register(Arc::new(Typed::<variants::BumpSequence>::new()))
            .register(Arc::new(Typed::<variants::CreateClaimableBalance>::new()))
            .register(Arc::new(Typed::<variants::ClaimClaimableBalance>::new()))
            .register(Arc::new(Typed::<variants::Clawback>::new()))
            .register(Arc::new(Typed::<variants::InvokeHostFunction>::new()))
            .register(Arc::new(Typed::<variants::HelloWorld>::new()));
        registry
    }

    pub fn register(&mut self, variant: Arc<dyn OperationVariant>) -> &mut Self {
        self.variants.push(variant);
        self
    }

    /// Names of the variants offered at `protocol_version`.
    pub fn for_protocol(&self, protocol_version: u32) -> Vec<&'static str> {
        self.offered(protocol_version).map(|v| v.name()).collect()
    }

    fn offered(&self, protocol_version: u32) -> impl Iterator<Item = &Arc<dyn OperationVariant>> {
        self.variants
            .iter()
            .filter(move |v| v.min_protocol() <= protocol_version)
    }

    /// Details of the operation, `None` on a dispatch miss.
    pub fn details(&self, ctx: &OperationContext<'_>) -> Result<Option<Details>> {
        self.offered(ctx.protocol_version)
            .find_map(|v| v.details(ctx))
            .transpose()
    }

    pub fn participants(&self, ctx: &OperationContext<'_>) -> Result<Option<Vec<String>>> {
        self.offered(ctx.protocol_version)
            .find_map(|v| v.participants(ctx))
            .transpose()
    }

    pub fn assets(&self, ctx: &OperationContext<'_>) -> Result<Option<Vec<Asset>>> {
        self.offered(ctx.protocol_version)
            .find_map(|v| v.assets(ctx))
            .transpose()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.variants.iter().map(|v| v.name()))
            .finish()
    }
}

/// Name stored in `type_name`; kinds unknown to this build are numbered.
pub fn operation_type_name(op_type: i32) -> String {
    OperationType::try_from(op_type)
        .map(|t| t.name().to_string())
        .unwrap_or_else(|_| format!("unknown_{}", op_type))
}

/// Writes one `history_operations` row per operation, for failed
/// transactions too.
pub struct OperationProcessor {
    registry: Arc<OperationRegistry>,
}

impl OperationProcessor {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }
}

impl LedgerTransactionProcessor for OperationProcessor {
    fn name(&self) -> &'static str {
        "operations"
    }

    fn process_transaction(
        &mut self,
        ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        batch: &mut LedgerBatch,
    ) -> Result<()> {
        let transaction_id = Toid::transaction(ledger.sequence(), tx.index)?.to_i64();

        for index in 0..tx.operations().len() {
            let Some(ctx) = OperationContext::new(tx, index, ledger.protocol_version()) else {
                continue;
            };
            let details = match self.registry.details(&ctx)? {
                Some(details) => details,
                None => {
                    debug!(
                        ledger = ledger.sequence(),
                        tx = %tx.hash_hex(),
                        index,
                        op_type = ctx.op.op_type,
                        "No operation variant claimed operation"
                    );
                    Details::new()
                }
            };

            batch.operations.add(HistoryOperationRow {
                id: Toid::operation(ledger.sequence(), tx.index, index)?.to_i64(),
                transaction_id,
                application_order: index as u32 + 1,
                op_type: ctx.op.op_type,
                type_name: operation_type_name(ctx.op.op_type),
                details: serde_json::to_string(&details)?,
                source_account: ctx.source().to_string(),
                successful: tx.successful(),
            })?;
        }
        Ok(())
    }
}
