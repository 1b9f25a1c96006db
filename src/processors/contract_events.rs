//! Asset-contract events.
//!
//! Contracts wrapping a classic asset emit `transfer`, `mint`, `burn` and
//! `clawback` events. Any contract may emit events with those names, so an
//! event is only accepted when its emitter is the wrapper contract of the
//! asset named in its last topic. Events from other contracts are declined.
//!
//! Topic layouts:
//!
//! | kind     | topics                                   |
//! |----------|------------------------------------------|
//! | transfer | `transfer, from, to, asset`              |
//! | mint     | `mint, [admin,] to, asset`               |
//! | burn     | `burn, from, asset`                      |
//! | clawback | `clawback, [admin,] from, asset`         |
//!
//! The amount is the event data, either an `i128` or a map with an
//! `amount` entry.

use std::fmt;
use std::sync::Arc;

use super::{LedgerTransactionProcessor, MetaRegistry, ProcessorError, Result, Toid};
use crate::history::rows::ContractAssetEventRow;
use crate::history::LedgerBatch;
use crate::ledger::{asset_contract_id, network_id, LedgerCloseRecord, LedgerTransaction};
use crate::proto::{Asset, ContractEvent, ContractEventType, ScVal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetEventType {
    Transfer,
    Mint,
    Burn,
    Clawback,
}

impl AssetEventType {
    pub fn name(self) -> &'static str {
        match self {
            AssetEventType::Transfer => "transfer",
            AssetEventType::Mint => "mint",
            AssetEventType::Burn => "burn",
            AssetEventType::Clawback => "clawback",
        }
    }
}

impl fmt::Display for AssetEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetContractEvent {
    pub event_type: AssetEventType,
    pub asset: Asset,
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: i128,
}

type ParseResult = std::result::Result<AssetContractEvent, String>;

/// Parses the body of one kind of asset event, after the emitter has been
/// checked against the asset.
pub trait ContractEventVariant: Send + Sync {
    /// First-topic symbol this variant handles.
    fn symbol(&self) -> &'static str;

    /// `topics` excludes the leading symbol and the trailing asset.
    fn parse(&self, topics: &[ScVal], amount: i128, asset: Asset) -> ParseResult;
}

fn address(val: &ScVal, role: &str) -> std::result::Result<String, String> {
    val.as_address()
        .map(str::to_string)
        .ok_or_else(|| format!("{} topic is not an address", role))
}

struct Transfer;

impl ContractEventVariant for Transfer {
    fn symbol(&self) -> &'static str {
        "transfer"
    }

    fn parse(&self, topics: &[ScVal], amount: i128, asset: Asset) -> ParseResult {
        let [from, to] = topics else {
            return Err(format!("expected 2 address topics, found {}", topics.len()));
        };
        Ok(AssetContractEvent {
            event_type: AssetEventType::Transfer,
            asset,
            from: Some(address(from, "from")?),
            to: Some(address(to, "to")?),
            amount,
        })
    }
}

struct Mint;

impl ContractEventVariant for Mint {
    fn symbol(&self) -> &'static str {
        "mint"
    }

    fn parse(&self, topics: &[ScVal], amount: i128, asset: Asset) -> ParseResult {
        let to = match topics {
            [to] | [_, to] => to,
            _ => return Err(format!("expected 1 or 2 address topics, found {}", topics.len())),
        };
        Ok(AssetContractEvent {
            event_type: AssetEventType::Mint,
            asset,
            from: None,
            to: Some(address(to, "to")?),
            amount,
        })
    }
}

struct Burn;

impl ContractEventVariant for Burn {
    fn symbol(&self) -> &'static str {
        "burn"
    }

    fn parse(&self, topics: &[ScVal], amount: i128, asset: Asset) -> ParseResult {
        let [from] = topics else {
            return Err(format!("expected 1 address topic, found {}", topics.len()));
        };
        Ok(AssetContractEvent {
            event_type: AssetEventType::Burn,
            asset,
            from: Some(address(from, "from")?),
            to: None,
            amount,
        })
    }
}

struct Clawback;

impl ContractEventVariant for Clawback {
    fn symbol(&self) -> &'static str {
        "clawback"
    }

    fn parse(&self, topics: &[ScVal], amount: i128, asset: Asset) -> ParseResult {
        let from = match topics {
            [from] | [_, from] => from,
            _ => return Err(format!("expected 1 or 2 address topics, found {}", topics.len())),
        };
        Ok(AssetContractEvent {
            event_type: AssetEventType::Clawback,
            asset,
            from: Some(address(from, "from")?),
            to: None,
            amount,
        })
    }
}

fn event_amount(data: Option<&ScVal>) -> Option<i128> {
    let data = data?;
    data.as_i128()
        .or_else(|| data.map_get("amount").and_then(ScVal::as_i128))
}

#[derive(Clone)]
pub struct ContractEventRegistry {
    network_id: [u8; 32],
    variants: Vec<Arc<dyn ContractEventVariant>>,
}

impl ContractEventRegistry {
    pub fn empty(network_passphrase: &str) -> Self {
        Self {
            network_id: network_id(network_passphrase),
            variants: Vec::new(),
        }
    }

    pub fn standard(network_passphrase: &str) -> Self {
        let mut registry = Self::empty(network_passphrase);
        registry
            .register(Arc::new(Transfer))
            .register(Arc::new(Mint))
            .register(Arc::new(Burn))
            .register(Arc::new(Clawback));
        registry
    }

    pub fn register(&mut self, variant: Arc<dyn ContractEventVariant>) -> &mut Self {
        self.variants.push(variant);
        self
    }

    /// `Ok(None)` when the event is not an asset-contract event. An event
    /// from a genuine asset contract whose body does not parse is an error.
    pub fn parse(
        &self,
        tx: &LedgerTransaction,
        event: &ContractEvent,
    ) -> Result<Option<AssetContractEvent>> {
        if event.event_type != ContractEventType::Contract as i32 {
            return Ok(None);
        }
        let Some((first, rest)) = event.topics.split_first() else {
            return Ok(None);
        };
        let Some(symbol) = first.as_symbol() else {
            return Ok(None);
        };
        let Some(variant) = self.variants.iter().find(|v| v.symbol() == symbol) else {
            return Ok(None);
        };
        let Some((last, middle)) = rest.split_last() else {
            return Ok(None);
        };
        let Some(asset) = last.as_str().and_then(Asset::from_canonical) else {
            return Ok(None);
        };
        if event.contract_id[..] != asset_contract_id(&self.network_id, &asset)[..] {
            return Ok(None);
        }

        let malformed = |reason: String| ProcessorError::MalformedEvent {
            tx_hash: tx.hash_hex(),
            reason: format!("{} event: {}", symbol, reason),
        };
        let amount = event_amount(event.data.as_ref())
            .ok_or_else(|| malformed("missing i128 amount".to_string()))?;
        if amount < 0 {
            return Err(malformed(format!("negative amount {}", amount)));
        }
        variant
            .parse(middle, amount, asset)
            .map(Some)
            .map_err(malformed)
    }
}

impl fmt::Debug for ContractEventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.variants.iter().map(|v| v.symbol()))
            .finish()
    }
}

/// Writes `contract_asset_events` rows for successful transactions.
pub struct ContractEventProcessor {
    registry: Arc<ContractEventRegistry>,
    meta: Arc<MetaRegistry>,
}

impl ContractEventProcessor {
    pub fn new(registry: Arc<ContractEventRegistry>, meta: Arc<MetaRegistry>) -> Self {
        Self { registry, meta }
    }
}

impl LedgerTransactionProcessor for ContractEventProcessor {
    fn name(&self) -> &'static str {
        "contract_events"
    }

    fn process_transaction(
        &mut self,
        ledger: &LedgerCloseRecord,
        tx: &LedgerTransaction,
        batch: &mut LedgerBatch,
    ) -> Result<()> {
        if !tx.successful() {
            return Ok(());
        }
        let transaction_id = Toid::transaction(ledger.sequence(), tx.index)?.to_i64();
        let mut event_index = 0u32;

        for (op_index, event) in self.meta.operation_events(&tx.meta) {
            let Some(parsed) = self.registry.parse(tx, event)? else {
                continue;
            };
            batch.contract_events.add(ContractAssetEventRow {
                transaction_id,
                event_index,
                ledger_sequence: ledger.sequence(),
                operation_index: op_index as u32,
                contract_id: hex::encode(&event.contract_id),
                event_type: parsed.event_type.name().to_string(),
                asset: parsed.asset.canonical(),
                from_address: parsed.from,
                to_address: parsed.to,
                amount: parsed.amount.to_string(),
            })?;
            event_index += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerTransactionReader;
    use crate::proto::{Int128Parts, ScMap, ScMapEntry};
    use crate::test_utils::{asset_event, LedgerBuilder, TEST_PASSPHRASE};

    fn usd() -> Asset {
        Asset::credit("USD", "GISSUER")
    }

    fn tx() -> LedgerTransaction {
        let record = LedgerBuilder::new(3).payment("GA", "GB", 1).build();
        LedgerTransactionReader::new(record, TEST_PASSPHRASE)
            .unwrap()
            .read_all()
            .unwrap()
            .remove(0)
    }

    fn parse(event: &ContractEvent) -> Result<Option<AssetContractEvent>> {
        ContractEventRegistry::standard(TEST_PASSPHRASE).parse(&tx(), event)
    }

    #[test]
    fn test_transfer() {
        let event = asset_event(
            &usd(),
            vec![ScVal::symbol("transfer"), ScVal::address("GA"), ScVal::address("CB")],
            ScVal::i128(77),
        );
        let parsed = parse(&event).unwrap().unwrap();
        assert_eq!(parsed.event_type, AssetEventType::Transfer);
        assert_eq!(parsed.from.as_deref(), Some("GA"));
        assert_eq!(parsed.to.as_deref(), Some("CB"));
        assert_eq!(parsed.amount, 77);
    }

    #[test]
    fn test_mint_with_and_without_admin() {
        for topics in [
            vec![ScVal::symbol("mint"), ScVal::address("GADMIN"), ScVal::address("GB")],
            vec![ScVal::symbol("mint"), ScVal::address("GB")],
        ] {
            let parsed = parse(&asset_event(&usd(), topics, ScVal::i128(5))).unwrap().unwrap();
            assert_eq!(parsed.event_type, AssetEventType::Mint);
            assert_eq!(parsed.from, None);
            assert_eq!(parsed.to.as_deref(), Some("GB"));
        }
    }

    #[test]
    fn test_map_amount() {
        let data = ScVal {
            value: Some(crate::proto::sc_val::Value::Map(ScMap {
                entries: vec![ScMapEntry {
                    key: Some(ScVal::symbol("amount")),
                    val: Some(ScVal {
                        value: Some(crate::proto::sc_val::Value::I128(Int128Parts::from_i128(9))),
                    }),
                }],
            })),
        };
        let event = asset_event(&usd(), vec![ScVal::symbol("burn"), ScVal::address("GA")], data);
        assert_eq!(parse(&event).unwrap().unwrap().amount, 9);
    }

    #[test]
    fn test_foreign_contract_declined() {
        let mut event = asset_event(
            &usd(),
            vec![ScVal::symbol("transfer"), ScVal::address("GA"), ScVal::address("GB")],
            ScVal::i128(1),
        );
        event.contract_id = vec![7; 32];
        assert!(parse(&event).unwrap().is_none());
    }

    #[test]
    fn test_unknown_symbol_and_system_events_declined() {
        let event = asset_event(&usd(), vec![ScVal::symbol("approve")], ScVal::i128(1));
        assert!(parse(&event).unwrap().is_none());

        let mut event = asset_event(&usd(), vec![ScVal::symbol("burn"), ScVal::address("GA")], ScVal::i128(1));
        event.event_type = ContractEventType::System as i32;
        assert!(parse(&event).unwrap().is_none());
    }

    #[test]
    fn test_genuine_contract_bad_shape_is_error() {
        let event = asset_event(&usd(), vec![ScVal::symbol("transfer"), ScVal::address("GA")], ScVal::i128(1));
        assert!(matches!(parse(&event), Err(ProcessorError::MalformedEvent { .. })));

        let event = asset_event(
            &usd(),
            vec![ScVal::symbol("burn"), ScVal::address("GA")],
            ScVal::i128(-1),
        );
        assert!(matches!(parse(&event), Err(ProcessorError::MalformedEvent { .. })));
    }

    #[test]
    fn test_processor_reads_events_per_meta_version() {
        for version in [3, 4, 5] {
            let record = LedgerBuilder::new(11)
                .meta_version(version)
                .invoke_contract(
                    "GA",
                    vec![asset_event(
                        &usd(),
                        vec![ScVal::symbol("transfer"), ScVal::address("GA"), ScVal::address("GB")],
                        ScVal::i128(3),
                    )],
                )
                .build();
            let txs = LedgerTransactionReader::new(record.clone(), TEST_PASSPHRASE)
                .unwrap()
                .read_all()
                .unwrap();
            let mut processor = ContractEventProcessor::new(
                Arc::new(ContractEventRegistry::standard(TEST_PASSPHRASE)),
                Arc::new(MetaRegistry::standard()),
            );
            let mut batch = LedgerBatch::new(10);
            processor.process_transaction(&record, &txs[0], &mut batch).unwrap();

            let rows = batch.contract_events.rows();
            assert_eq!(rows.len(), 1, "meta v{}", version);
            assert_eq!(rows[0].asset, "USD:GISSUER");
            assert_eq!(rows[0].amount, "3");
            assert_eq!(rows[0].operation_index, 0);
        }
    }
}
