//! Transaction-meta versions.
//!
//! Where contract events live, and what an elided meta looks like, depends on
//! the meta version. Each supported version is a [`MetaVariant`]; versions no
//! variant claims carry no events and are stored as-is.

use std::sync::Arc;

use crate::proto::{ContractEvent, TransactionMeta};

pub trait MetaVariant: Send + Sync {
    fn version(&self) -> i32;

    /// Contract events paired with the 0-based index of the emitting operation.
    fn operation_events<'a>(&self, meta: &'a TransactionMeta) -> Vec<(usize, &'a ContractEvent)>;

    /// Strip `meta` down to its version tag.
    fn elide(&self, meta: &mut TransactionMeta) {
        *meta = TransactionMeta {
            v: meta.v,
            ..TransactionMeta::default()
        };
    }
}

/// v1 and v2 predate contract events.
struct ClassicMeta(i32);

impl MetaVariant for ClassicMeta {
    fn version(&self) -> i32 {
        self.0
    }

    fn operation_events<'a>(&self, _meta: &'a TransactionMeta) -> Vec<(usize, &'a ContractEvent)> {
        Vec::new()
    }
}

/// v3 keeps the events of its single host-function operation in the soroban meta.
struct SorobanMeta;

impl MetaVariant for SorobanMeta {
    fn version(&self) -> i32 {
        3
    }

    fn operation_events<'a>(&self, meta: &'a TransactionMeta) -> Vec<(usize, &'a ContractEvent)> {
        meta.soroban_meta
            .iter()
            .flat_map(|soroban| soroban.events.iter())
            .map(|event| (0, event))
            .collect()
    }
}

/// v4 and later attach events to the operation that emitted them.
struct PerOperationMeta(i32);

impl MetaVariant for PerOperationMeta {
    fn version(&self) -> i32 {
        self.0
    }

    fn operation_events<'a>(&self, meta: &'a TransactionMeta) -> Vec<(usize, &'a ContractEvent)> {
        meta.operations
            .iter()
            .enumerate()
            .flat_map(|(index, op)| op.events.iter().map(move |event| (index, event)))
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct MetaRegistry {
    variants: Vec<Arc<dyn MetaVariant>>,
}

impl MetaRegistry {
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry
            .register(Arc::new(ClassicMeta(1)))
            .register(Arc::new(ClassicMeta(2)))
            .register(Arc::new(SorobanMeta))
            .register(Arc::new(PerOperationMeta(4)))
            .register(Arc::new(PerOperationMeta(5)));
        registry
    }

    pub fn register(&mut self, variant: Arc<dyn MetaVariant>) -> &mut Self {
        self.variants.push(variant);
        self
    }

    fn variant(&self, version: i32) -> Option<&Arc<dyn MetaVariant>> {
        self.variants.iter().find(|v| v.version() == version)
    }

    pub fn supports(&self, version: i32) -> bool {
        self.variant(version).is_some()
    }

    pub fn operation_events<'a>(&self, meta: &'a TransactionMeta) -> Vec<(usize, &'a ContractEvent)> {
        self.variant(meta.v)
            .map(|v| v.operation_events(meta))
            .unwrap_or_default()
    }

    /// Elide `meta` in place. Returns `false`, leaving it untouched, for an
    /// unknown version.
    pub fn elide(&self, meta: &mut TransactionMeta) -> bool {
        match self.variant(meta.v) {
            Some(variant) => {
                variant.elide(meta);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for MetaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.variants.iter().map(|v| v.version()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{OperationMeta, ScVal, SorobanTransactionMeta};

    fn event(name: &str) -> ContractEvent {
        ContractEvent {
            contract_id: vec![1; 32],
            event_type: 1,
            topics: vec![ScVal::symbol(name)],
            data: None,
        }
    }

    fn meta(v: i32) -> TransactionMeta {
        TransactionMeta {
            v,
            operations: vec![
                OperationMeta {
                    changes: vec![],
                    events: vec![event("a")],
                },
                OperationMeta {
                    changes: vec![],
                    events: vec![event("b"), event("c")],
                },
            ],
            soroban_meta: Some(SorobanTransactionMeta {
                events: vec![event("s")],
                return_value: None,
            }),
            ..TransactionMeta::default()
        }
    }

    fn names(events: Vec<(usize, &ContractEvent)>) -> Vec<(usize, String)> {
        events
            .into_iter()
            .map(|(i, e)| (i, e.topics[0].as_symbol().unwrap_or_default().to_string()))
            .collect()
    }

    #[test]
    fn test_event_location_per_version() {
        let registry = MetaRegistry::standard();

        assert!(registry.operation_events(&meta(2)).is_empty());
        assert_eq!(names(registry.operation_events(&meta(3))), vec![(0, "s".to_string())]);
        for v in [4, 5] {
            assert_eq!(
                names(registry.operation_events(&meta(v))),
                vec![(0, "a".to_string()), (1, "b".to_string()), (1, "c".to_string())]
            );
        }
    }

    #[test]
    fn test_elide_keeps_version() {
        let registry = MetaRegistry::standard();
        let mut m = meta(5);
        assert!(registry.elide(&mut m));
        assert_eq!(m.v, 5);
        assert!(m.operations.is_empty());
        assert!(m.soroban_meta.is_none());
    }

    #[test]
    fn test_unknown_version_untouched() {
        let registry = MetaRegistry::standard();
        let mut m = meta(9);
        let before = m.clone();

        assert!(!registry.supports(9));
        assert!(!registry.elide(&mut m));
        assert_eq!(m, before);
        assert!(registry.operation_events(&m).is_empty());
    }
}
