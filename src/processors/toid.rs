//! Total order ids.
//!
//! A 64-bit id ordering every ledger, transaction and operation: the ledger
//! sequence in the high 32 bits, the 1-based transaction order in the next 20
//! and the 1-based operation order in the low 12. Transactions use operation
//! order zero, so a transaction sorts directly before its operations.

use super::{ProcessorError, Result};

const TX_BITS: u32 = 20;
const OP_BITS: u32 = 12;
const TX_MAX: u32 = (1 << TX_BITS) - 1;
const OP_MAX: u32 = (1 << OP_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Toid {
    pub ledger: u32,
    pub tx_order: u32,
    pub op_order: u32,
}

impl Toid {
    pub fn new(ledger: u32, tx_order: u32, op_order: u32) -> Result<Self> {
        if ledger > i32::MAX as u32 || tx_order > TX_MAX || op_order > OP_MAX {
            return Err(ProcessorError::IdOverflow {
                ledger,
                tx_order,
                op_order,
            });
        }
        Ok(Self {
            ledger,
            tx_order,
            op_order,
        })
    }

    pub fn transaction(ledger: u32, tx_order: u32) -> Result<Self> {
        Self::new(ledger, tx_order, 0)
    }

    /// `op_index` is 0-based.
    pub fn operation(ledger: u32, tx_order: u32, op_index: usize) -> Result<Self> {
        let op_order = u32::try_from(op_index + 1).unwrap_or(u32::MAX);
        Self::new(ledger, tx_order, op_order)
    }

    pub fn to_i64(self) -> i64 {
        (i64::from(self.ledger) << (TX_BITS + OP_BITS))
            | (i64::from(self.tx_order) << OP_BITS)
            | i64::from(self.op_order)
    }

    pub fn parse(id: i64) -> Self {
        Self {
            ledger: (id >> (TX_BITS + OP_BITS)) as u32,
            tx_order: ((id >> OP_BITS) & i64::from(TX_MAX)) as u32,
            op_order: (id & i64::from(OP_MAX)) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(Toid::new(1, 0, 0).unwrap().to_i64(), 1 << 32);
        assert_eq!(Toid::new(1, 1, 0).unwrap().to_i64(), (1 << 32) | (1 << 12));
        assert_eq!(Toid::new(1, 1, 3).unwrap().to_i64(), (1 << 32) | (1 << 12) | 3);
    }

    #[test]
    fn test_parse_inverts() {
        let id = Toid::operation(123, 45, 6).unwrap();
        assert_eq!(Toid::parse(id.to_i64()), id);
    }

    #[test]
    fn test_transaction_sorts_before_its_operations() {
        let tx = Toid::transaction(9, 2).unwrap().to_i64();
        let op = Toid::operation(9, 2, 0).unwrap().to_i64();
        let next_tx = Toid::transaction(9, 3).unwrap().to_i64();
        assert!(tx < op && op < next_tx);
    }

    #[test]
    fn test_overflow_is_error() {
        assert!(Toid::new(1, 1 << 20, 0).is_err());
        assert!(Toid::operation(1, 1, 4095).is_err());
    }
}
