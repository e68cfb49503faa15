//! Per-pool position slots with exclusive access.

use clmm_keeper_domain::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Slot holding the managed position of one pool, if any.
///
/// The lock is held for a pool's whole rebalance and harvest sequence, so
/// write operations on one position never interleave.
pub type PositionSlot = Arc<Mutex<Option<ManagedPosition>>>;

/// All position slots of a control loop, keyed by pool.
#[derive(Debug, Default)]
pub struct PositionBook {
    slots: BTreeMap<PoolId, PositionSlot>,
}

impl PositionBook {
    /// Creates an empty slot for every pool.
    pub fn new<'a>(pools: impl IntoIterator<Item = &'a PoolId>) -> Self {
        Self {
            slots: pools
                .into_iter()
                .map(|id| (id.clone(), Arc::new(Mutex::new(None))))
                .collect(),
        }
    }

    pub fn slot(&self, pool: &PoolId) -> Option<PositionSlot> {
        self.slots.get(pool).cloned()
    }

    /// Copies of every managed position, in pool order.
    pub async fn positions(&self) -> Vec<ManagedPosition> {
        let mut positions = Vec::with_capacity(self.slots.len());
        for slot in self.slots.values() {
            if let Some(position) = slot.lock().await.as_ref() {
                positions.push(position.clone());
            }
        }
        positions
    }

    /// Places previously stored positions into their slots. Positions of pools
    /// that are no longer configured are ignored. Returns how many were placed.
    pub async fn restore(&self, positions: Vec<ManagedPosition>) -> usize {
        let mut placed = 0;
        for position in positions {
            match self.slots.get(&position.pool_id) {
                Some(slot) => {
                    *slot.lock().await = Some(position);
                    placed += 1;
                }
                None => warn!(
                    pool = %position.pool_id,
                    position = %position.position_id,
                    "Stored position belongs to an unconfigured pool, ignoring"
                ),
            }
        }
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position(pool: &str) -> ManagedPosition {
        ManagedPosition::opened(
            PoolId::new(pool),
            PositionId::new(format!("{pool}-pos")),
            TickRange::new(90, 110),
            100,
            TokenAmounts::new(dec!(1), dec!(1)),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_restore_only_configured_pools() {
        let pools = [PoolId::new("a"), PoolId::new("b")];
        let book = PositionBook::new(&pools);

        let placed = book.restore(vec![position("a"), position("zzz")]).await;

        assert_eq!(placed, 1);
        let positions = book.positions().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].pool_id, PoolId::new("a"));
    }

    #[tokio::test]
    async fn test_slot_is_exclusive() {
        let pools = [PoolId::new("a")];
        let book = PositionBook::new(&pools);
        let slot = book.slot(&pools[0]).unwrap();

        let guard = slot.lock().await;
        assert!(book.slot(&pools[0]).unwrap().try_lock().is_err());
        drop(guard);
        assert!(book.slot(&pools[0]).unwrap().try_lock().is_ok());
    }
}
