//! Typed views of on-ledger arena state.

use alloy::primitives::U256;

/// Snapshot of one market on the settlement contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaView {
    pub total_yes_stake: U256,
    pub total_no_stake: U256,
    pub resolved: bool,
    pub outcome_yes: bool,
    pub exists: bool,
}

impl ArenaView {
    pub fn total_stake(&self) -> U256 {
        self.total_yes_stake.saturating_add(self.total_no_stake)
    }

    /// A market is worth a settlement transaction only if it exists and
    /// someone has staked on it.
    pub fn is_settleable(&self) -> bool {
        self.exists && !self.total_stake().is_zero()
    }

    /// Pool of the side that won under `outcome_yes`.
    pub fn winner_total(&self, outcome_yes: bool) -> U256 {
        if outcome_yes {
            self.total_yes_stake
        } else {
            self.total_no_stake
        }
    }
}

/// One wallet's position in a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserStake {
    pub yes_stake: U256,
    pub no_stake: U256,
    pub has_claimed: bool,
}

impl UserStake {
    pub fn stake_on(&self, yes_side: bool) -> U256 {
        if yes_side {
            self.yes_stake
        } else {
            self.no_stake
        }
    }
}
