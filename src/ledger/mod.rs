//! Gateway to the BangerArenas settlement contract.
//!
//! Reads go through the public RPC; resolutions are signed by the oracle
//! key, a dedicated identity that never holds user funds. Every call is
//! bounded by a timeout so a stuck RPC node cannot stall a tick forever.

pub mod abi;
pub mod types;

pub use types::{ArenaView, UserStake};

use crate::config::LedgerConfig;
use abi::IBangerArenas;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::future::IntoFuture;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid oracle key: {0}")]
    Signer(String),
    #[error("invalid contract address: {0}")]
    Address(String),
    #[error("rpc transport error: {0}")]
    Transport(String),
    #[error("contract call failed: {0}")]
    Call(#[from] alloy::contract::Error),
    #[error("waiting for receipt failed: {0}")]
    Receipt(String),
    #[error("{op} timed out after {secs}s")]
    Timeout { op: &'static str, secs: u64 },
    #[error("resolution transaction {0} reverted")]
    Reverted(TxHash),
    #[error("arena index {0} is not a valid market id")]
    InvalidIndex(i64),
}

/// The two operations the resolution tick needs from the ledger.
#[async_trait]
pub trait LedgerGateway: Send + Sync + 'static {
    async fn arena_view(&self, arena_index: i64) -> Result<ArenaView, LedgerError>;

    /// Submit and confirm a resolution. Returns the transaction hash once
    /// the receipt reports success.
    async fn resolve_arena(&self, arena_index: i64, outcome_yes: bool)
        -> Result<TxHash, LedgerError>;
}

pub struct ArenaLedger {
    contract: IBangerArenas::IBangerArenasInstance<DynProvider>,
    oracle: Address,
    call_timeout: Duration,
    receipt_timeout: Duration,
}

impl ArenaLedger {
    /// Build a signing provider for the oracle key and bind the contract.
    pub async fn connect(cfg: &LedgerConfig) -> Result<Self, LedgerError> {
        let signer = PrivateKeySigner::from_str(cfg.oracle_private_key.trim())
            .map_err(|e| LedgerError::Signer(e.to_string()))?;
        let oracle = signer.address();
        let address = Address::from_str(cfg.contract_address.trim())
            .map_err(|e| LedgerError::Address(e.to_string()))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(&cfg.rpc_url)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .erased();

        info!(contract = %address, oracle = %oracle, "ledger gateway connected");

        Ok(Self {
            contract: IBangerArenas::new(address, provider),
            oracle,
            call_timeout: Duration::from_secs(cfg.call_timeout_secs),
            receipt_timeout: Duration::from_secs(cfg.receipt_timeout_secs),
        })
    }

    pub fn oracle_address(&self) -> Address {
        self.oracle
    }

    /// Compare the contract's configured oracle with our signer. A mismatch
    /// means every resolution will revert.
    pub async fn verify_oracle(&self) -> Result<bool, LedgerError> {
        let onchain = self
            .bounded("oracle", self.contract.oracle().call())
            .await??;
        if onchain != self.oracle {
            warn!(
                contract_oracle = %onchain,
                signer = %self.oracle,
                "oracle key does not match contract oracle, resolutions will revert"
            );
        }
        Ok(onchain == self.oracle)
    }

    pub async fn user_stake(&self, arena_index: i64, user: Address) -> Result<UserStake, LedgerError> {
        let id = market_id(arena_index)?;
        let r = self
            .bounded("getUserStake", self.contract.getUserStake(id, user).call())
            .await??;
        Ok(UserStake {
            yes_stake: r.yesStake,
            no_stake: r.noStake,
            has_claimed: r.hasClaimed,
        })
    }

    /// The contract's own payout formula, evaluated remotely.
    pub async fn preview_payout(
        &self,
        user_stake: U256,
        winner_total: U256,
        view: &ArenaView,
    ) -> Result<U256, LedgerError> {
        let payout = self
            .bounded(
                "previewPayout",
                self.contract
                    .previewPayout(
                        user_stake,
                        winner_total,
                        view.total_yes_stake,
                        view.total_no_stake,
                    )
                    .call(),
            )
            .await??;
        Ok(payout)
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl IntoFuture<Output = T>,
    ) -> Result<T, LedgerError> {
        with_timeout(self.call_timeout, op, call).await
    }
}

#[async_trait]
impl LedgerGateway for ArenaLedger {
    async fn arena_view(&self, arena_index: i64) -> Result<ArenaView, LedgerError> {
        let id = market_id(arena_index)?;
        let r = self
            .bounded("getArena", self.contract.getArena(id).call())
            .await??;
        Ok(ArenaView {
            total_yes_stake: r.totalYesStake,
            total_no_stake: r.totalNoStake,
            resolved: r.resolved,
            outcome_yes: r.outcomeYes,
            exists: r.exists,
        })
    }

    async fn resolve_arena(
        &self,
        arena_index: i64,
        outcome_yes: bool,
    ) -> Result<TxHash, LedgerError> {
        let id = market_id(arena_index)?;
        let pending = self
            .bounded(
                "resolveArena",
                self.contract.resolveArena(id, outcome_yes).send(),
            )
            .await??;
        let tx_hash = *pending.tx_hash();
        info!(arena = arena_index, outcome_yes, tx = %tx_hash, "resolution submitted");

        let receipt = with_timeout(self.receipt_timeout, "receipt", pending.get_receipt())
            .await?
            .map_err(|e| LedgerError::Receipt(e.to_string()))?;
        if !receipt.status() {
            return Err(LedgerError::Reverted(tx_hash));
        }
        Ok(tx_hash)
    }
}

fn market_id(arena_index: i64) -> Result<U256, LedgerError> {
    u64::try_from(arena_index)
        .map(U256::from)
        .map_err(|_| LedgerError::InvalidIndex(arena_index))
}

async fn with_timeout<T>(
    limit: Duration,
    op: &'static str,
    fut: impl IntoFuture<Output = T>,
) -> Result<T, LedgerError> {
    tokio::time::timeout(limit, fut.into_future())
        .await
        .map_err(|_| LedgerError::Timeout {
            op,
            secs: limit.as_secs(),
        })
}
