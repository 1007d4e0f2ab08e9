//! Print on-ledger state for one arena.
//!
//! Usage: arena-inspect <arena_index> [wallet]
//!
//! Reads ledger settings from the environment (or .env) the same way the
//! worker does. With a wallet it also prints that wallet's stake and what
//! it would be paid on each outcome.

use alloy::primitives::{utils::format_ether, Address};
use anyhow::{bail, Context};
use arena_worker::config::Config;
use arena_worker::ledger::{ArenaLedger, LedgerGateway};
use std::str::FromStr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(index_arg) = args.first() else {
        bail!("usage: arena-inspect <arena_index> [wallet]");
    };
    let arena_index: i64 = index_arg
        .parse()
        .with_context(|| format!("invalid arena index: {index_arg}"))?;
    let wallet = args
        .get(1)
        .map(|w| Address::from_str(w).with_context(|| format!("invalid wallet: {w}")))
        .transpose()?;

    let mut config = Config::default();
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("reading environment")?;
    for (key, value) in [
        ("RPC_URL_BASE_SEPOLIA", &config.ledger.rpc_url),
        ("ORACLE_PRIVATE_KEY", &config.ledger.oracle_private_key),
        ("BANGER_ARENAS_ADDRESS", &config.ledger.contract_address),
    ] {
        if value.trim().is_empty() {
            bail!("missing required env var: {key}");
        }
    }

    let ledger = ArenaLedger::connect(&config.ledger).await?;
    let view = ledger.arena_view(arena_index).await?;

    println!("arena {arena_index}");
    if !view.exists {
        println!("  no market on ledger");
        return Ok(());
    }
    println!("  yes stake:   {} ETH", format_ether(view.total_yes_stake));
    println!("  no stake:    {} ETH", format_ether(view.total_no_stake));
    println!("  total:       {} ETH", format_ether(view.total_stake()));
    if view.resolved {
        println!("  resolved:    {}", if view.outcome_yes { "yes" } else { "no" });
    } else {
        println!("  resolved:    pending");
    }

    let Some(wallet) = wallet else {
        return Ok(());
    };

    let stake = ledger.user_stake(arena_index, wallet).await?;
    println!("wallet {wallet}");
    println!("  yes stake:   {} ETH", format_ether(stake.yes_stake));
    println!("  no stake:    {} ETH", format_ether(stake.no_stake));
    println!("  claimed:     {}", stake.has_claimed);

    // If already resolved only the real outcome matters.
    let sides: &[bool] = if view.resolved {
        std::slice::from_ref(&view.outcome_yes)
    } else {
        &[true, false]
    };
    for &yes in sides {
        let own = stake.stake_on(yes);
        if own.is_zero() {
            continue;
        }
        let payout = ledger
            .preview_payout(own, view.winner_total(yes), &view)
            .await?;
        println!(
            "  payout if {}: {} ETH",
            if yes { "yes" } else { "no" },
            format_ether(payout)
        );
    }

    Ok(())
}
