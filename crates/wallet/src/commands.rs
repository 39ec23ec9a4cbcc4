//! CLI commands

use crate::service::{CallerContext, WalletService};
use glowcast_core::{Coins, EntryId, UserId};
use glowcast_ledger::{EntryContext, EntryStatus, EntryType};

/// Show balances for a user
pub fn balance(service: &WalletService, user: &str) -> Result<(), anyhow::Error> {
    let user_id = UserId::new(user);
    let snapshot = service.get_balance(&user_id);

    println!(
        "Balance for {}: {} coins ({} bonus, version {})",
        user, snapshot.balance, snapshot.bonus_balance, snapshot.version
    );
    Ok(())
}

/// Grant a platform reward
pub async fn reward(
    service: &WalletService,
    user: &str,
    amount: u64,
    note: Option<String>,
) -> Result<(), anyhow::Error> {
    let entry = service
        .credit(
            user,
            EntryType::Reward,
            Coins::new(amount),
            EntryContext::System { note },
            CallerContext::default(),
        )
        .await?;

    println!("✅ Rewarded {} coins to {} (entry {})", amount, user, entry.id);
    Ok(())
}

/// Send a gift from one user to another (debit + matching credit)
pub async fn gift(
    service: &WalletService,
    from: &str,
    to: &str,
    gift_id: &str,
    amount: u64,
) -> Result<(), anyhow::Error> {
    let context = EntryContext::Gift {
        gift_id: gift_id.to_string(),
        stream_id: None,
    };

    let sent = service
        .debit(
            from,
            EntryType::GiftSent,
            Coins::new(amount),
            context.clone(),
            CallerContext {
                counterparty: Some(UserId::new(to)),
                ..CallerContext::default()
            },
        )
        .await?;

    let received = service
        .credit(
            to,
            EntryType::GiftReceived,
            Coins::new(amount),
            context,
            CallerContext {
                counterparty: Some(UserId::new(from)),
                ..CallerContext::default()
            },
        )
        .await?;

    println!(
        "✅ Gift '{}' of {} coins: {} -> {} (entries {}, {})",
        gift_id, amount, from, to, sent.id, received.id
    );
    Ok(())
}

/// Claim the daily bonus for a user
pub async fn claim_bonus(
    service: &WalletService,
    user: &str,
    amount: u64,
) -> Result<(), anyhow::Error> {
    let entry = service.claim_daily_bonus(user, Coins::new(amount)).await?;

    println!(
        "✅ Daily bonus for {}: {} bonus coins (entry {}, status {})",
        user, entry.amount, entry.id, entry.status
    );
    Ok(())
}

/// Print a user's entry history
pub fn history(service: &WalletService, user: &str, limit: usize) -> Result<(), anyhow::Error> {
    let user_id = UserId::new(user);
    let entries = service.history(&user_id);

    if entries.is_empty() {
        println!("No entries for {}", user);
        return Ok(());
    }

    for entry in entries.iter().rev().take(limit) {
        println!(
            "{}  {:<22} {:>10}  {:>8} -> {:<8} [{}]",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.entry_type.to_string(),
            entry.amount,
            entry.balance_before,
            entry.balance_after,
            entry.status
        );
    }
    Ok(())
}

/// Verify a user's hash chain
pub fn verify(service: &WalletService, user: &str) -> Result<(), anyhow::Error> {
    let user_id = UserId::new(user);
    match service.verify_chain(&user_id) {
        Ok(()) => {
            println!("✅ Hash chain verified for {}", user);
        }
        Err(err) => {
            println!("❌ Chain verification failed: {}", err);
            println!("   Appends for {} are held pending audit", user);
        }
    }
    Ok(())
}

/// List the manual review queue
pub fn flagged(service: &WalletService) -> Result<(), anyhow::Error> {
    let entries = service.flagged_entries();

    if entries.is_empty() {
        println!("Review queue is empty");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {}  {:<22} {:>10} coins  user {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.entry_type.to_string(),
            entry.amount,
            entry.user_id
        );
    }
    Ok(())
}

/// Apply a review decision to a flagged entry
pub async fn resolve(
    service: &WalletService,
    entry_id: &str,
    approve: bool,
) -> Result<(), anyhow::Error> {
    let entry_id = EntryId::parse(entry_id)?;
    let entry = service.resolve_flagged(entry_id, approve).await?;

    match entry.status {
        EntryStatus::Completed => println!("✅ Entry {} approved and applied", entry.id),
        _ => println!("✅ Entry {} rejected ({})", entry.id, entry.status),
    }
    Ok(())
}
