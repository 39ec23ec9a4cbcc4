//! Glowcast CLI - Main entry point

use clap::{Parser, Subcommand};
use glowcast_wallet::{commands, WalletContext, WalletService};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "glowcast")]
#[command(about = "Glowcast - Coin ledger operations", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check balances for a user
    Balance {
        /// User ID
        user: String,
    },

    /// Grant a platform reward
    Reward {
        /// User ID
        user: String,
        /// Coin amount
        amount: u64,
        /// Optional note
        #[arg(long)]
        note: Option<String>,
    },

    /// Send a gift between users
    Gift {
        /// Sender user ID
        from: String,
        /// Receiver user ID
        to: String,
        /// Coin amount
        amount: u64,
        /// Gift identifier
        #[arg(long, default_value = "gift")]
        gift_id: String,
    },

    /// Claim the daily bonus for a user
    ClaimBonus {
        /// User ID
        user: String,
        /// Bonus coin amount
        amount: u64,
    },

    /// Show a user's entry history
    History {
        /// User ID
        user: String,
        /// Maximum number of entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Audit a user's hash chain
    Verify {
        /// User ID
        user: String,
    },

    /// List entries awaiting manual review
    Flagged,

    /// Apply a review decision to a flagged entry
    Resolve {
        /// Entry ID
        entry: String,
        /// Approve (apply the withheld effect) instead of reject
        #[arg(long)]
        approve: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let ctx = WalletContext::new(&cli.data).await?;
    let service = WalletService::new(ctx);

    match cli.command {
        Commands::Balance { user } => {
            commands::balance(&service, &user)?;
        }

        Commands::Reward { user, amount, note } => {
            commands::reward(&service, &user, amount, note).await?;
        }

        Commands::Gift {
            from,
            to,
            amount,
            gift_id,
        } => {
            commands::gift(&service, &from, &to, &gift_id, amount).await?;
        }

        Commands::ClaimBonus { user, amount } => {
            commands::claim_bonus(&service, &user, amount).await?;
        }

        Commands::History { user, limit } => {
            commands::history(&service, &user, limit)?;
        }

        Commands::Verify { user } => {
            commands::verify(&service, &user)?;
        }

        Commands::Flagged => {
            commands::flagged(&service)?;
        }

        Commands::Resolve { entry, approve } => {
            commands::resolve(&service, &entry, approve).await?;
        }
    }

    Ok(())
}
