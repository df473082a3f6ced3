use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vpnshop_db::repositories::payment_repo::PaymentRepository;
use vpnshop_db::repositories::user_repo::UserRepository;
use vpnshop_db::repositories::{EntitlementLedger, PaymentLedger};

use vpnshop_bot::AppState;
use vpnshop_bot::bot;
use vpnshop_bot::config::BotConfig;
use vpnshop_bot::services::admin_service::AdminService;
use vpnshop_bot::services::billing_service::BillingService;
use vpnshop_bot::services::bonus_service::BonusService;
use vpnshop_bot::services::credential_store::{
    CredentialStore, PanelCredentialStore, RetryPolicy,
};
use vpnshop_bot::services::entitlement_service::EntitlementService;
use vpnshop_bot::services::expiry_sweeper::ExpirySweeper;
use vpnshop_bot::services::link_service::VlessLinkBuilder;
use vpnshop_bot::services::notification_service::{Notifier, TelegramNotifier};
use vpnshop_bot::services::referral_service::ReferralService;
use vpnshop_bot::services::user_service::UserService;
use vpnshop_bot::xui::XuiClient;

#[derive(Parser)]
#[command(name = "vpnshop-bot")]
#[command(about = "Telegram VPN shop bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot and the expiry sweeper (default)
    Serve,
    /// Run one expiry sweep and exit
    Sweep,
    /// Adjust a user's subscription
    Grant {
        /// Telegram user id or public code
        target: String,
        /// Days to add; negative to remove, 0 expires now
        #[arg(allow_negative_numbers = true)]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: no .env loaded ({})", e);
    }

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vpnshop_bot=info,vpnshop_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BotConfig::from_env().context("Invalid configuration")?;
    info!("Starting VPN shop bot...");
    info!("Panel: {} (inbound {})", config.panel.url, config.panel.inbound_id);

    let pool = vpnshop_db::init_db(&config.database_url, config.database_max_connections).await?;
    let users_repo = UserRepository::new(pool.clone());
    let payment_repo = PaymentRepository::new(pool);
    let ledger: Arc<dyn EntitlementLedger> = Arc::new(users_repo);
    let payments: Arc<dyn PaymentLedger> = Arc::new(payment_repo.clone());

    let panel = XuiClient::new(&config.panel).context("Failed to build panel client")?;
    let store: Arc<dyn CredentialStore> = Arc::new(PanelCredentialStore::new(
        panel,
        RetryPolicy::default(),
        config.panel.data_cap_gb,
    ));

    let bot = Bot::new(config.bot_token.clone());
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));

    let links = VlessLinkBuilder::new(config.link.clone());
    let entitlements = EntitlementService::new(ledger.clone(), store, links);
    let users = UserService::new(ledger.clone());
    let state = AppState {
        referrals: ReferralService::new(ledger.clone(), entitlements.clone(), notifier.clone()),
        bonus: BonusService::new(users.clone(), entitlements.clone())?,
        billing: BillingService::new(payments, entitlements.clone()),
        admin: AdminService::new(config.admin_id, users.clone(), entitlements.clone()),
        users,
        entitlements,
        payment_history: payment_repo,
        stars_price: config.stars_price,
        bot_username: Arc::from("unknown"),
    };
    let sweeper = ExpirySweeper::new(ledger, notifier, config.sweep_interval);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

            let sweeper_rx = shutdown_tx.subscribe();
            let sweeper_task = tokio::spawn(async move { sweeper.start(sweeper_rx).await });

            let signal_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for shutdown signal: {}", e);
                    return;
                }
                info!("Shutdown signal received");
                let _ = signal_tx.send(());
            });

            bot::run_bot(bot, shutdown_tx.subscribe(), state).await;
            let _ = shutdown_tx.send(());
            let _ = sweeper_task.await;
        }
        Commands::Sweep => {
            let report = sweeper.sweep_once().await?;
            println!(
                "Expired: {}, notified: {}, undeliverable: {}, marked: {}",
                report.scanned, report.delivered, report.failed_deliveries, report.marked
            );
        }
        Commands::Grant { target, days } => match state.admin.adjust(&target, days).await? {
            Some(receipt) => println!(
                "User {}: expiry {} (remote: {:?})",
                receipt.user_id, receipt.new_expiry, receipt.remote
            ),
            None => anyhow::bail!("No user matches '{}'", target),
        },
    }

    Ok(())
}
