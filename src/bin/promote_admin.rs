use clap::Parser;
use dotenvy::dotenv;
use excel_analytics::infrastructure::database;
use excel_analytics::services::accounts::set_admin_by_email;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Grants or revokes admin rights directly in the database.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Email of the account to change
    #[arg(long)]
    email: String,

    /// Revoke instead of grant
    #[arg(long)]
    revoke: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promote_admin=info,excel_analytics=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🔌 Connecting to database...");
    let db = database::setup_database().await?;

    match set_admin_by_email(&db, &args.email, !args.revoke).await {
        Ok(user) => {
            info!("✅ {} admin={}", user.email, user.is_admin);
            Ok(())
        }
        Err(e) => {
            error!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
