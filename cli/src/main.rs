use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use db::schema::seed_default_settings;
use services::{AccountService, MailQueue, PasswordResetService, ReportService, SettingsService, SmtpMailTransport};
use util::config::AppConfig;
use util::logging::init_logging;
use util::state::AppState;

#[derive(Parser, Debug)]
#[command(version, about = "Attendance register maintenance")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema and seed default settings
    InitDb,
    /// Create the admin account, or promote an existing one
    CreateAdmin {
        /// Defaults to ADMIN_LOGIN
        #[arg(long)]
        login: Option<String>,
        /// Defaults to ADMIN_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete expired password reset tokens
    PurgeTokens,
    /// Write the monthly report of every trainer active in the month
    GenerateReports {
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
        /// Also send each report to the coordinator
        #[arg(long)]
        email: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::from_env().context("loading configuration")?;
    let _log_guard = init_logging(&config);

    let db = db::connect(&config).await.context("opening database")?;
    let settings = SettingsService::load(&db).await.context("loading settings")?;
    let state = AppState::new(db, config, settings);

    match args.command {
        Command::InitDb => {
            let seeded = seed_default_settings(state.db()).await?;
            SettingsService::reload(&state).await?;
            println!("Database ready, {seeded} default settings added");
        }
        Command::CreateAdmin { login, password } => {
            let login = login.or_else(|| state.config().admin_login.clone());
            let password = password.or_else(|| state.config().admin_password.clone());
            let (Some(login), Some(password)) = (login, password) else {
                bail!("admin login and password are required (--login/--password or ADMIN_LOGIN/ADMIN_PASSWORD)");
            };
            let admin = AccountService::ensure_admin(state.db(), &login, &password).await?;
            println!("Admin account ready: {} (id {})", admin.login, admin.id);
        }
        Command::PurgeTokens => {
            let removed = PasswordResetService::purge_expired(state.db()).await?;
            println!("Removed {removed} expired reset tokens");
        }
        Command::GenerateReports { month, year, email } => {
            generate_reports(&state, month, year, email).await?;
        }
    }

    Ok(())
}

async fn generate_reports(state: &AppState, month: u32, year: i32, email: bool) -> Result<()> {
    let queue = email.then(|| {
        let transport = Arc::new(SmtpMailTransport::new(state.settings_handle()));
        MailQueue::start(transport, state.config().mail_queue_capacity)
    });

    let result = ReportService::generate_all(state, queue.as_ref(), month, year).await;

    if let Some(queue) = queue {
        info!("waiting for queued mail");
        queue.shutdown().await;
    }

    let written = result.with_context(|| format!("generating reports for {month:02}.{year}"))?;
    if written.is_empty() {
        println!("No sessions in {month:02}.{year}, nothing generated");
    }
    for report in &written {
        println!(
            "trainer {}: {} ({}h{})",
            report.trainer_id,
            report.path.display(),
            report.total_hours,
            if report.queued { ", e-mailed" } else { "" }
        );
    }
    Ok(())
}
