mod commands;
mod config;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    RegisterArgs, cmd_check, cmd_month, cmd_register, cmd_seed, cmd_summary, cmd_trend,
};
use crate::config::Config;
use tally_core::Ledger;
use tally_core::identity::TokenKeys;
use tally_core::models::GoalProfile;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Nutrition and weight tracking server",
    long_about = "Track food, body weight and activity per user, and check daily, \
                  monthly and weekly progress against personal calorie goals."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Add the sample food catalog, optionally with a demo user and history
    Seed {
        /// Also create a demo user with this email and a few days of logs
        #[arg(long)]
        demo_email: Option<String>,
        /// Password for the demo user
        #[arg(long, default_value = "tally-demo")]
        demo_password: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a user
    Register {
        /// Display name
        name: String,
        /// Email address (login)
        email: String,
        /// Password
        #[arg(long)]
        password: String,
        /// Current body weight
        #[arg(long)]
        weight: Option<f64>,
        /// Daily calorie goal (kcal)
        #[arg(long)]
        calorie_goal: Option<f64>,
        /// Daily protein goal (g)
        #[arg(long)]
        protein_goal: Option<f64>,
        /// Daily carbs goal (g)
        #[arg(long)]
        carbs_goal: Option<f64>,
        /// Daily fat goal (g)
        #[arg(long)]
        fat_goal: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a user's daily summary (defaults to today)
    Summary {
        /// User email
        #[arg(short, long)]
        email: String,
        /// Date to show (YYYY-MM-DD or today/yesterday, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which days of a month stayed within the calorie goal
    Month {
        /// User email
        #[arg(short, long)]
        email: String,
        /// Year (default: current)
        year: Option<i32>,
        /// Month 1-12 (default: current)
        month: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily calorie totals for the last 30 days
    Trend {
        /// User email
        #[arg(short, long)]
        email: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the 7-day average against the calorie goal
    Check {
        /// User email
        #[arg(short, long)]
        email: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tally=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let ledger = Ledger::new(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    match cli.command {
        Commands::Serve { port, bind } => {
            let (secret, _) = config.load_or_create_secret()?;
            let keys = TokenKeys::new(secret.as_bytes(), config.token_ttl_hours);
            server::start_server(ledger, keys, port, &bind).await
        }
        Commands::Seed {
            demo_email,
            demo_password,
            json,
        } => cmd_seed(&ledger, demo_email.as_deref(), &demo_password, json),
        Commands::Register {
            name,
            email,
            password,
            weight,
            calorie_goal,
            protein_goal,
            carbs_goal,
            fat_goal,
            json,
        } => cmd_register(
            &ledger,
            RegisterArgs {
                name,
                email,
                password,
                weight,
                goals: GoalProfile {
                    calorie_goal,
                    protein_goal,
                    carbs_goal,
                    fat_goal,
                },
            },
            json,
        ),
        Commands::Summary { email, date, json } => cmd_summary(&ledger, &email, date, json),
        Commands::Month {
            email,
            year,
            month,
            json,
        } => cmd_month(&ledger, &email, year, month, json),
        Commands::Trend { email, json } => cmd_trend(&ledger, &email, json),
        Commands::Check { email, json } => cmd_check(&ledger, &email, json),
    }
}
