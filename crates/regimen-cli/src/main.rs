mod config;
mod log_cmds;
mod plan_cmds;
mod request_cmds;
mod resolve;
mod run_cmds;
mod user_cmds;
mod worker_cmd;

use clap::{Parser, Subcommand};
use sqlx::PgPool;

use regimen_db::pool;

use config::RegimenConfig;

#[derive(Parser)]
#[command(name = "regimen", about = "Week-by-week AI workout plan generation")]
struct Cli {
    /// Database URL (overrides REGIMEN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a regimen config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/regimen")]
        db_url: String,
        /// Provider API key to store in the file
        #[arg(long)]
        api_key: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the regimen database and run migrations
    DbInit,
    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Plan request management
    Request {
        #[command(subcommand)]
        command: RequestCommands,
    },
    /// Generate one week of a request now, bypassing the schedule
    Generate {
        /// Request ID
        request_id: String,
        /// Week number to generate
        week: i32,
    },
    /// Run the due-week trigger once
    Trigger {
        /// Treat this date (YYYY-MM-DD) as today
        #[arg(long)]
        date: Option<String>,
    },
    /// Run the visibility rotator once
    Rotate {
        /// Treat this date (YYYY-MM-DD) as today
        #[arg(long)]
        date: Option<String>,
    },
    /// Run the worker daemon: worker pool, cron jobs and restart recovery
    Worker {
        /// Override the number of concurrent generations
        #[arg(long)]
        max_workers: Option<usize>,
        /// Run the trigger and rotator once at startup
        #[arg(long)]
        run_now: bool,
    },
    /// Weekly plan views
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Exercise logs
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user and profile
    Add {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        sex: Option<String>,
        /// e.g. beginner, intermediate, advanced
        #[arg(long)]
        fitness_level: Option<String>,
        #[arg(long)]
        goal: Option<String>,
        /// Birthday as YYYY-MM-DD
        #[arg(long)]
        birthday: Option<String>,
        #[arg(long)]
        height_cm: Option<f64>,
        #[arg(long)]
        weight_kg: Option<f64>,
    },
    /// Show a user and profile
    Show {
        /// User ID or username
        user: String,
    },
}

#[derive(Subcommand)]
pub enum RequestCommands {
    /// Submit a plan request and generate its first week
    Create {
        /// User ID or username
        #[arg(long)]
        user: String,
        /// Program length in weeks (1-12, default 4)
        #[arg(long)]
        weeks: Option<i32>,
        /// Workout days per week (1-7, default 4)
        #[arg(long)]
        days: Option<i32>,
        /// Overrides the profile's fitness level
        #[arg(long)]
        fitness_level: Option<String>,
        /// Overrides the profile's goal
        #[arg(long)]
        goal: Option<String>,
        /// Free-text focus areas
        #[arg(long)]
        focus: Option<String>,
    },
    /// Show a request and its generated weeks
    Show {
        /// Request ID
        request_id: String,
    },
    /// List a user's requests, newest first
    List {
        /// User ID or username
        #[arg(long)]
        user: String,
        /// Page number, starting at 0
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// Cancel a request between weeks
    Cancel {
        /// Request ID
        request_id: String,
    },
    /// Resume a failed request from its next missing week
    Resume {
        /// Request ID
        request_id: String,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Show the user's current week
    Active {
        /// User ID or username
        #[arg(long)]
        user: String,
    },
    /// List every week the user has, newest first
    History {
        /// User ID or username
        #[arg(long)]
        user: String,
        /// Page number, starting at 0
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// Show one week with its days and exercises
    Show {
        /// Plan ID
        plan_id: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the prompt and raw provider response for a week
    Audit {
        /// Plan ID
        plan_id: String,
    },
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// Record a performed exercise
    Add {
        /// User ID or username
        #[arg(long)]
        user: String,
        /// Planned exercise ID this log refers to
        #[arg(long)]
        exercise: Option<String>,
        /// Exercise name (required without --exercise)
        #[arg(long)]
        name: Option<String>,
        /// One set as REPS or REPSxWEIGHT; repeat per set
        #[arg(long = "set", required = true)]
        sets: Vec<String>,
        /// Date performed (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
        /// Planned day ID completed with this log
        #[arg(long)]
        day: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List logs, newest first
    List {
        /// User ID or username
        #[arg(long)]
        user: String,
        /// Earliest date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Latest date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Page number, starting at 0
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
}

/// Execute the `regimen init` command: write config file.
fn cmd_init(db_url: &str, api_key: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let has_key = api_key.is_some();
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        provider: config::ProviderSection {
            api_key,
            ..config::ProviderSection::default()
        },
        schedule: config::ScheduleSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if has_key {
        println!("  provider.api_key = (set)");
    } else {
        println!(
            "  provider.api_key not set; export {} or edit the file",
            config::ENV_API_KEY
        );
    }
    println!();
    println!("Next: run `regimen db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `regimen db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = RegimenConfig::resolve(cli_db_url)?;

    println!(
        "Initializing regimen database at {}...",
        resolved.db_config.redacted_url()
    );

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("regimen db-init complete.");
    Ok(())
}

/// Resolve configuration and open the pool for a database-backed command.
async fn connect(cli_db_url: Option<&str>) -> anyhow::Result<(RegimenConfig, PgPool)> {
    let resolved = RegimenConfig::resolve(cli_db_url)?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    Ok((resolved, db_pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_url = cli.database_url.as_deref();

    match cli.command {
        Commands::Init {
            db_url,
            api_key,
            force,
        } => {
            cmd_init(&db_url, api_key, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(db_url).await?;
        }
        Commands::User { command } => {
            let (_, db_pool) = connect(db_url).await?;
            let result = user_cmds::run_user_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Request { command } => {
            let (resolved, db_pool) = connect(db_url).await?;
            let result = request_cmds::run_request_command(command, &db_pool, &resolved).await;
            db_pool.close().await;
            result?;
        }
        Commands::Generate { request_id, week } => {
            let (resolved, db_pool) = connect(db_url).await?;
            let result = run_cmds::run_generate(&db_pool, &resolved, &request_id, week).await;
            db_pool.close().await;
            result?;
        }
        Commands::Trigger { date } => {
            let (resolved, db_pool) = connect(db_url).await?;
            let result = run_cmds::run_trigger(&db_pool, &resolved, date.as_deref()).await;
            db_pool.close().await;
            result?;
        }
        Commands::Rotate { date } => {
            let (resolved, db_pool) = connect(db_url).await?;
            let result = run_cmds::run_rotate(&db_pool, &resolved, date.as_deref()).await;
            db_pool.close().await;
            result?;
        }
        Commands::Worker {
            max_workers,
            run_now,
        } => {
            let (mut resolved, db_pool) = connect(db_url).await?;
            if let Some(n) = max_workers {
                resolved.workflow.max_workers = n;
            }
            let result = worker_cmd::run_worker(&db_pool, resolved, run_now).await;
            db_pool.close().await;
            result?;
        }
        Commands::Plan { command } => {
            let (_, db_pool) = connect(db_url).await?;
            let result = plan_cmds::run_plan_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Log { command } => {
            let (_, db_pool) = connect(db_url).await?;
            let result = log_cmds::run_log_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
