//! # Post Harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest collect` | Checkpointed collection of every (or selected) account |
//! | `harvest accounts` | List remote accounts or look up handles |
//! | `harvest checkpoint [PATH]` | Show a checkpoint |
//! | `harvest embed <csv>` | Add an embedding column to a table |
//! | `harvest stats <csv>` | Rows per handle |
//! | `harvest columns <csv>` | List a table's columns |
//! | `harvest import-survey <csv>` | Convert a survey export |
//!
//! ## Examples
//!
//! ```bash
//! # Resume the run bound to a specific checkpoint
//! harvest collect --checkpoint ./collection_checkpoint_20250101_120000.json
//!
//! # Collect two accounts only
//! harvest collect --account alice --account bob
//!
//! # Embed one user's posts, machine-readable progress
//! harvest --progress json embed tweets.csv --user alice
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use post_harvest::collect::CollectOptions;
use post_harvest::embed_cmd::EmbedOptions;
use post_harvest::import::{ImportOptions, DEFAULT_SURVEY_COLUMN, DEFAULT_SURVEY_HANDLE};
use post_harvest::models::USERNAME_FIELD;
use post_harvest::progress::ProgressMode;
use post_harvest::{accounts, checkpoint, collect, config, embed_cmd, import, stats};

/// Post Harvest: resumable post collection, filtering, and embedding.
///
/// Commands that talk to a remote read a TOML configuration file given by
/// `--config`. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Post Harvest: resumable post collection, filtering, and embedding",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    /// Progress output on stderr: `auto` (human on a TTY), `off`, `human`, `json`.
    #[arg(long, global = true, value_enum, default_value = "auto")]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect posts from every account (or the selected ones).
    ///
    /// Pages through each account's posts, drops low-value posts, and
    /// appends the rest to a CSV file. Progress is checkpointed so an
    /// interrupted run can be resumed.
    Collect {
        /// Resume from, or bind a new run to, this checkpoint file.
        #[arg(long, conflicts_with = "resume_latest")]
        checkpoint: Option<PathBuf>,

        /// Resume from the newest checkpoint in `collect.output_dir`.
        #[arg(long)]
        resume_latest: bool,

        /// Collect only this handle (repeatable). Overrides `collect.accounts`.
        #[arg(long = "account")]
        accounts: Vec<String>,

        /// Resolve accounts and show what would be collected.
        #[arg(long)]
        dry_run: bool,
    },

    /// List remote accounts, or look up specific handles.
    Accounts {
        /// Handle to look up (repeatable).
        #[arg(long)]
        find: Vec<String>,

        /// Maximum number of accounts to print.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Show a checkpoint: the given file, or the newest in `collect.output_dir`.
    Checkpoint {
        path: Option<PathBuf>,
    },

    /// Add an `embedding` column to a CSV table.
    Embed {
        /// Input CSV (needs the configured text column).
        input: PathBuf,

        /// Output CSV. Defaults to a timestamped file next to the input.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Keep only rows from this handle (repeatable).
        #[arg(long = "user")]
        users: Vec<String>,

        /// Maximum number of rows to embed.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Count rows per handle in a CSV table.
    Stats {
        input: PathBuf,

        /// Column to group by.
        #[arg(long, default_value = USERNAME_FIELD)]
        column: String,
    },

    /// List the columns of a CSV table.
    Columns {
        input: PathBuf,
    },

    /// Convert a survey export into a `username,full_text` table.
    ImportSurvey {
        input: PathBuf,

        /// Handle the responses are attributed to.
        #[arg(long, default_value = DEFAULT_SURVEY_HANDLE)]
        handle: String,

        /// Zero-based column holding the response text.
        #[arg(long, default_value_t = DEFAULT_SURVEY_COLUMN)]
        column: usize,

        /// Output CSV. Defaults to a timestamped file next to the input.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let load = || config::load_config(&cli.config);
    let reporter = cli.progress.reporter();

    match cli.command {
        Commands::Collect {
            checkpoint,
            resume_latest,
            accounts,
            dry_run,
        } => {
            let cfg = load()?;
            let opts = CollectOptions {
                checkpoint,
                resume_latest,
                accounts,
                dry_run,
            };
            collect::run_collect(&cfg, &opts, reporter.as_ref()).await?;
        }
        Commands::Accounts { find, limit } => {
            let cfg = load()?;
            accounts::run_accounts(&cfg, &find, limit).await?;
        }
        Commands::Checkpoint { path } => {
            let cfg = load()?;
            checkpoint::run_show_checkpoint(path.as_deref(), &cfg.collect.output_dir)?;
        }
        Commands::Embed {
            input,
            output,
            users,
            limit,
        } => {
            let cfg = load()?;
            let opts = EmbedOptions {
                output,
                users,
                limit,
            };
            embed_cmd::run_embed(&cfg, &input, &opts, reporter.as_ref()).await?;
        }
        // No config file needed below.
        Commands::Stats { input, column } => stats::run_stats(&input, &column)?,
        Commands::Columns { input } => stats::run_columns(&input)?,
        Commands::ImportSurvey {
            input,
            handle,
            column,
            output,
        } => {
            let opts = ImportOptions {
                handle,
                column,
                output,
            };
            import::run_import_survey(&input, &opts)?;
        }
    }

    Ok(())
}
