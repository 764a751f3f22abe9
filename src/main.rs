use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use llm_archive::cli::{import, init, list, prompt, search, show, stats, Outcome};
use llm_archive::config::Config;
use llm_archive::provider::{Provider, Role};
use llm_archive::store::{ListSort, SearchQuery, Store};

#[derive(Parser)]
#[command(name = "llm-archive")]
#[command(about = "Local searchable archive of LLM conversation exports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Archive database path (overrides the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// More logging on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty archive
    Init,

    /// Import a provider export file, directory or glob pattern
    Import {
        /// Export file, directory of exports, or glob pattern
        path: String,

        /// Export format
        #[arg(short, long, value_parser = Provider::from_str)]
        provider: Provider,
    },

    /// Full-text search over message content
    Search {
        /// FTS5 query: terms, "phrases", OR, NOT, prefix*, NEAR(...)
        query: String,

        /// Filter by provider
        #[arg(short, long, value_parser = Provider::from_str)]
        provider: Option<Provider>,

        /// Filter by role (human, assistant, system, tool)
        #[arg(short, long, value_enum)]
        role: Option<Role>,

        /// Maximum number of hits
        #[arg(short, long)]
        limit: Option<usize>,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// List conversations
    List {
        /// Sort order
        #[arg(short, long, value_enum)]
        sort: Option<ListSort>,

        /// Filter by provider
        #[arg(short, long, value_parser = Provider::from_str)]
        provider: Option<Provider>,

        /// Maximum number of conversations
        #[arg(short, long)]
        limit: Option<usize>,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Show a conversation by numeric id or source id prefix
    Show {
        id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show archive statistics
    Stats,

    /// Prompt library
    Prompt {
        #[command(subcommand)]
        command: PromptCommands,
    },
}

#[derive(Subcommand)]
enum PromptCommands {
    /// Store a new prompt version from a file
    Add {
        /// Prompt name
        name: String,
        /// File holding the prompt text
        file: PathBuf,
    },
    /// List the latest version of every prompt
    List,
    /// Full-text search over prompt names and content
    Search {
        query: String,

        /// Maximum number of hits
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<Outcome> {
    // Load config
    let config = Config::load(cli.config.as_deref())?;
    let db_path = cli.database.unwrap_or_else(|| config.database_path());

    // Every command except init requires an existing archive
    let open = || Store::open(&db_path, config.busy_timeout());

    match cli.command {
        Commands::Init => {
            init::run(&db_path, config.busy_timeout())?;
        }
        Commands::Import { path, provider } => {
            import::run(&open()?, &path, provider)?;
        }
        Commands::Search {
            query,
            provider,
            role,
            limit,
            json,
        } => {
            let query = SearchQuery {
                text: query,
                provider,
                role,
                limit: limit.unwrap_or(config.search.default_limit),
            };
            let hits = search::run(&open()?, &query, json)?;
            return Ok(Outcome::from_hits(hits));
        }
        Commands::List {
            sort,
            provider,
            limit,
            json,
        } => {
            list::run(
                &open()?,
                sort.unwrap_or(config.list.default_sort),
                provider,
                limit.unwrap_or(config.list.default_limit),
                json,
            )?;
        }
        Commands::Show { id, json } => {
            show::run(&open()?, &id, json)?;
        }
        Commands::Stats => {
            stats::run(&open()?)?;
        }
        Commands::Prompt { command } => match command {
            PromptCommands::Add { name, file } => {
                prompt::add(&open()?, &name, &file)?;
            }
            PromptCommands::List => {
                prompt::list(&open()?)?;
            }
            PromptCommands::Search { query, limit } => {
                let limit = limit.unwrap_or(config.search.default_limit);
                let hits = prompt::search(&open()?, &query, limit)?;
                return Ok(Outcome::from_hits(hits));
            }
        },
    }

    Ok(Outcome::Done)
}
