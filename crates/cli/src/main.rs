//! sandclaw CLI: the main entry point.
//!
//! Commands:
//! - `agent`: Interactive REPL or single-message mode
//! - `tools`: List the tool definitions the model sees
//! - `config`: Show, locate or validate the configuration
//! - `onboard`: Write a default config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "sandclaw",
    about = "sandclaw: a tool-calling infrastructure agent for the terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Override the per-message step limit
        #[arg(long)]
        max_turns: Option<usize>,
    },

    /// List the available tools
    Tools {
        /// Skip connecting to extension servers
        #[arg(long)]
        no_extensions: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Write a default configuration file
    Onboard,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Check the configuration and credentials
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Agent { message, max_turns } => commands::agent::run(message, max_turns).await?,
        Commands::Tools { no_extensions } => commands::tools::run(no_extensions).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
        Commands::Onboard => commands::onboard::run()?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    // stdout belongs to the conversation
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
