pub mod commands;
pub mod output;

use crate::errors::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "pq")]
#[command(about = "Patch queue manager for Git with interactive stack rebasing")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a patch stack on the current branch at its current head
    Init,

    /// Commit the staged changes as a new applied patch
    New {
        /// Patch name
        name: String,

        /// Commit message (defaults to the patch name)
        #[arg(long, short)]
        message: Option<String>,
    },

    /// List the patches of the current branch
    Series {
        /// Show each patch's one-line summary
        #[arg(long, short)]
        description: bool,
    },

    /// Rearrange the stack, optionally moving it onto a new base
    Rebase {
        /// Commit, branch or tag to move the stack base to
        new_base: Option<String>,

        /// Edit the todo list to keep, squash, delete and reorder patches
        #[arg(long, short)]
        interactive: bool,

        /// Leave all patches unapplied after the rebase
        #[arg(long, short, conflicts_with = "interactive")]
        nopush: bool,

        /// Check for patches merged upstream
        #[arg(long, short)]
        merged: bool,
    },

    /// Show the stack log, newest first
    Log {
        /// Number of entries to show
        #[arg(long, short = 'n')]
        number: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., rebase.show_help)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// List all configuration values
    List,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        self.setup_logging();

        match self.command {
            Commands::Init => commands::init::run(),
            Commands::New { name, message } => commands::new::run(&name, message),
            Commands::Series { description } => commands::series::run(description),
            Commands::Rebase {
                new_base,
                interactive,
                nopush,
                merged,
            } => commands::rebase::run(new_base, interactive, nopush, merged),
            Commands::Log { number } => commands::log::run(number),
            Commands::Config { action } => commands::config::run(action),
            Commands::Completions { shell } => commands::completions::generate_completions(shell),
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr);

        if self.no_color {
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}
