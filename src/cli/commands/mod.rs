//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod cache;
pub mod discover;
pub mod libs;

use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::OutputConfig;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover the libraries used by the sketch
    Discover {
        /// Sketch main file name (defaults to the configured one)
        #[arg(long)]
        sketch: Option<String>,

        /// Reuse the last resolved include folders if available
        #[arg(long)]
        use_cached: bool,

        /// Only refresh the compilation database; errors are not fatal
        #[arg(long)]
        compilation_db: bool,
    },

    /// Discovery cache management
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// List installed libraries
    Libs {
        /// Show only libraries providing this header, best first
        #[arg(long)]
        header: Option<String>,
    },
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache information
    Info,

    /// Delete the discovery caches
    Clean,
}

impl Commands {
    /// Execute the command
    pub async fn run(self, output: &OutputConfig) -> Result<()> {
        let current_dir = std::env::current_dir()?;
        match self {
            Self::Discover {
                sketch,
                use_cached,
                compilation_db,
            } => {
                let args = discover::DiscoverArgs {
                    sketch,
                    use_cached,
                    compilation_db,
                };
                discover::execute(&current_dir, args, output).await
            }
            Self::Cache { command } => match command {
                CacheCommands::Info => cache::execute_info(&current_dir, output).await,
                CacheCommands::Clean => cache::execute_clean(&current_dir, output).await,
            },
            Self::Libs { header } => libs::execute(&current_dir, header.as_deref(), output).await,
        }
    }
}
