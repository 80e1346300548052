//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "callsight",
    version,
    about = "Streaming retrieval-augmented Q&A over earnings-call transcripts",
    long_about = "Callsight answers natural-language questions about earnings-call transcripts \
                  by expanding each query into focused sub-queries, running owner-scoped hybrid \
                  retrieval for each one concurrently, and streaming a generated answer back \
                  while persisting bounded conversation history."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/callsight/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server with the streaming chat endpoint
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Ask one question and print the answer (blocking, no streaming)
    Ask {
        /// Session identifier the conversation history lives under
        #[arg(short, long)]
        session: String,

        /// Question to ask
        query: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the global config path)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
