use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use thiserror::Error;

use rbkup::rewrite::RewriteConfig;
use rbkup::stream::writer::DEFAULT_WRITE_ATTEMPTS;
use rbkup::stream::StreamError;

#[derive(Parser)]
#[command(name = "rbkup")]
#[command(about = "Inspect and rewrite NT backup streams")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lists the records of a backup stream
    List {
        /// The stored backup stream
        file: PathBuf,
    },

    /// Copies a backup stream, dropping and redacting records per the config
    Rewrite {
        input: PathBuf,
        output: PathBuf,
    },

    /// Re-frames a backup stream record by record
    Copy {
        input: PathBuf,
        output: PathBuf,

        /// Size of each write, otherwise the configured buffer size
        #[arg(short, long)]
        chunk: Option<usize>,
    },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error("reading config {}: {source}", .path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing config {}: {source}", .path.display())]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("chunk size must be at least 1")]
    ZeroChunk,
}

// Configuration
#[derive(Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Read and write size used when streaming files
    pub buffer_size: usize,

    /// Attempts without progress before giving up on the output
    pub max_write_attempts: usize,

    pub rewrite: RewriteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            buffer_size: 64 * 1024,
            max_write_attempts: DEFAULT_WRITE_ATTEMPTS,
            rewrite: RewriteConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Config, CliError> {
        let path = match path {
            None => return Ok(Config::default()),
            Some(p) => p,
        };

        let content = fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CliError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }
}
