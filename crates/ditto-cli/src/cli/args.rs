use clap::{Args, Parser, Subcommand, ValueEnum};
use ditto_core::CompressionStrategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ditto",
    version,
    about = "Byte-reproducible ZIP archives, with checks that independent encoding paths agree"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build one reproducible archive from a directory
    Build(BuildArgs),
    /// Build under several strategies and check the results agree
    Verify(VerifyArgs),
}

#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Where entries come from and which instant they are stamped with.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Directory to archive; entry paths are recorded relative to it
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Glob selecting files under --root (repeatable, default: all files)
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Glob excluding files under --root (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Entry timestamp: YYYY-MM-DDTHH:MM:SS (taken as declared) or RFC 3339
    /// with an offset (converted to UTC). Takes precedence over --epoch.
    #[arg(long)]
    pub timestamp: Option<String>,

    /// Entry timestamp as Unix seconds, UTC.
    /// Default when neither is given: 1980-01-01T00:00:00
    #[arg(long, env = "SOURCE_DATE_EPOCH")]
    pub epoch: Option<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output archive path
    #[arg(long, short)]
    pub output: PathBuf,

    /// Compression strategy (store | deflate)
    #[arg(long, default_value = "store")]
    pub strategy: CompressionStrategy,

    /// Deflate level 0-9
    #[arg(long, default_value_t = ditto_core::archive::DEFAULT_DEFLATE_LEVEL)]
    pub level: u32,

    /// Encode entries on all cores (output bytes are unchanged)
    #[arg(long)]
    pub parallel: bool,

    /// Fail instead of writing an empty archive
    #[arg(long)]
    pub require_entries: bool,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Strategy to verify (repeatable, default: store and deflate)
    #[arg(long = "strategy", value_name = "STRATEGY")]
    pub strategies: Vec<CompressionStrategy>,

    /// Builds per strategy
    #[arg(long)]
    pub runs: Option<usize>,

    /// Deflate level 0-9
    #[arg(long)]
    pub level: Option<u32>,

    /// YAML verify config (strategies, runs, pinned fingerprints, ...)
    #[arg(long, env = "DITTO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write one <stem>-<strategy>.zip per strategy into this directory
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// File stem for --out-dir artifacts
    #[arg(long, default_value = "archive")]
    pub stem: String,

    /// Report divergence and continue instead of failing
    #[arg(long)]
    pub advisory: bool,

    /// Treat an empty input set as an error
    #[arg(long)]
    pub require_entries: bool,

    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}
