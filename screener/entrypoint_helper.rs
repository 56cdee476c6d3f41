use backtesting::NullPolicy;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Oversold-rebound signal backtester and latest-bar screener
#[derive(Parser, Debug)]
#[command(name = "screener")]
#[command(about = "Walk-forward signal backtesting and tiered screening of daily bar files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay the signal predicate over every history and summarise forward returns
    Backtest {
        #[command(flatten)]
        common: CommonArgs,

        /// How clamped returns enter the statistics
        #[arg(long, value_enum)]
        null_policy: Option<PolicyArg>,
    },

    /// Screen the latest bar of every instrument into tiers
    Scan {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Write a configuration file populated with the defaults
    InitConfig {
        /// Destination path
        #[arg(default_value = "screener.toml")]
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory of per-instrument CSV files
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// code,name lookup file
    #[arg(short, long)]
    pub names_file: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'D', long)]
    pub output_dir: Option<PathBuf>,

    /// Worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PolicyArg {
    DropNull,
    ZeroFill,
}

impl From<PolicyArg> for NullPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::DropNull => NullPolicy::DropNull,
            PolicyArg::ZeroFill => NullPolicy::ZeroFill,
        }
    }
}
