use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use backtesting::report::format_summary;
use screener::scanner::format_scan;
use screener::{backtest, scan, Config};

#[path = "entrypoint_helper.rs"]
mod entrypoint_helper;

use entrypoint_helper::{Cli, CommonArgs, Commands};

fn load_config(args: &CommonArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.paths.data_dir = dir.clone();
    }
    if let Some(file) = &args.names_file {
        config.paths.names_file = file.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.paths.output_dir = dir.clone();
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest { common, null_policy } => {
            let mut config = load_config(&common)?;
            if let Some(policy) = null_policy {
                config.backtest.null_policy = policy.into();
            }

            println!("\n=== BACKTEST MODE ===");
            println!("Data dir:  {}", config.paths.data_dir.display());
            println!("Predicate: {}", config.backtest.predicate.name);
            println!("Horizons:  {:?}\n", config.backtest.horizons);

            let run = backtest(&config)?;
            println!("{}", format_summary(&run.summary, &run.tally));
            println!("✓ Ledger saved to: {}", run.ledger_path.display());
            println!("✓ Summary saved to: {}", run.summary_path.display());
            println!("✓ JSON saved to: {}", run.json_path.display());
        }
        Commands::Scan { common } => {
            let config = load_config(&common)?;

            println!("\n=== SCAN MODE ===");
            println!("Data dir: {}\n", config.paths.data_dir.display());

            let run = scan(&config)?;
            println!("{}", format_scan(&run.hits, &run.tally));
            match run.output {
                Some(path) => println!("✓ Results saved to: {}", path.display()),
                None => println!("No instrument matched any tier."),
            }
        }
        Commands::InitConfig { path } => {
            Config::default().to_file(&path)?;
            println!("✓ Default configuration written to: {}", path.display());
        }
    }

    Ok(())
}
