use clap::Parser;
use rt_investor::cli::{describe_config, Cli, Commands};
use rt_investor::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(level) = cli.log_level {
        config.logging.log_level = level;
    }

    let _telemetry = rt_investor::telemetry::init_telemetry(&config.logging)?;

    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Configuration validation failed");
        return Err(e.into());
    }
    config.ensure_directories()?;

    match cli.command {
        Commands::Backtest(args) => {
            tracing::info!("Starting backtest");
            args.execute(&config).await?;
        }
        Commands::Stream(args) => {
            tracing::info!("Starting market data stream");
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("{}", describe_config(&config));
        }
    }

    Ok(())
}
