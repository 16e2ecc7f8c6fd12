use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use impala_pool_scheduler::client::ClusterManagerClient;
use impala_pool_scheduler::config::{self, LoggingConfig, Paths};
use impala_pool_scheduler::daemon;

#[derive(Parser)]
#[command(name = "impala-pool-scheduler", about = "Autonomous admission-control pool rebalancer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic reallocation loop in the foreground.
    Start,
    /// Signal a running daemon to stop.
    Stop,
    /// Stop then start.
    Restart,
    /// Validate configuration against the engine's live pool tree.
    Check,
    /// Back up the current engine config to the resources directory.
    Backup,
    /// Push a previously saved backup back to the engine.
    Rollback,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let paths = match Paths::from_env() {
        Ok(p) => p,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if let Ok(logging) = LoggingConfig::read(&paths.logging_config_path(), &paths.home) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(logging.to_env_filter_directive()))
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info"))
            .try_init();
    }

    let config = match config::read_yaml(&paths.scheduler_config_path(), &paths.home) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let client = match ClusterManagerClient::new(
        &config.cloudera_manager.server_url,
        &config.cloudera_manager.api_version,
        &config.cloudera_manager.cluster_name,
        &config.cloudera_manager.username,
        &config.cloudera_manager.password,
    ) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Start => daemon::start(client, config, paths).await,
        Command::Restart => daemon::restart(client, config, paths).await,
        Command::Stop => daemon::stop(&paths),
        Command::Check => daemon::check(&client, &config).await,
        Command::Backup => daemon::backup(&client, &paths).await,
        Command::Rollback => daemon::rollback(&client, &paths).await,
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
