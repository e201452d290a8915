use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "seva", version, about = "Citizen government-services chat assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, default_value = "./config/example-config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seva=info,seva_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Command::Serve { config } = Cli::parse().command;

    let cfg = match seva_config::load_and_validate(&config) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(path = %config, error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    if let Err(e) = seva_server::serve(cfg).await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
