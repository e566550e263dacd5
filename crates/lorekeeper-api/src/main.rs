//! Lorekeeper server and CLI entry point.
//!
//! Binary name: `lorekeeper`
//!
//! Parses CLI arguments, installs tracing, loads `config.toml` from the data
//! directory, applies flag overrides, then serves or indexes.

mod cli;
mod http;
mod hub;
mod state;

use clap::Parser;

use lorekeeper_infra::config::{load_service_config, resolve_data_dir};
use lorekeeper_observe::tracing_setup::{default_directive, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(default_directive(cli.verbose), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(resolve_data_dir);
    let mut config = load_service_config(&data_dir).await;

    match cli.command {
        Commands::Serve {
            port,
            host,
            jwks_url,
            issuer,
            overrides,
            bedrock,
        } => {
            overrides.apply(&mut config);
            if let Some(url) = jwks_url {
                config.auth.jwks_url = url;
            }
            if issuer.is_some() {
                config.auth.issuer = issuer;
            }

            let state = AppState::init(config, data_dir, bedrock.secret()).await?;
            cli::serve::serve(state, &host, port).await
        }

        Commands::Index {
            user,
            campaign,
            overrides,
            bedrock,
        } => {
            overrides.apply(&mut config);
            cli::index::index_campaign(
                &config,
                &data_dir,
                bedrock.secret(),
                &user,
                &campaign,
                cli.json,
            )
            .await
        }
    }
}
