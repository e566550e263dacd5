//! CLI command definitions for the `lorekeeper` binary.
//!
//! Uses clap derive macros. Every model and agent knob can be overridden
//! per run by a flag or its environment variable.

pub mod index;
pub mod serve;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;

use lorekeeper_types::config::ServiceConfig;

/// Game-master assistant for tabletop campaigns.
#[derive(Parser)]
#[command(name = "lorekeeper", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed logs (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory holding config.toml, the database and campaign files.
    #[arg(long, env = "LOREKEEPER_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the WebSocket and REST server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// JWKS endpoint of the identity provider.
        #[arg(long, env = "LOREKEEPER_JWKS_URL")]
        jwks_url: Option<String>,

        /// Required `iss` claim.
        #[arg(long, env = "LOREKEEPER_JWT_ISSUER")]
        issuer: Option<String>,

        #[command(flatten)]
        overrides: ModelOverrides,

        #[command(flatten)]
        bedrock: BedrockArgs,
    },

    /// Chunk, embed and store every file of one campaign for search.
    Index {
        /// Owner of the campaign.
        #[arg(long)]
        user: String,

        /// Campaign directory name.
        #[arg(long)]
        campaign: String,

        #[command(flatten)]
        overrides: ModelOverrides,

        #[command(flatten)]
        bedrock: BedrockArgs,
    },
}

/// Per-run overrides for `[models]` and `[agent]` settings.
#[derive(Args, Debug, Default)]
pub struct ModelOverrides {
    #[arg(long, env = "LOREKEEPER_PLANNING_MODEL")]
    pub planning_model: Option<String>,

    #[arg(long, env = "LOREKEEPER_SYNTHESIS_MODEL")]
    pub synthesis_model: Option<String>,

    #[arg(long, env = "LOREKEEPER_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Bedrock region.
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Planning rounds before synthesis is forced.
    #[arg(long, env = "LOREKEEPER_MAX_ITERATIONS")]
    pub max_iterations: Option<u32>,

    /// Token budget for the conversation history tool.
    #[arg(long, env = "LOREKEEPER_MAX_HISTORY_TOKENS")]
    pub max_history_tokens: Option<u32>,
}

impl ModelOverrides {
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(model) = &self.planning_model {
            config.models.planning_model = model.clone();
        }
        if let Some(model) = &self.synthesis_model {
            config.models.synthesis_model = model.clone();
        }
        if let Some(model) = &self.embedding_model {
            config.models.embedding_model = model.clone();
        }
        if let Some(region) = &self.region {
            config.models.region = region.clone();
        }
        if let Some(n) = self.max_iterations {
            config.agent.max_iterations = n;
        }
        if let Some(n) = self.max_history_tokens {
            config.agent.max_history_tokens = n;
        }
    }
}

#[derive(Args, Debug)]
pub struct BedrockArgs {
    /// Bedrock API key.
    #[arg(long = "bedrock-token", env = "AWS_BEARER_TOKEN_BEDROCK", hide_env_values = true)]
    pub token: String,
}

impl BedrockArgs {
    pub fn secret(&self) -> SecretString {
        SecretString::from(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_values() {
        let mut config = ServiceConfig::default();
        let synthesis_before = config.models.synthesis_model.clone();

        ModelOverrides {
            planning_model: Some("planner-x".to_string()),
            max_iterations: Some(5),
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.models.planning_model, "planner-x");
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.models.synthesis_model, synthesis_before);
    }

    #[test]
    fn test_parse_index_command() {
        let cli = Cli::try_parse_from([
            "lorekeeper",
            "-vv",
            "index",
            "--user",
            "u1",
            "--campaign",
            "saltmarsh",
            "--bedrock-token",
            "abc",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Commands::Index { user, campaign, bedrock, .. } = cli.command else {
            panic!("expected index command");
        };
        assert_eq!((user.as_str(), campaign.as_str()), ("u1", "saltmarsh"));
        assert_eq!(bedrock.token, "abc");
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["lorekeeper", "serve", "--bedrock-token", "abc"]).unwrap();
        let Commands::Serve { port, host, .. } = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(port, 3000);
        assert_eq!(host, "127.0.0.1");
    }
}
