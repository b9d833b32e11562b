// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - realtime chat and call consultations from the terminal.
//!
//! This is the binary entry point for the Parley engine.

mod call;
mod chat;

use clap::{Parser, Subcommand};
use parley_core::traits::auth::Credentials;
use parley_core::types::ParticipantId;

/// Parley - realtime consultation engine.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Participant id issued by the auth collaborator.
    #[arg(long, env = "PARLEY_PARTICIPANT_ID", global = true)]
    participant_id: Option<String>,

    /// Bearer token issued by the auth collaborator.
    #[arg(long, env = "PARLEY_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Open a chat room with another participant.
    Chat {
        /// The other participant's id.
        peer: String,
    },
    /// Start a billed call consultation with a provider.
    Call {
        /// The provider's participant id.
        provider: String,
    },
    /// Print the resolved configuration.
    Config,
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn credentials_from(cli: &Cli) -> Result<Credentials, String> {
    let participant_id = cli
        .participant_id
        .clone()
        .ok_or("missing --participant-id (or PARLEY_PARTICIPANT_ID)")?;
    let token = cli.token.clone().ok_or("missing --token (or PARLEY_TOKEN)")?;
    Ok(Credentials {
        participant_id: ParticipantId(participant_id),
        token,
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match parley_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.engine.log_level);

    let outcome = match cli.command {
        Some(Commands::Chat { ref peer }) => match credentials_from(&cli) {
            Ok(credentials) => chat::run_chat(&config, credentials, peer).await,
            Err(message) => Err(message.into()),
        },
        Some(Commands::Call { ref provider }) => match credentials_from(&cli) {
            Ok(credentials) => call::run_call(&config, credentials, provider).await,
            Err(message) => Err(message.into()),
        },
        Some(Commands::Config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => {
                    println!("{rendered}");
                    Ok(())
                }
                Err(e) => Err(format!("failed to render config: {e}").into()),
            }
        }
        None => {
            println!("parley: use --help for available commands");
            Ok(())
        }
    };

    if let Err(error) = outcome {
        eprintln!("parley: {error}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        // No config file needed; defaults must validate.
        let config = parley_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.engine.display_name, "parley");
    }

    #[test]
    fn cli_parses_chat_command() {
        let cli = Cli::parse_from([
            "parley",
            "--participant-id",
            "u1",
            "--token",
            "tok",
            "chat",
            "u2",
        ]);
        match cli.command {
            Some(Commands::Chat { ref peer }) => assert_eq!(peer, "u2"),
            ref other => panic!("expected chat command, got {other:?}"),
        }
        assert!(credentials_from(&cli).is_ok());
    }

    #[test]
    fn credentials_fall_back_to_environment() {
        use clap::CommandFactory;

        let command = Cli::command();
        let env_of = |name: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == name)
                .and_then(|arg| arg.get_env())
                .and_then(|var| var.to_str())
        };
        assert_eq!(env_of("participant_id"), Some("PARLEY_PARTICIPANT_ID"));
        assert_eq!(env_of("token"), Some("PARLEY_TOKEN"));
    }

    #[test]
    fn missing_credentials_reported() {
        let cli = Cli::parse_from(["parley", "chat", "u2"]);
        // Only valid when the corresponding env vars are absent.
        if std::env::var("PARLEY_PARTICIPANT_ID").is_err() {
            assert!(credentials_from(&cli).is_err());
        }
    }
}
