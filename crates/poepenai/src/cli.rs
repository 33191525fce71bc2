use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use conversion_ox::poe_openai::DEFAULT_CONVERSATION_ID;
use poe_ox::client::DEFAULT_BASE_URL;

use crate::log_ring::DEFAULT_LOG_BUFFER_SIZE;

#[derive(Parser, Debug)]
#[command(name = "poepenai", version)]
#[command(about = "An OpenAI-compatible API adapter for Poe.")]
#[command(long_about = "Proxies OpenAI chat-completion requests to Poe bots, \
providing an OpenAI-compatible interface. The bearer token of each request is \
used as the Poe API key.")]
pub struct Cli {
    /// Log level (debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub loglevel: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the adapter server
    Start(ServerArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "PORT")]
    pub port: u16,

    /// Number of recent log lines shown on /logs
    #[arg(long, default_value_t = DEFAULT_LOG_BUFFER_SIZE)]
    pub log_buffer_size: usize,

    /// Conversation id sent to Poe with every query
    #[arg(long, default_value = DEFAULT_CONVERSATION_ID, env = "POEPENAI_CONVERSATION_ID")]
    pub conversation_id: String,

    /// Deadline for collecting a non-streaming completion
    #[arg(long, default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Base URL of the Poe bot API
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "POE_BASE_URL")]
    pub poe_base_url: String,
}

impl ServerArgs {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_defaults() {
        let cli = Cli::try_parse_from(["poepenai", "start"]).unwrap();
        assert_eq!(cli.loglevel, "info");
        let Some(Command::Start(args)) = cli.command else {
            panic!("expected start command");
        };
        assert_eq!(args.log_buffer_size, 25);
        assert_eq!(args.conversation_id, "poepenai-default-conversation");
        assert_eq!(args.request_timeout(), Duration::from_secs(60));
        assert_eq!(args.poe_base_url, "https://api.poe.com/bot");
    }

    #[test]
    fn test_loglevel_is_global() {
        let cli = Cli::try_parse_from(["poepenai", "start", "--loglevel", "debug", "--port", "9000"])
            .unwrap();
        assert_eq!(cli.loglevel, "debug");
        let Some(Command::Start(args)) = cli.command else {
            panic!("expected start command");
        };
        assert_eq!(args.port, 9000);
    }

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["poepenai"]).unwrap();
        assert!(cli.command.is_none());
    }
}
