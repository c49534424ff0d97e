// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;
use std::time::Duration;

/// Application configuration. Built once at startup and handed to the
/// components that need it; nothing reads the environment after load.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string by default).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Path to the NPC profile JSON file.
    pub npc_config: PathBuf,
    /// Completion provider settings.
    pub ai: AiSettings,
    /// How many stored conversation turns to feed into each prompt.
    pub history_window: i64,
    /// How many recent player events to fold into each prompt.
    pub event_window: i64,
}

/// Settings for the completion provider client.
#[derive(Debug, Clone)]
pub struct AiSettings {
    /// Full URL of the chat-completions endpoint.
    pub base_url: String,
    /// Bearer token for the provider.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Deadline for a single completion request.
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - connection string (default: `sqlite:npc.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 8080)
    /// - `NPC_CONFIG` - path to the NPC profile JSON (default: `config/npcs.json`)
    /// - `OPENROUTER_BASE_URL` - chat-completions endpoint URL
    /// - `OPENROUTER_API_KEY` - provider API key
    /// - `OPENROUTER_MODEL` - model identifier (default: `openai/gpt-4o-mini`)
    /// - `AI_TIMEOUT_SECS` - completion request deadline (default: 30)
    /// - `HISTORY_WINDOW` - conversation turns per prompt (default: 10)
    /// - `EVENT_WINDOW` - player events per prompt (default: 5)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:npc.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(8080);

        let npc_config = std::env::var("NPC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/npcs.json"));

        let ai = AiSettings {
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".to_string()),
            api_key: std::env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            model: std::env::var("OPENROUTER_MODEL")
                .unwrap_or_else(|_| "openai/gpt-4o-mini".to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("AI_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        };

        let history_window = std::env::var("HISTORY_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let event_window = std::env::var("EVENT_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Config {
            database_url,
            port,
            npc_config,
            ai,
            history_window,
            event_window,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cli_value() {
        let args: Vec<String> = ["npc-backend", "--port", "9090"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            Config::parse_cli_value(&args, "--port"),
            Some("9090".to_string())
        );
        assert_eq!(Config::parse_cli_value(&args, "--host"), None);
    }

    #[test]
    fn test_parse_cli_value_flag_without_value() {
        let args: Vec<String> = ["npc-backend", "--port"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(Config::parse_cli_value(&args, "--port"), None);
    }
}
