//! Bot configuration: optional TOML file, then environment overrides.

use ask_transport::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskBotConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
    #[serde(default = "default_interactions_path")]
    pub interactions_path: String,
}

fn default_port() -> u16 {
    3000
}

fn default_http_timeout_seconds() -> u64 {
    30
}

fn default_http_max_in_flight() -> usize {
    256
}

fn default_interactions_path() -> String {
    "/api/interactions".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
            interactions_path: default_interactions_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub application_id: String,
    /// Hex-encoded Ed25519 key used to verify inbound interactions.
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_discord_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_thread_auto_archive_minutes")]
    pub thread_auto_archive_minutes: u32,
}

fn default_discord_api_base_url() -> String {
    ask_platform::DEFAULT_API_BASE_URL.to_string()
}

fn default_thread_auto_archive_minutes() -> u32 {
    60
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            public_key: String::new(),
            bot_token: String::new(),
            api_base_url: default_discord_api_base_url(),
            thread_auto_archive_minutes: default_thread_auto_archive_minutes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Generate,
    Stream,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    #[serde(default)]
    pub mode: AgentMode,
    /// When set, only tool calls whose name contains this marker get a status
    /// notice, and the marker is stripped from the announced name.
    #[serde(default)]
    pub status_tool_prefix: Option<String>,
}

fn default_agent_id() -> String {
    "discordMCPBotAgent".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            agent_id: default_agent_id(),
            mode: AgentMode::default(),
            status_tool_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_frame_chars")]
    pub frame_chars: usize,
    #[serde(default = "default_stream_flush_chars")]
    pub stream_flush_chars: usize,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_max_input_chars() -> usize {
    2000
}

fn default_frame_chars() -> usize {
    2000
}

fn default_stream_flush_chars() -> usize {
    1900
}

fn default_cooldown_ms() -> u64 {
    10_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            frame_chars: default_frame_chars(),
            stream_flush_chars: default_stream_flush_chars(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: u32,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_retry_timeout_ms() -> u64 {
    8000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_factor() -> u32 {
    2
}

fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_retry_timeout_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            factor: default_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl AskBotConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(default_config_path);
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::from_toml_str(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(config_path = %path.display(), "config file not found; using defaults");
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DISCORD_BOT_TOKEN") {
            self.discord.bot_token = v;
        }
        if let Some(v) = get("DISCORD_PUBLIC_KEY") {
            self.discord.public_key = v;
        }
        if let Some(v) = get("DISCORD_CLIENT_ID") {
            self.discord.application_id = v;
        }
        if let Some(v) = get("DISCORD_API_BASE_URL") {
            self.discord.api_base_url = v;
        }
        if let Some(v) = get("MASTRA_URL") {
            self.agent.base_url = v;
        }
        if let Some(v) = get("ASKBOT_AGENT_ID") {
            self.agent.agent_id = v;
        }
        if let Some(v) = get("PORT") {
            match v.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!(value = %v, %e, "ignoring invalid PORT override"),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server.port must be > 0"));
        }
        if !self.server.interactions_path.starts_with('/') {
            return Err(anyhow::anyhow!("server.interactions_path must start with '/'"));
        }
        if self.server.http_max_in_flight == 0 {
            return Err(anyhow::anyhow!("server.http_max_in_flight must be > 0"));
        }
        if self.limits.frame_chars == 0 {
            return Err(anyhow::anyhow!("limits.frame_chars must be > 0"));
        }
        if self.limits.stream_flush_chars == 0 {
            return Err(anyhow::anyhow!("limits.stream_flush_chars must be > 0"));
        }
        if self.limits.max_input_chars == 0 {
            return Err(anyhow::anyhow!("limits.max_input_chars must be > 0"));
        }
        if self.retry.factor == 0 {
            return Err(anyhow::anyhow!("retry.factor must be >= 1"));
        }
        if self.retry.timeout_ms == 0 {
            return Err(anyhow::anyhow!("retry.timeout_ms must be > 0"));
        }
        Ok(())
    }

    /// Credentials needed to serve interactions.
    pub fn require_serve_credentials(&self) -> anyhow::Result<()> {
        self.require_discord_credentials()?;
        if self.discord.public_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "discord.public_key is required (or set DISCORD_PUBLIC_KEY)"
            ));
        }
        if self.agent.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "agent.base_url is required (or set MASTRA_URL)"
            ));
        }
        Ok(())
    }

    pub fn require_discord_credentials(&self) -> anyhow::Result<()> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "discord.bot_token is required (or set DISCORD_BOT_TOKEN)"
            ));
        }
        if self.discord.application_id.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "discord.application_id is required (or set DISCORD_CLIENT_ID)"
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.retry.timeout_ms),
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            factor: self.retry.factor,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn cooldown_period(&self) -> Duration {
        Duration::from_millis(self.limits.cooldown_ms)
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".askbot").join("config.toml")
}
