use config::{ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Postgres URL; the in-memory store is used when absent
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    /// File holding the bot token, read when `bot_token` is unset
    #[serde(default)]
    pub bot_token_file: Option<String>,
    #[serde(default = "default_bot_api_url")]
    pub bot_api_url: String,
    /// Mention that prefixes every command, e.g. `@dues_bot`
    pub bot_handle: String,
    pub group_id: i64,
    pub owner_id: i64,
    /// Flat charge for attendees without an estimate
    #[serde(default)]
    pub guest_charge: Option<i64>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub scheduler_enabled: bool,
    #[serde(default = "default_adjust_hour")]
    pub adjust_hour: u32,
}

fn default_bind_address() -> String {
    "0.0.0.0:3333".to_string()
}

fn default_bot_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_adjust_hour() -> u32 {
    22
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::default())
    }

    fn load(environment: Environment) -> Result<Self, ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_handle.trim().is_empty() {
            return Err(ConfigError::Message("BOT_HANDLE must not be empty".into()));
        }
        if self.adjust_hour > 23 {
            return Err(ConfigError::Message(format!(
                "ADJUST_HOUR must be 0-23, got {}",
                self.adjust_hour
            )));
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Message(format!(
                "UTC_OFFSET_MINUTES must be within a day, got {}",
                self.utc_offset_minutes
            )));
        }
        if matches!(self.guest_charge, Some(charge) if charge <= 0) {
            return Err(ConfigError::Message("GUEST_CHARGE must be positive".into()));
        }
        Ok(())
    }

    /// Token from `BOT_TOKEN`, else the first line of `BOT_TOKEN_FILE`
    pub fn resolve_bot_token(&self) -> Result<String, ConfigError> {
        if let Some(token) = self.bot_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }
        let path = self
            .bot_token_file
            .as_deref()
            .ok_or_else(|| ConfigError::NotFound("bot_token".into()))?;
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Message(format!("reading {}: {}", path, e)))?;
        contents
            .lines()
            .next()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ConfigError::Message(format!("{} holds no token", path)))
    }
}
