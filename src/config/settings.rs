//! Application settings and configuration types.
//!
//! Settings come from an optional JSON file ([`Settings::load`]), by
//! default `~/.config/mailsift/settings.json` (or the XDG equivalent), with
//! the process environment applied on top ([`Settings::resolve`]).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("unknown AI provider: {0}")]
    UnknownProvider(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub google: GoogleSettings,
    pub database: DatabaseSettings,
    pub ai: AiSettings,
    pub sync: SyncSettings,
    pub unsubscribe: UnsubscribeSettings,
    pub realtime: RealtimeSettings,
}

/// Listener and deployment settings consumed by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub base_url: String,
    /// Deployment environment name (`development`, `production`).
    pub environment: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Google OAuth client registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    pub client_id: String,
    pub client_secret: String,
}

/// Storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file path; `:memory:` opens a transient database.
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "mailsift.db".to_string(),
        }
    }
}

/// Which inference backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderKind {
    OpenAi,
    DeepSeek,
    #[default]
    Gemini,
    Anthropic,
    Ollama,
}

impl AiProviderKind {
    /// Parses a provider name, case-insensitively.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "gemini" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }

    /// Model used when none is configured.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::DeepSeek => "deepseek-chat",
            Self::Gemini => "gemini-2.0-flash-lite",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::Ollama => "llama3.2",
        }
    }

    /// Local backends run without an API key.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

/// Inference backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub provider: AiProviderKind,
    pub api_key: String,
    /// Overrides [`AiProviderKind::default_model`].
    pub model: Option<String>,
    /// Overrides the backend's default endpoint.
    pub base_url: Option<String>,
    /// Sampling temperature for every request.
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: AiProviderKind::default(),
            api_key: String::new(),
            model: None,
            base_url: None,
            temperature: 0.2,
            request_timeout_secs: 60,
        }
    }
}

impl AiSettings {
    /// Configured model, or the provider default.
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

/// Sync engine and scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between scheduler ticks.
    pub interval_secs: u64,
    /// Result-size limit for on-demand syncs.
    pub max_fetch: u32,
    /// Result-size limit for scheduled syncs.
    pub scheduled_max_results: u32,
    /// Ceiling on messages processed concurrently within one sync.
    pub concurrency: usize,
    /// Messages pushed to subscribers after a first-ever sync.
    pub first_sync_limit: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_fetch: 10,
            scheduled_max_results: 50,
            concurrency: 8,
            first_sync_limit: 10,
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// HTTP behavior of the unsubscribe executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsubscribeSettings {
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for UnsubscribeSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
        }
    }
}

impl UnsubscribeSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Realtime fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// Buffered events per sink before delivery starts waiting.
    pub sink_capacity: usize,
    /// How long delivery waits on a full sink before dropping the event.
    pub delivery_timeout_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            sink_capacity: 10,
            delivery_timeout_ms: 5_000,
        }
    }
}

impl RealtimeSettings {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Settings {
    /// Builds settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Builds settings from an explicit set of variables.
    ///
    /// Unset variables keep their defaults. Unparsable numeric values fall
    /// back to the default as well.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Settings::default().apply_vars(vars)
    }

    /// Reads the settings file, if any, then applies the process environment.
    ///
    /// The file is `MAILSIFT_CONFIG` when set, otherwise [`default_path`]
    /// when it exists.
    ///
    /// [`default_path`]: Settings::default_path
    pub fn resolve() -> Result<Self> {
        let path = std::env::var_os("MAILSIFT_CONFIG")
            .map(PathBuf::from)
            .or_else(|| Self::default_path().filter(|p| p.exists()));
        Self::layered(path.as_deref(), std::env::vars())
    }

    /// Loads `path` (or defaults when `None`) and overlays `vars` on top.
    pub fn layered<I, K, V>(path: Option<&Path>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let base = match path {
            Some(path) => Self::load(path)?,
            None => Settings::default(),
        };
        base.apply_vars(vars)
    }

    fn apply_vars<I, K, V>(self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let mut settings = self;

        if let Some(port) = get("PORT").and_then(|v| v.parse().ok()) {
            settings.server.port = port;
        }
        if let Some(base_url) = get("BASE_URL") {
            settings.server.base_url = base_url.to_string();
        }
        if let Some(env) = get("ENV") {
            settings.server.environment = env.to_string();
        }

        if let Some(id) = get("GOOGLE_CLIENT_ID") {
            settings.google.client_id = id.to_string();
        }
        if let Some(secret) = get("GOOGLE_CLIENT_SECRET") {
            settings.google.client_secret = secret.to_string();
        }

        if let Some(path) = get("DATABASE_URL") {
            settings.database.path = path.to_string();
        }

        if let Some(provider) = get("AI_PROVIDER") {
            settings.ai.provider = AiProviderKind::parse(provider)?;
        }
        if let Some(key) = get("AI_API_KEY") {
            settings.ai.api_key = key.to_string();
        }
        if let Some(model) = get("AI_MODEL") {
            settings.ai.model = Some(model.to_string());
        }
        if let Some(base_url) = get("AI_BASE_URL") {
            settings.ai.base_url = Some(base_url.to_string());
        }

        if let Some(max) = get("MAX_FETCH_EMAILS").and_then(|v| v.parse().ok()) {
            settings.sync.max_fetch = max;
        }
        if let Some(secs) = get("EMAIL_SYNC_INTERVAL_SECONDS")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|s| *s > 0)
        {
            settings.sync.interval_secs = secs as u64;
        }

        Ok(settings)
    }

    /// Loads settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Default settings file location for this user, if one can be derived.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "mailsift", "mailsift")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Checks that the settings required at runtime are present.
    pub fn validate(&self) -> Result<()> {
        if self.google.client_id.is_empty() {
            return Err(ConfigError::Missing("GOOGLE_CLIENT_ID"));
        }
        if self.google.client_secret.is_empty() {
            return Err(ConfigError::Missing("GOOGLE_CLIENT_SECRET"));
        }
        if self.ai.provider.requires_api_key() && self.ai.api_key.is_empty() {
            return Err(ConfigError::Missing("AI_API_KEY"));
        }
        Ok(())
    }
}
