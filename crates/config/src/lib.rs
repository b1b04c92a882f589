//! Configuration loading, validation, and management for sandclaw.
//!
//! Loads configuration from `~/.sandclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sandclaw/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backend selection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Extension servers, keyed by server name
    #[serde(default)]
    pub extensions: BTreeMap<String, ExtensionConfig>,

    /// Anonymous usage telemetry
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Which kind of OpenAI-compatible backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    OpenRouter,
    Local,
}

impl ProviderKind {
    /// The model used when none is configured.
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::OpenRouter => "anthropic/claude-sonnet-4",
            ProviderKind::Local => "llama3.2",
        }
    }

    /// Provider-specific API key variable consulted after `LLM_API_KEY`.
    fn key_env(self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::OpenRouter => Some("OPENROUTER_API_KEY"),
            ProviderKind::Local => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Local => "local",
        })
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "local" => Ok(ProviderKind::Local),
            other => Err(ConfigError::ValidationError(format!(
                "unknown provider '{other}' (expected openai, openrouter or local)"
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name; falls back to the kind's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Endpoint override; required for `local`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sent as `HTTP-Referer` to OpenRouter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderConfig {
    /// The configured model, or the kind's default.
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(self.kind.default_model())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            api_key: None,
            model: None,
            base_url: None,
            site_url: None,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("site_url", &self.site_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Replaces the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Non-system messages kept after pruning
    #[serde(default = "default_max_history")]
    pub max_history_messages: usize,

    /// Upper bound on steps per user message
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_max_history() -> usize {
    20
}
fn default_max_turns() -> usize {
    50
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_history_messages: default_max_history(),
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-command timeout for `run_command`
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// If non-empty, only these base commands may run
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    /// File tools may only touch paths under these roots (empty = anywhere)
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    /// File tools may never touch these prefixes
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    /// Where generated playbooks are written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_dir: Option<PathBuf>,
}

fn default_command_timeout() -> u64 {
    60
}
fn default_forbidden_paths() -> Vec<String> {
    vec!["~/.ssh".into(), "~/.gnupg".into(), "/etc/shadow".into()]
}

impl ToolsConfig {
    /// The playbook directory, defaulting under the config dir.
    pub fn playbook_dir(&self) -> PathBuf {
        self.playbook_dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("playbooks"))
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            allowed_commands: Vec::new(),
            allowed_roots: Vec::new(),
            forbidden_paths: default_forbidden_paths(),
            playbook_dir: None,
        }
    }
}

/// How to launch one extension server.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ExtensionConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: BTreeMap::new(),
            enabled: true,
        }
    }
}

impl std::fmt::Debug for ExtensionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // env usually holds tokens
        let env_keys: Vec<&String> = self.env.keys().collect();
        f.debug_struct("ExtensionConfig")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl AppConfig {
    /// Load configuration from the default path (~/.sandclaw/config.toml)
    /// and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Variables: `LLM_PROVIDER`, `LLM_API_KEY` (then `OPENAI_API_KEY` /
    /// `OPENROUTER_API_KEY`), `LLM_MODEL`, `LLM_BASE_URL`,
    /// `OPENROUTER_SITE_URL`, `ANONYMIZED_TELEMETRY`. Extension servers are
    /// also discovered from tokens; entries already in the file win.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(kind) = get("LLM_PROVIDER") {
            match kind.parse() {
                Ok(kind) => self.provider.kind = kind,
                Err(e) => tracing::warn!("Ignoring LLM_PROVIDER: {e}"),
            }
        }

        let key = get("LLM_API_KEY").or_else(|| self.provider.kind.key_env().and_then(&get));
        if let Some(key) = key {
            self.provider.api_key = Some(key);
        } else if self.provider.kind == ProviderKind::Local && self.provider.api_key.is_none() {
            self.provider.api_key = Some("local".into());
        }

        if let Some(model) = get("LLM_MODEL") {
            self.provider.model = Some(model);
        }
        if let Some(url) = get("LLM_BASE_URL") {
            self.provider.base_url = Some(url);
        }
        if let Some(site) = get("OPENROUTER_SITE_URL") {
            self.provider.site_url = Some(site);
        }
        if let Some(flag) = get("ANONYMIZED_TELEMETRY") {
            self.telemetry.enabled = parse_flag(&flag);
        }

        for (name, server) in discover_extensions(&lookup) {
            self.extensions.entry(name).or_insert(server);
        }
    }

    /// Path of the config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sandclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be greater than 0".into(),
            ));
        }

        if self.tools.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.command_timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some((name, _)) = self.extensions.iter().find(|(_, e)| e.command.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "extension '{name}' has an empty command"
            )));
        }

        Ok(())
    }

    /// Check the credentials the selected provider needs.
    pub fn check_credentials(&self) -> Result<(), ConfigError> {
        match self.provider.kind {
            ProviderKind::Local if self.provider.base_url.is_none() => Err(ConfigError::MissingCredentials(
                "LLM_BASE_URL is required for the local provider".into(),
            )),
            ProviderKind::Local => Ok(()),
            kind if !self.provider.has_api_key() => Err(ConfigError::MissingCredentials(format!(
                "no API key for {kind}; set LLM_API_KEY or {}",
                kind.key_env().unwrap_or("provider.api_key")
            ))),
            _ => Ok(()),
        }
    }

    /// Enabled extension servers.
    pub fn enabled_extensions(&self) -> impl Iterator<Item = (&String, &ExtensionConfig)> {
        self.extensions.iter().filter(|(_, e)| e.enabled)
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Well-known extension servers enabled by the presence of their tokens.
pub fn discover_extensions<F>(lookup: F) -> Vec<(String, ExtensionConfig)>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let mut servers = Vec::new();

    if let (Some(bot), Some(app)) = (get("SLACK_BOT_TOKEN"), get("SLACK_APP_TOKEN")) {
        let mut server = ExtensionConfig::new(
            "npx",
            vec!["-y".into(), "@modelcontextprotocol/server-slack".into()],
        );
        server.env.insert("SLACK_BOT_TOKEN".into(), bot);
        server.env.insert("SLACK_APP_TOKEN".into(), app);
        if let Some(path) = get("PATH") {
            server.env.insert("PATH".into(), path);
        }
        servers.push(("slack".to_string(), server));
    }

    if let Some(token) = get("GITHUB_PERSONAL_ACCESS_TOKEN") {
        let mut server = ExtensionConfig::new(
            "npx",
            vec!["-y".into(), "@modelcontextprotocol/server-github".into()],
        );
        server.env.insert("GITHUB_PERSONAL_ACCESS_TOKEN".into(), token);
        if let Some(path) = get("PATH") {
            server.env.insert("PATH".into(), path);
        }
        servers.push(("github".to_string(), server));
    }

    servers
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}
