/// Configuration management for the dissertation critic
use crate::agents::{OrchestratorConfig, RunnerConfig, SessionConfig, SynthesizerConfig};
use crate::llm::{LLMConfig, Model};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const FALLBACK_API_KEY_VAR: &str = "API_KEY";
const ENV_PREFIX: &str = "DISSERTATION_CRITIC_";

const DEFAULT_ANALYSIS_MODEL: &str = "gemini-3-pro-preview";
const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const SUPPORTED_FORMATS: [&str; 3] = ["markdown", "json", "text"];

/// Commented starting point written by `init`
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Dissertation Critic Configuration

gemini:
  # API key; GEMINI_API_KEY (or API_KEY) in the environment takes precedence
  # api_key: ""
  analysis_model: gemini-3-pro-preview
  chat_model: gemini-2.5-flash
  # Per-call HTTP timeout; unset waits indefinitely
  request_timeout_seconds: null

analysis:
  temperature: 0.2
  # Per-agent deadline; a timed-out agent is marked failed
  agent_timeout_seconds: null

chat:
  # Ground examiner answers with Google Search
  search_enabled: true
  temperature: null

output:
  # markdown, json or text
  format: markdown
  # Export Laporan_Kritik_<file>.md here after each critique
  directory: null
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiSettings,
    pub analysis: AnalysisSettings,
    pub chat: ChatSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub analysis_model: String,
    pub chat_model: String,
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub temperature: f32,
    pub agent_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub search_enabled: bool,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub format: String,
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Configured,
    Missing,
}

impl std::fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialStatus::Configured => write!(f, "API key configured"),
            CredentialStatus::Missing => write!(
                f,
                "API key missing: set {} (or {}) or gemini.api_key",
                API_KEY_VAR, FALLBACK_API_KEY_VAR
            ),
        }
    }
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            request_timeout_seconds: None,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            agent_timeout_seconds: None,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            search_enabled: true,
            temperature: None,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: "markdown".to_string(),
            directory: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini: GeminiSettings::default(),
            analysis: AnalysisSettings::default(),
            chat: ChatSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse configuration file")?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();
        let prefixed = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|value| !value.trim().is_empty())
        };

        config.gemini.api_key = lookup(API_KEY_VAR)
            .or_else(|| lookup(FALLBACK_API_KEY_VAR))
            .filter(|key| !key.trim().is_empty());

        if let Some(base_url) = prefixed("BASE_URL") {
            config.gemini.base_url = Some(base_url);
        }
        if let Some(model) = prefixed("ANALYSIS_MODEL") {
            config.gemini.analysis_model = model;
        }
        if let Some(model) = prefixed("CHAT_MODEL") {
            config.gemini.chat_model = model;
        }
        if let Some(timeout) = prefixed("REQUEST_TIMEOUT_SECONDS") {
            config.gemini.request_timeout_seconds = Some(
                timeout
                    .parse()
                    .with_context(|| format!("Invalid {}REQUEST_TIMEOUT_SECONDS", ENV_PREFIX))?,
            );
        }
        if let Some(temperature) = prefixed("TEMPERATURE") {
            config.analysis.temperature = temperature
                .parse()
                .with_context(|| format!("Invalid {}TEMPERATURE", ENV_PREFIX))?;
        }
        if let Some(timeout) = prefixed("AGENT_TIMEOUT_SECONDS") {
            config.analysis.agent_timeout_seconds = Some(
                timeout
                    .parse()
                    .with_context(|| format!("Invalid {}AGENT_TIMEOUT_SECONDS", ENV_PREFIX))?,
            );
        }
        if let Some(search) = prefixed("CHAT_SEARCH_ENABLED") {
            config.chat.search_enabled = search
                .parse()
                .with_context(|| format!("Invalid {}CHAT_SEARCH_ENABLED", ENV_PREFIX))?;
        }
        if let Some(format) = prefixed("OUTPUT_FORMAT") {
            config.output.format = format;
        }

        Ok(config)
    }

    /// Merge with another configuration (other takes precedence where it differs from defaults)
    pub fn merge_with(&mut self, other: Config) {
        let defaults = Config::default();

        if other.gemini.api_key.is_some() {
            self.gemini.api_key = other.gemini.api_key;
        }
        if other.gemini.base_url.is_some() {
            self.gemini.base_url = other.gemini.base_url;
        }
        if other.gemini.analysis_model != defaults.gemini.analysis_model {
            self.gemini.analysis_model = other.gemini.analysis_model;
        }
        if other.gemini.chat_model != defaults.gemini.chat_model {
            self.gemini.chat_model = other.gemini.chat_model;
        }
        if other.gemini.request_timeout_seconds.is_some() {
            self.gemini.request_timeout_seconds = other.gemini.request_timeout_seconds;
        }

        if other.analysis.temperature != defaults.analysis.temperature {
            self.analysis.temperature = other.analysis.temperature;
        }
        if other.analysis.agent_timeout_seconds.is_some() {
            self.analysis.agent_timeout_seconds = other.analysis.agent_timeout_seconds;
        }

        if other.chat.search_enabled != defaults.chat.search_enabled {
            self.chat.search_enabled = other.chat.search_enabled;
        }
        if other.chat.temperature.is_some() {
            self.chat.temperature = other.chat.temperature;
        }

        if other.output.format != defaults.output.format {
            self.output.format = other.output.format;
        }
        if other.output.directory.is_some() {
            self.output.directory = other.output.directory;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.gemini.analysis_model.trim().is_empty() || self.gemini.chat_model.trim().is_empty() {
            return Err(anyhow::anyhow!("Model names must not be empty"));
        }

        if !(0.0..=2.0).contains(&self.analysis.temperature) {
            return Err(anyhow::anyhow!("Analysis temperature must be between 0 and 2"));
        }

        if let Some(temperature) = self.chat.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(anyhow::anyhow!("Chat temperature must be between 0 and 2"));
            }
        }

        if self.gemini.request_timeout_seconds == Some(0)
            || self.analysis.agent_timeout_seconds == Some(0)
        {
            return Err(anyhow::anyhow!("Timeouts must be greater than 0 when set"));
        }

        if !SUPPORTED_FORMATS.contains(&self.output.format.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!(
                "Unsupported output format '{}', expected one of {:?}",
                self.output.format,
                SUPPORTED_FORMATS
            ));
        }

        Ok(())
    }

    /// The configured credential, ignoring blank values
    pub fn api_key(&self) -> Option<&str> {
        self.gemini
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn credential_status(&self) -> CredentialStatus {
        match self.api_key() {
            Some(_) => CredentialStatus::Configured,
            None => CredentialStatus::Missing,
        }
    }

    pub fn llm_config(&self) -> LLMConfig {
        LLMConfig {
            api_key: self.api_key().map(str::to_string),
            base_url: self.gemini.base_url.clone(),
            timeout_seconds: self.gemini.request_timeout_seconds,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let model = Model::parse(&self.gemini.analysis_model);
        OrchestratorConfig {
            runner: RunnerConfig {
                model: model.clone(),
                temperature: self.analysis.temperature,
                agent_timeout_seconds: self.analysis.agent_timeout_seconds,
            },
            synthesizer: SynthesizerConfig {
                model,
                temperature: self.analysis.temperature,
            },
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: Model::parse(&self.gemini.chat_model),
            search_enabled: self.chat.search_enabled,
            temperature: self.chat.temperature,
        }
    }
}
