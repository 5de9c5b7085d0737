use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported Gemini models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    Gemini3ProPreview,
    Gemini25Pro,
    Gemini25Flash,

    // Custom model string
    Custom(String),
}

impl Model {
    pub fn as_str(&self) -> &str {
        match self {
            Model::Gemini3ProPreview => "gemini-3-pro-preview",
            Model::Gemini25Pro => "gemini-2.5-pro",
            Model::Gemini25Flash => "gemini-2.5-flash",
            Model::Custom(s) => s,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "gemini-3-pro-preview" => Model::Gemini3ProPreview,
            "gemini-2.5-pro" => Model::Gemini25Pro,
            "gemini-2.5-flash" => Model::Gemini25Flash,
            other => Model::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered piece of request content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentPart {
    Text(String),
    /// Binary payload, already base64 encoded
    InlineData { mime_type: String, data: String },
}

/// Capabilities the model may use while answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tool {
    GoogleSearch,
}

/// One-shot generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: Model,
    pub parts: Vec<ContentPart>,
    pub system_instruction: Option<String>,
    pub tools: Vec<Tool>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            parts: Vec::new(),
            system_instruction: None,
            tools: Vec::new(),
            temperature: None,
        }
    }

    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_part(ContentPart::Text(text.into()))
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Concatenated text parts, ignoring binary payloads
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Settings for a stateful chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub model: Model,
    pub system_instruction: Option<String>,
    pub tools: Vec<Tool>,
    pub temperature: Option<f32>,
}

/// Generation response structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated text, possibly empty
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl GenerationResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    #[default]
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other(String),
}

impl FinishReason {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("STOP") => FinishReason::Stop,
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            Some("SAFETY") => FinishReason::Safety,
            Some("RECITATION") => FinishReason::Recitation,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Errors raised by a generation backend
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Prompt blocked: {0}")]
    Blocked(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),
}

/// Remote generation service: stateless one-shot calls plus stateful chats
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Send a one-shot generation request
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;

    /// Open a chat whose history is kept by the returned session
    fn start_chat(&self, config: ChatConfig) -> Box<dyn ChatSession>;

    /// Check that the service is reachable and the credential accepted
    async fn health_check(&self) -> Result<bool, LlmError>;
}

/// A running chat; each successful send extends its history
#[async_trait]
pub trait ChatSession: Send + Sync {
    async fn send_message(&mut self, message: &str) -> Result<GenerationResponse, LlmError>;

    /// Number of turns (user and model) recorded so far
    fn history_len(&self) -> usize;
}
