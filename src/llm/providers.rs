use super::interfaces::*;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Configuration for the Gemini provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// No timeout when unset
    pub timeout_seconds: Option<u64>,
}

/// Gemini provider over the `generateContent` REST endpoint
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    /// A missing key is not rejected here: requests go out unauthenticated and
    /// fail at the API, where callers turn the failure into in-band state.
    pub fn new(config: LLMConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().unwrap_or_default();

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut builder = Client::builder();
        if let Some(seconds) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl GenerationService for GeminiProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let contents = vec![json!({
            "role": "user",
            "parts": request.parts.iter().map(part_to_json).collect::<Vec<_>>(),
        })];

        let body = build_body(
            contents,
            request.system_instruction.as_deref(),
            &request.tools,
            request.temperature,
        );

        post_generate(
            &self.client,
            &self.base_url,
            &self.api_key,
            &request.model,
            &body,
        )
        .await
    }

    fn start_chat(&self, config: ChatConfig) -> Box<dyn ChatSession> {
        Box::new(GeminiChatSession {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            config,
            history: Vec::new(),
        })
    }

    async fn health_check(&self) -> Result<bool, LlmError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        Ok(response.status().is_success())
    }
}

/// Chat whose history is replayed on every turn
pub struct GeminiChatSession {
    client: Client,
    api_key: String,
    base_url: String,
    config: ChatConfig,
    history: Vec<Value>,
}

#[async_trait]
impl ChatSession for GeminiChatSession {
    async fn send_message(&mut self, message: &str) -> Result<GenerationResponse, LlmError> {
        let body = build_body(
            turn_contents(&self.history, message),
            self.config.system_instruction.as_deref(),
            &self.config.tools,
            self.config.temperature,
        );

        let response = post_generate(
            &self.client,
            &self.base_url,
            &self.api_key,
            &self.config.model,
            &body,
        )
        .await?;

        // Failed turns never reach the history
        self.record_turn(message, &response.content);
        Ok(response)
    }

    fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl GeminiChatSession {
    fn record_turn(&mut self, message: &str, reply: &str) {
        self.history.push(text_turn("user", message));
        self.history.push(text_turn("model", reply));
    }
}

fn text_turn(role: &str, text: &str) -> Value {
    json!({
        "role": role,
        "parts": [{ "text": text }],
    })
}

/// Earlier turns followed by the new user message
fn turn_contents(history: &[Value], message: &str) -> Vec<Value> {
    let mut contents = history.to_vec();
    contents.push(text_turn("user", message));
    contents
}

fn part_to_json(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text(text) => json!({ "text": text }),
        ContentPart::InlineData { mime_type, data } => json!({
            "inline_data": {
                "mime_type": mime_type,
                "data": data,
            }
        }),
    }
}

fn build_body(
    contents: Vec<Value>,
    system_instruction: Option<&str>,
    tools: &[Tool],
    temperature: Option<f32>,
) -> Value {
    let mut body = json!({ "contents": contents });

    if let Some(system) = system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }

    if !tools.is_empty() {
        body["tools"] = json!(tools
            .iter()
            .map(|tool| match tool {
                Tool::GoogleSearch => json!({ "google_search": {} }),
            })
            .collect::<Vec<_>>());
    }

    if let Some(temperature) = temperature {
        body["generationConfig"] = json!({ "temperature": temperature });
    }

    body
}

async fn post_generate(
    client: &Client,
    base_url: &str,
    api_key: &str,
    model: &Model,
    body: &Value,
) -> Result<GenerationResponse, LlmError> {
    debug!("Sending generateContent request to model {}", model);

    let response = client
        .post(format!("{}/models/{}:generateContent", base_url, model.as_str()))
        .header(API_KEY_HEADER, api_key)
        .json(body)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(LlmError::Api {
            status: status.as_u16(),
            body: text,
        });
    }

    let data: Value = serde_json::from_str(&text)
        .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    parse_response(&data)
}

/// Extract text, finish reason and usage from a `generateContent` response body
pub fn parse_response(data: &Value) -> Result<GenerationResponse, LlmError> {
    if !data.is_object() {
        return Err(LlmError::MalformedResponse(
            "response body is not an object".to_string(),
        ));
    }

    let candidate = match data["candidates"].as_array().and_then(|c| c.first()) {
        Some(candidate) => candidate,
        None => {
            if let Some(reason) = data["promptFeedback"]["blockReason"].as_str() {
                return Err(LlmError::Blocked(reason.to_string()));
            }
            // No candidates and no block reason: treat as an empty answer
            return Ok(GenerationResponse {
                usage: parse_usage(&data["usageMetadata"]),
                ..Default::default()
            });
        }
    };

    let content = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    Ok(GenerationResponse {
        content,
        finish_reason: FinishReason::parse(candidate["finishReason"].as_str()),
        usage: parse_usage(&data["usageMetadata"]),
    })
}

fn parse_usage(usage: &Value) -> Usage {
    let count = |field: &str| {
        usage[field]
            .as_u64()
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
    };

    Usage {
        prompt_tokens: count("promptTokenCount"),
        completion_tokens: count("candidatesTokenCount"),
        total_tokens: count("totalTokenCount"),
    }
}
