use crate::agents::communication::{AgentCommunication, AgentCommunicationBus};
use crate::llm::prompts::{
    CHAT_EMPTY_FALLBACK, CHAT_FAILURE_MESSAGE, CHAT_WELCOME_MESSAGE, CONTEXT_LOADED_ANNOUNCEMENT,
};
use crate::llm::{AgentPrompts, ChatConfig, ChatSession, GenerationService, Model, Tool};
use crate::types::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Another message is still being answered")]
    SendInFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimeOutcome {
    Primed,
    /// The session already holds a report; nothing was sent
    AlreadyPrimed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: Model,
    pub search_enabled: bool,
    pub temperature: Option<f32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: Model::Gemini25Flash,
            search_enabled: true,
            temperature: None,
        }
    }
}

struct SessionState {
    chat: Box<dyn ChatSession>,
    primed_report: Option<Uuid>,
}

/// Examiner chat that can be seeded once with a synthesized report.
///
/// Sends and priming share one mutex, so at most one message is outstanding.
/// A user send arriving while another is outstanding is rejected; priming waits.
pub struct SessionBridge {
    state: Mutex<SessionState>,
    transcript: RwLock<Vec<TranscriptEntry>>,
    /// Mirrors `SessionState::primed_report.is_some()`, readable while a send holds the state lock
    primed: AtomicBool,
    communication_bus: Arc<AgentCommunicationBus>,
    agent_name: String,
}

impl SessionBridge {
    /// Open the chat; call once per chat surface
    pub fn open(
        service: &dyn GenerationService,
        communication_bus: Arc<AgentCommunicationBus>,
        config: SessionConfig,
    ) -> Self {
        let template = AgentPrompts::examiner_chat();
        let mut tools = Vec::new();
        if config.search_enabled {
            tools.push(Tool::GoogleSearch);
        }

        let chat = service.start_chat(ChatConfig {
            model: config.model.clone(),
            system_instruction: template.system_prompt,
            tools,
            temperature: config.temperature,
        });
        info!("Opened examiner chat on {}", config.model);

        Self {
            state: Mutex::new(SessionState {
                chat,
                primed_report: None,
            }),
            transcript: RwLock::new(vec![TranscriptEntry::new(
                TranscriptRole::Model,
                CHAT_WELCOME_MESSAGE,
            )]),
            primed: AtomicBool::new(false),
            communication_bus,
            agent_name: "session_bridge".to_string(),
        }
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.read().await.clone()
    }

    /// Whether a report has been loaded into the chat context
    pub fn is_primed(&self) -> bool {
        self.primed.load(Ordering::SeqCst)
    }

    /// Whether a send or priming is outstanding
    pub fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// Load `report` into the chat history. Only the first successful call has any effect.
    #[instrument(skip(self, report), fields(report_id = %report.id))]
    pub async fn prime_with_context(&self, report: &SynthesizedReport) -> PrimeOutcome {
        let mut state = self.state.lock().await;

        if let Some(primed_id) = state.primed_report {
            if primed_id != report.id {
                warn!("Session already primed with report {}; ignoring newer report", primed_id);
            }
            return PrimeOutcome::AlreadyPrimed;
        }

        let message = AgentPrompts::examiner_chat().render(&[("report", report.text.as_str())]);
        let result = state.chat.send_message(&message).await;
        match result {
            Ok(_) => {
                state.primed_report = Some(report.id);
                self.primed.store(true, Ordering::SeqCst);
                drop(state);

                self.append(TranscriptEntry::new(
                    TranscriptRole::System,
                    CONTEXT_LOADED_ANNOUNCEMENT,
                ))
                .await;
                info!("Report context loaded into chat");

                self.publish_event(
                    &self.communication_bus,
                    ReviewEventKind::SessionPrimed,
                    serde_json::json!({ "report_id": report.id }),
                )
                .await;
                PrimeOutcome::Primed
            }
            Err(e) => {
                drop(state);
                error!("Failed to inject report context: {}", e);

                self.publish_event(
                    &self.communication_bus,
                    ReviewEventKind::SessionPrimeFailed,
                    serde_json::json!({ "report_id": report.id, "error": e.to_string() }),
                )
                .await;
                PrimeOutcome::Failed(e.to_string())
            }
        }
    }

    /// Send one user message and return the model entry appended for it
    #[instrument(skip(self, user_text))]
    pub async fn send(&self, user_text: &str) -> Result<TranscriptEntry, SessionError> {
        if user_text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let mut state = self
            .state
            .try_lock()
            .map_err(|_| SessionError::SendInFlight)?;

        self.append(TranscriptEntry::new(TranscriptRole::User, user_text))
            .await;

        let result = state.chat.send_message(user_text).await;
        let reply = match result {
            Ok(response) if response.content.trim().is_empty() => CHAT_EMPTY_FALLBACK.to_string(),
            Ok(response) => response.content,
            Err(e) => {
                error!("Chat send failed: {}", e);
                CHAT_FAILURE_MESSAGE.to_string()
            }
        };
        drop(state);

        let entry = TranscriptEntry::new(TranscriptRole::Model, reply);
        self.append(entry.clone()).await;
        Ok(entry)
    }

    async fn append(&self, entry: TranscriptEntry) {
        self.transcript.write().await.push(entry);
    }
}

impl AgentCommunication for SessionBridge {
    fn agent_name(&self) -> &str {
        &self.agent_name
    }
}
