//! Scripted generation service for exercising the orchestration layer.

use super::interfaces::*;
use super::prompts::AgentPrompts;
use crate::types::ReviewerRole;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

type Handler = Box<dyn Fn(&GenerationRequest) -> Result<GenerationResponse, LlmError> + Send + Sync>;

pub(crate) fn api_error(message: &str) -> LlmError {
    LlmError::Api {
        status: 500,
        body: message.to_string(),
    }
}

/// Which reviewer role issued a request, judged by its system instruction
pub(crate) fn role_of(request: &GenerationRequest) -> Option<ReviewerRole> {
    let instruction = request.system_instruction.as_deref()?;
    ReviewerRole::ALL
        .into_iter()
        .find(|role| AgentPrompts::for_role(*role).system_prompt == instruction)
}

pub(crate) struct StubService {
    handler: Handler,
    gates: HashMap<ReviewerRole, Arc<Semaphore>>,
    synthesis_gate: Option<Arc<Semaphore>>,
    arrivals: Arc<Semaphore>,
    requests: Mutex<Vec<GenerationRequest>>,
    chat_replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    chat_gate: Option<Arc<Semaphore>>,
    chat_sent: Arc<Mutex<Vec<String>>>,
    chat_arrivals: Arc<Semaphore>,
}

impl StubService {
    pub fn new(
        handler: impl Fn(&GenerationRequest) -> Result<GenerationResponse, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            gates: HashMap::new(),
            synthesis_gate: None,
            arrivals: Arc::new(Semaphore::new(0)),
            requests: Mutex::new(Vec::new()),
            chat_replies: Arc::new(Mutex::new(VecDeque::new())),
            chat_gate: None,
            chat_sent: Arc::new(Mutex::new(Vec::new())),
            chat_arrivals: Arc::new(Semaphore::new(0)),
        }
    }

    /// Agents answer with a fixed text per role; synthesis echoes its prompt
    pub fn with_role_outputs(outputs: HashMap<ReviewerRole, Result<String, String>>) -> Self {
        Self::new(move |request| match role_of(request) {
            Some(role) => match outputs.get(&role) {
                Some(Ok(text)) => Ok(GenerationResponse::text(text.clone())),
                Some(Err(message)) => Err(api_error(message)),
                None => Ok(GenerationResponse::text(format!("output of {}", role))),
            },
            None => Ok(GenerationResponse::text(request.text())),
        })
    }

    /// Hold requests of `role` until a permit is added to the returned gate
    pub fn gate(mut self, role: ReviewerRole) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.insert(role, gate.clone());
        (self, gate)
    }

    /// Hold requests that carry no reviewer role, which is the synthesis call
    pub fn gate_synthesis(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.synthesis_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn with_chat_replies(self, replies: Vec<Result<String, String>>) -> Self {
        self.chat_replies.lock().unwrap().extend(replies);
        self
    }

    pub fn gate_chat(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.chat_gate = Some(gate.clone());
        (self, gate)
    }

    pub async fn wait_for_requests(&self, count: u32) {
        self.arrivals.acquire_many(count).await.unwrap().forget();
    }

    pub async fn wait_for_chat_messages(&self, count: u32) {
        self.chat_arrivals.acquire_many(count).await.unwrap().forget();
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn chat_messages(&self) -> Vec<String> {
        self.chat_sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for StubService {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.arrivals.add_permits(1);

        let gate = match role_of(&request) {
            Some(role) => self.gates.get(&role),
            None => self.synthesis_gate.as_ref(),
        };
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        (self.handler)(&request)
    }

    fn start_chat(&self, _config: ChatConfig) -> Box<dyn ChatSession> {
        Box::new(StubChat {
            replies: self.chat_replies.clone(),
            gate: self.chat_gate.clone(),
            sent: self.chat_sent.clone(),
            arrivals: self.chat_arrivals.clone(),
            turns: 0,
        })
    }

    async fn health_check(&self) -> Result<bool, LlmError> {
        Ok(true)
    }
}

struct StubChat {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    gate: Option<Arc<Semaphore>>,
    sent: Arc<Mutex<Vec<String>>>,
    arrivals: Arc<Semaphore>,
    turns: usize,
}

#[async_trait]
impl ChatSession for StubChat {
    async fn send_message(&mut self, message: &str) -> Result<GenerationResponse, LlmError> {
        self.sent.lock().unwrap().push(message.to_string());
        self.arrivals.add_permits(1);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()));

        match reply {
            Ok(text) => {
                self.turns += 2;
                Ok(GenerationResponse::text(text))
            }
            Err(message) => Err(api_error(&message)),
        }
    }

    fn history_len(&self) -> usize {
        self.turns
    }
}
