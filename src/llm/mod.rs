pub mod providers;
pub mod prompts;
pub mod interfaces;

#[cfg(test)]
pub(crate) mod testing;

pub use providers::{GeminiProvider, LLMConfig};
pub use prompts::{AgentPrompts, PromptTemplate, RolePrompt};
pub use interfaces::{
    ChatConfig, ChatSession, ContentPart, GenerationRequest, GenerationResponse,
    GenerationService, LlmError, Model, Tool,
};
