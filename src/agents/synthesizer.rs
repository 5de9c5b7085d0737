use crate::agents::communication::{AgentCommunication, AgentCommunicationBus};
use crate::llm::prompts::{SYNTHESIS_EMPTY_FALLBACK, SYNTHESIS_FAILURE_REPORT};
use crate::llm::{AgentPrompts, GenerationRequest, GenerationService, Model};
use crate::types::*;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Synthesis needs every agent to finish, {0} still pending")]
    RunIncomplete(usize),
}

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    pub model: Model,
    pub temperature: f32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            model: Model::Gemini3ProPreview,
            temperature: 0.2,
        }
    }
}

/// Lead examiner: folds the four agent critiques into one report
pub struct Synthesizer {
    service: Arc<dyn GenerationService>,
    communication_bus: Arc<AgentCommunicationBus>,
    config: SynthesizerConfig,
    agent_name: String,
}

impl Synthesizer {
    pub fn new(
        service: Arc<dyn GenerationService>,
        communication_bus: Arc<AgentCommunicationBus>,
        config: SynthesizerConfig,
    ) -> Self {
        Self {
            service,
            communication_bus,
            config,
            agent_name: "synthesizer".to_string(),
        }
    }

    /// Labeled agent outputs in fixed role order
    pub fn compose_input(tasks: &[AgentTask]) -> String {
        let mut ordered: Vec<&AgentTask> = tasks.iter().collect();
        ordered.sort_by_key(|task| task.role.position());

        ordered
            .iter()
            .map(|task| format!("{}\n{}\n", AgentPrompts::report_label(task.role), task.output))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Build the final report. Remote failures become the fixed failure text.
    #[instrument(skip(self, tasks), fields(run_id = %run_id))]
    pub async fn synthesize(
        &self,
        run_id: Uuid,
        tasks: &[AgentTask],
    ) -> Result<SynthesizedReport, SynthesisError> {
        let pending = tasks.iter().filter(|task| !task.status.is_terminal()).count();
        if pending > 0 {
            return Err(SynthesisError::RunIncomplete(pending));
        }

        info!("Synthesizing report from {} agent outputs", tasks.len());
        self.publish_event(
            &self.communication_bus,
            ReviewEventKind::SynthesisStarted,
            serde_json::json!({ "run_id": run_id }),
        )
        .await;

        let composite_input = Self::compose_input(tasks);
        let prompt = AgentPrompts::synthesis().render(&[("combined_input", composite_input.as_str())]);
        let request = GenerationRequest::new(self.config.model.clone())
            .with_text(prompt)
            .with_temperature(self.config.temperature);

        let (text, succeeded) = match self.service.generate(request).await {
            Ok(response) if response.content.trim().is_empty() => {
                (SYNTHESIS_EMPTY_FALLBACK.to_string(), true)
            }
            Ok(response) => (response.content, true),
            Err(e) => {
                error!("Error synthesizing report: {}", e);
                (SYNTHESIS_FAILURE_REPORT.to_string(), false)
            }
        };

        let report = SynthesizedReport {
            id: Uuid::new_v4(),
            run_id,
            generated_at: Utc::now(),
            composite_input,
            text,
            succeeded,
        };

        let kind = if succeeded {
            ReviewEventKind::SynthesisCompleted
        } else {
            ReviewEventKind::SynthesisFailed
        };
        self.publish_event(
            &self.communication_bus,
            kind,
            serde_json::json!({ "run_id": run_id, "report_id": report.id }),
        )
        .await;

        Ok(report)
    }
}

impl AgentCommunication for Synthesizer {
    fn agent_name(&self) -> &str {
        &self.agent_name
    }
}
