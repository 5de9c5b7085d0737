use crate::agents::communication::{AgentCommunication, AgentCommunicationBus};
use crate::documents::Document;
use crate::llm::{
    AgentPrompts, ContentPart, GenerationRequest, GenerationService, LlmError, Model, Tool,
};
use crate::types::*;
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RunError {
    #[error("An analysis run is already in progress")]
    AlreadyRunning,

    #[error("No proposal document has been selected")]
    NoDocument,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub model: Model,
    pub temperature: f32,
    /// Per-agent deadline; agents wait indefinitely when unset
    pub agent_timeout_seconds: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            model: Model::Gemini3ProPreview,
            temperature: 0.2,
            agent_timeout_seconds: None,
        }
    }
}

/// The tasks of one run once every agent has settled
#[derive(Debug, Clone)]
pub struct SettledRun {
    pub run_id: Uuid,
    pub tasks: Vec<AgentTask>,
}

/// Sends one analysis request per reviewer role and tracks each task's lifecycle
pub struct AgentRunner {
    service: Arc<dyn GenerationService>,
    communication_bus: Arc<AgentCommunicationBus>,
    config: RunnerConfig,
    run: Arc<RwLock<AnalysisRun>>,
    agent_name: String,
}

impl AgentRunner {
    pub fn new(
        service: Arc<dyn GenerationService>,
        communication_bus: Arc<AgentCommunicationBus>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            service,
            communication_bus,
            config,
            run: Arc::new(RwLock::new(AnalysisRun::default())),
            agent_name: "agent_runner".to_string(),
        }
    }

    /// Current state of the run, including tasks still in flight
    pub async fn snapshot(&self) -> AnalysisRun {
        self.run.read().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.run.read().await.is_running()
    }

    /// Run all four agents against `document` and wait until every one settles.
    ///
    /// Per-task transitions are visible through [`snapshot`](Self::snapshot) and the
    /// event bus as they happen. Agent failures are recorded on the task, never
    /// returned; the only errors are precondition violations.
    #[instrument(skip(self, document), fields(document = %document.file_name))]
    pub async fn start_run(&self, document: &Document) -> Result<SettledRun, RunError> {
        let run_id = self.begin_run(document).await?;
        info!("Starting analysis run {} with {} agents", run_id, ReviewerRole::ALL.len());

        self.publish_event(
            &self.communication_bus,
            ReviewEventKind::RunStarted,
            serde_json::json!({
                "run_id": run_id,
                "document": document.file_name,
            }),
        )
        .await;

        // Settle-all: a failed agent never cancels its siblings
        join_all(
            ReviewerRole::ALL
                .iter()
                .map(|role| self.run_agent(run_id, *role, document)),
        )
        .await;

        let tasks = {
            let run = self.run.read().await;
            if run.id != run_id {
                warn!("Run {} was replaced before it settled", run_id);
            }
            run.tasks.clone()
        };
        let failed = tasks
            .iter()
            .filter(|task| task.status == AgentStatus::Failed)
            .count();
        info!("Analysis run {} settled: {} of {} agents failed", run_id, failed, tasks.len());

        self.publish_event(
            &self.communication_bus,
            ReviewEventKind::RunSettled,
            serde_json::json!({
                "run_id": run_id,
                "failed": failed,
            }),
        )
        .await;

        Ok(SettledRun { run_id, tasks })
    }

    /// Move every task to `Running` under a single lock
    async fn begin_run(&self, document: &Document) -> Result<Uuid, RunError> {
        let mut run = self.run.write().await;
        if run.is_running() {
            return Err(RunError::AlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        run.id = run_id;
        run.document_name = Some(document.file_name.clone());
        for task in run.tasks.iter_mut() {
            task.begin();
        }
        Ok(run_id)
    }

    async fn run_agent(&self, run_id: Uuid, role: ReviewerRole, document: &Document) {
        let result = self.request_analysis(role, document).await;

        let (kind, data) = {
            let mut run = self.run.write().await;
            if run.id != run_id {
                warn!("Dropping result of {} for stale run {}", role, run_id);
                return;
            }

            let task = run.task_mut(role);
            match result {
                Ok(text) => {
                    task.complete(&text);
                    info!("{} completed ({} chars)", task.name, task.output.len());
                    (
                        ReviewEventKind::AgentCompleted,
                        serde_json::json!({ "run_id": run_id, "role": role }),
                    )
                }
                Err(e) => {
                    warn!("{} failed: {}", task.name, e);
                    task.fail();
                    (
                        ReviewEventKind::AgentFailed,
                        serde_json::json!({ "run_id": run_id, "role": role, "error": e.to_string() }),
                    )
                }
            }
        };

        self.publish_event(&self.communication_bus, kind, data).await;
    }

    async fn request_analysis(
        &self,
        role: ReviewerRole,
        document: &Document,
    ) -> Result<String, LlmError> {
        let request = self.build_request(role, document);

        let response = match self.config.agent_timeout_seconds {
            Some(seconds) => timeout(Duration::from_secs(seconds), self.service.generate(request))
                .await
                .map_err(|_| LlmError::Timeout(seconds))??,
            None => self.service.generate(request).await?,
        };

        Ok(response.content)
    }

    /// Request carrying the document, the role prompt and, when the role needs it, search
    pub fn build_request(&self, role: ReviewerRole, document: &Document) -> GenerationRequest {
        let role_prompt = AgentPrompts::for_role(role);
        let template = AgentPrompts::agent_analysis(role);

        let mut request = GenerationRequest::new(self.config.model.clone())
            .with_part(ContentPart::InlineData {
                mime_type: document.mime_type.clone(),
                data: document.data_base64.clone(),
            })
            .with_text(template.render(&[("agent_name", role_prompt.display_name)]))
            .with_system_instruction(role_prompt.system_prompt)
            .with_temperature(self.config.temperature);

        if role_prompt.use_search {
            request = request.with_tool(Tool::GoogleSearch);
        }

        request
    }
}

impl AgentCommunication for AgentRunner {
    fn agent_name(&self) -> &str {
        &self.agent_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{DocumentLoader, ACCEPTED_MIME_TYPE};
    use crate::llm::testing::StubService;
    use std::collections::HashMap;

    fn document() -> Document {
        DocumentLoader::from_bytes("proposal.pdf", ACCEPTED_MIME_TYPE, b"%PDF-1.4").unwrap()
    }

    fn runner_with(service: Arc<StubService>) -> (Arc<AgentRunner>, Arc<AgentCommunicationBus>) {
        let bus = Arc::new(AgentCommunicationBus::new());
        let runner = Arc::new(AgentRunner::new(service, bus.clone(), RunnerConfig::default()));
        (runner, bus)
    }

    async fn next_event(
        receiver: &mut tokio::sync::broadcast::Receiver<ReviewEvent>,
        kind: ReviewEventKind,
    ) -> ReviewEvent {
        loop {
            let event = receiver.recv().await.unwrap();
            if event.kind == kind {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_all_agents_complete_in_role_order() {
        let outputs = ReviewerRole::ALL
            .iter()
            .map(|role| (*role, Ok(format!("critique by {}", role))))
            .collect();
        let service = Arc::new(StubService::with_role_outputs(outputs));
        let (runner, _bus) = runner_with(service.clone());

        let tasks = runner.start_run(&document()).await.unwrap().tasks;

        assert_eq!(tasks.len(), 4);
        for (task, role) in tasks.iter().zip(ReviewerRole::ALL) {
            assert_eq!(task.role, role);
            assert_eq!(task.status, AgentStatus::Completed);
            assert_eq!(task.output, format!("critique by {}", role));
            assert!(task.error.is_none());
        }
        assert_eq!(service.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_requests_carry_document_prompt_and_search_flag() {
        let service = Arc::new(StubService::with_role_outputs(HashMap::new()));
        let (runner, _bus) = runner_with(service.clone());

        let settled = runner.start_run(&document()).await.unwrap();
        assert_eq!(settled.run_id, runner.snapshot().await.id);

        let requests = service.requests();
        for role in ReviewerRole::ALL {
            let request = requests
                .iter()
                .find(|r| crate::llm::testing::role_of(r) == Some(role))
                .unwrap();

            assert!(matches!(
                &request.parts[0],
                ContentPart::InlineData { mime_type, .. } if mime_type == ACCEPTED_MIME_TYPE
            ));
            assert!(request.text().contains(role.display_name()));
            assert_eq!(request.temperature, Some(0.2));
            assert_eq!(
                request.tools.contains(&Tool::GoogleSearch),
                AgentPrompts::for_role(role).use_search
            );
        }
    }

    #[tokio::test]
    async fn test_tasks_run_before_any_completion_and_complete_independently() {
        let service = StubService::with_role_outputs(HashMap::new());
        let (service, originality) = service.gate(ReviewerRole::Originality);
        let (service, literature) = service.gate(ReviewerRole::Literature);
        let (service, methodology) = service.gate(ReviewerRole::Methodology);
        let (service, feasibility) = service.gate(ReviewerRole::Feasibility);
        let service = Arc::new(service);
        let (runner, bus) = runner_with(service.clone());
        let mut events = bus.subscribe();

        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.start_run(&document()).await })
        };

        service.wait_for_requests(4).await;
        let run = runner.snapshot().await;
        assert!(run
            .tasks
            .iter()
            .all(|task| task.status == AgentStatus::Running));

        methodology.add_permits(1);
        let event = next_event(&mut events, ReviewEventKind::AgentCompleted).await;
        assert_eq!(event.data["role"], "Methodology");

        let run = runner.snapshot().await;
        assert_eq!(run.task(ReviewerRole::Methodology).status, AgentStatus::Completed);
        assert_eq!(run.task(ReviewerRole::Originality).status, AgentStatus::Running);
        assert_eq!(run.task(ReviewerRole::Literature).status, AgentStatus::Running);
        assert_eq!(run.task(ReviewerRole::Feasibility).status, AgentStatus::Running);

        originality.add_permits(1);
        literature.add_permits(1);
        feasibility.add_permits(1);

        let tasks = handle.await.unwrap().unwrap().tasks;
        assert!(tasks.iter().all(|task| task.status == AgentStatus::Completed));
    }

    #[tokio::test]
    async fn test_failed_agent_does_not_affect_siblings() {
        let mut outputs = HashMap::new();
        outputs.insert(ReviewerRole::Literature, Err("quota exceeded".to_string()));
        let service = Arc::new(StubService::with_role_outputs(outputs));
        let (runner, bus) = runner_with(service);

        let tasks = runner.start_run(&document()).await.unwrap().tasks;

        let literature = &tasks[ReviewerRole::Literature.position()];
        assert_eq!(literature.status, AgentStatus::Failed);
        assert_eq!(literature.output, AGENT_FAILURE_PLACEHOLDER);
        assert_eq!(literature.error.as_deref(), Some(AGENT_FAILURE_MARKER));

        for task in tasks.iter().filter(|t| t.role != ReviewerRole::Literature) {
            assert_eq!(task.status, AgentStatus::Completed);
        }

        let failures = bus
            .get_event_history(None, Some(ReviewEventKind::AgentFailed), None)
            .await;
        assert_eq!(failures.len(), 1);
    }

    #[tokio::test]
    async fn test_all_agents_failing_still_settles() {
        let outputs = ReviewerRole::ALL
            .iter()
            .map(|role| (*role, Err("network down".to_string())))
            .collect();
        let service = Arc::new(StubService::with_role_outputs(outputs));
        let (runner, _bus) = runner_with(service);

        let tasks = runner.start_run(&document()).await.unwrap().tasks;

        assert!(tasks.iter().all(|task| task.status == AgentStatus::Failed));
        assert!(runner.snapshot().await.is_settled());
        assert!(!runner.is_running().await);
    }

    #[tokio::test]
    async fn test_second_run_rejected_while_running() {
        let service = StubService::with_role_outputs(HashMap::new());
        let (service, gate) = service.gate(ReviewerRole::Feasibility);
        let service = Arc::new(service);
        let (runner, _bus) = runner_with(service.clone());

        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.start_run(&document()).await })
        };
        service.wait_for_requests(4).await;

        assert_eq!(
            runner.start_run(&document()).await.unwrap_err(),
            RunError::AlreadyRunning
        );

        gate.add_permits(1);
        handle.await.unwrap().unwrap();

        // Settled runs may be restarted
        gate.add_permits(1);
        assert!(runner.start_run(&document()).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_answer_uses_fallback() {
        let mut outputs = HashMap::new();
        outputs.insert(ReviewerRole::Originality, Ok(String::new()));
        let service = Arc::new(StubService::with_role_outputs(outputs));
        let (runner, _bus) = runner_with(service);

        let tasks = runner.start_run(&document()).await.unwrap().tasks;
        assert_eq!(tasks[0].status, AgentStatus::Completed);
        assert_eq!(tasks[0].output, AGENT_EMPTY_FALLBACK);
    }

    #[tokio::test]
    async fn test_agent_timeout_marks_only_that_task_failed() {
        let service = StubService::with_role_outputs(HashMap::new());
        let (service, _never_released) = service.gate(ReviewerRole::Originality);
        let bus = Arc::new(AgentCommunicationBus::new());
        let runner = AgentRunner::new(
            Arc::new(service),
            bus,
            RunnerConfig {
                agent_timeout_seconds: Some(0),
                ..RunnerConfig::default()
            },
        );

        let tasks = runner.start_run(&document()).await.unwrap().tasks;
        assert_eq!(tasks[0].status, AgentStatus::Failed);
        assert!(tasks[1..].iter().all(|task| task.status == AgentStatus::Completed));
    }
}
