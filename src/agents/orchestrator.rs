use crate::agents::communication::{AgentCommunication, AgentCommunicationBus};
use crate::agents::runner::{AgentRunner, RunError, RunnerConfig, SettledRun};
use crate::agents::synthesizer::{SynthesisError, Synthesizer, SynthesizerConfig};
use crate::documents::{Document, DocumentError, DocumentLoader};
use crate::llm::GenerationService;
use crate::types::*;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReviewError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub runner: RunnerConfig,
    pub synthesizer: SynthesizerConfig,
}

/// Main orchestrator for the proposal review: owns the selected document and the current report
pub struct ReviewOrchestrator {
    service: Arc<dyn GenerationService>,
    runner: AgentRunner,
    synthesizer: Synthesizer,
    communication_bus: Arc<AgentCommunicationBus>,
    selected_document: RwLock<Option<Arc<Document>>>,
    current_report: RwLock<Option<SynthesizedReport>>,
    /// Held from the first agent request until the report is stored
    analysis_guard: Mutex<()>,
    agent_name: String,
}

impl ReviewOrchestrator {
    pub fn new(
        service: Arc<dyn GenerationService>,
        communication_bus: Arc<AgentCommunicationBus>,
        config: OrchestratorConfig,
    ) -> Self {
        let runner = AgentRunner::new(service.clone(), communication_bus.clone(), config.runner);
        let synthesizer =
            Synthesizer::new(service.clone(), communication_bus.clone(), config.synthesizer);

        Self {
            service,
            runner,
            synthesizer,
            communication_bus,
            selected_document: RwLock::new(None),
            current_report: RwLock::new(None),
            analysis_guard: Mutex::new(()),
            agent_name: "orchestrator".to_string(),
        }
    }

    /// Load and select a proposal. A rejected file leaves the previous selection in place.
    pub async fn select_document(&self, path: &Path) -> Result<Arc<Document>, DocumentError> {
        let document = Arc::new(DocumentLoader::load(path).await?);
        self.set_document(document.clone()).await;
        Ok(document)
    }

    pub async fn set_document(&self, document: Arc<Document>) {
        info!("Selected document {}", document.file_name);
        *self.selected_document.write().await = Some(document);
    }

    /// Drop the selected document together with any report built from it
    pub async fn clear_document(&self) {
        *self.selected_document.write().await = None;
        *self.current_report.write().await = None;
        info!("Cleared selected document and report");
    }

    pub async fn selected_document(&self) -> Option<Arc<Document>> {
        self.selected_document.read().await.clone()
    }

    pub async fn can_start_analysis(&self) -> bool {
        self.selected_document.read().await.is_some()
            && self.analysis_guard.try_lock().is_ok()
            && !self.runner.is_running().await
    }

    /// Last report produced by a successful synthesis
    pub async fn current_report(&self) -> Option<SynthesizedReport> {
        self.current_report.read().await.clone()
    }

    pub async fn snapshot(&self) -> AnalysisRun {
        self.runner.snapshot().await
    }

    pub fn communication_bus(&self) -> Arc<AgentCommunicationBus> {
        self.communication_bus.clone()
    }

    /// Run the four agents on the selected document, then synthesize their critiques
    #[instrument(skip(self))]
    pub async fn start_analysis(&self) -> Result<ReviewOutcome, ReviewError> {
        let _analysis = self
            .analysis_guard
            .try_lock()
            .map_err(|_| RunError::AlreadyRunning)?;
        let document = self.selected_document().await.ok_or(RunError::NoDocument)?;
        info!("Starting proposal review for {}", document.file_name);

        // A new run invalidates the previous report
        *self.current_report.write().await = None;
        let SettledRun { run_id, tasks } = self.runner.start_run(&document).await?;
        let report = self.synthesizer.synthesize(run_id, &tasks).await?;

        if !report.succeeded {
            warn!("Synthesis failed for run {}; keeping no current report", run_id);
        } else if self.runner.snapshot().await.id != report.run_id {
            warn!("Discarding report {} of superseded run {}", report.id, run_id);
        } else {
            *self.current_report.write().await = Some(report.clone());
        }

        let outcome = ReviewOutcome {
            run_id,
            document_name: document.file_name.clone(),
            tasks,
            report,
            completed_at: Utc::now(),
        };

        info!(
            "Proposal review finished: {} of {} agents failed",
            outcome.failed_agents(),
            outcome.tasks.len()
        );
        self.publish_event(
            &self.communication_bus,
            ReviewEventKind::ReviewCompleted,
            serde_json::json!({
                "run_id": run_id,
                "report_id": outcome.report.id,
                "succeeded": outcome.report.succeeded,
            }),
        )
        .await;

        Ok(outcome)
    }

    /// Get orchestrator health status
    pub async fn health_check(&self) -> HealthStatus {
        let (remote_healthy, detail) = match self.service.health_check().await {
            Ok(healthy) => (healthy, None),
            Err(e) => (false, Some(e.to_string())),
        };

        HealthStatus {
            healthy: remote_healthy,
            components: vec![ComponentHealth {
                name: "generation_service".to_string(),
                healthy: remote_healthy,
                detail,
            }],
            timestamp: Utc::now(),
        }
    }
}

impl AgentCommunication for ReviewOrchestrator {
    fn agent_name(&self) -> &str {
        &self.agent_name
    }
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: Vec<ComponentHealth>,
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{ACCEPTED_MIME_TYPE, UNSUPPORTED_TYPE_NOTICE};
    use crate::llm::prompts::SYNTHESIS_FAILURE_REPORT;
    use crate::llm::testing::{api_error, role_of, StubService};
    use crate::llm::GenerationResponse;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn orchestrator(service: StubService) -> ReviewOrchestrator {
        ReviewOrchestrator::new(
            Arc::new(service),
            Arc::new(AgentCommunicationBus::new()),
            OrchestratorConfig::default(),
        )
    }

    fn pdf(name: &str) -> Arc<Document> {
        Arc::new(DocumentLoader::from_bytes(name, ACCEPTED_MIME_TYPE, b"%PDF-1.4").unwrap())
    }

    #[tokio::test]
    async fn test_non_pdf_leaves_document_unset() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("proposal.docx");
        fs::write(&path, b"PK").unwrap();

        let orchestrator = orchestrator(StubService::with_role_outputs(HashMap::new()));
        let err = orchestrator.select_document(&path).await.unwrap_err();

        assert_eq!(err.to_string(), UNSUPPORTED_TYPE_NOTICE);
        assert!(orchestrator.selected_document().await.is_none());
        assert!(!orchestrator.can_start_analysis().await);
    }

    #[tokio::test]
    async fn test_rejected_file_keeps_previous_selection() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("proposal.pdf");
        let bad = temp_dir.path().join("notes.txt");
        fs::write(&good, b"%PDF-1.4").unwrap();
        fs::write(&bad, b"notes").unwrap();

        let orchestrator = orchestrator(StubService::with_role_outputs(HashMap::new()));
        orchestrator.select_document(&good).await.unwrap();
        assert!(orchestrator.select_document(&bad).await.is_err());

        let selected = orchestrator.selected_document().await.unwrap();
        assert_eq!(selected.file_name, "proposal.pdf");
        assert!(orchestrator.can_start_analysis().await);
    }

    #[tokio::test]
    async fn test_analysis_without_document_is_rejected() {
        let orchestrator = orchestrator(StubService::with_role_outputs(HashMap::new()));
        assert_eq!(
            orchestrator.start_analysis().await.unwrap_err(),
            ReviewError::Run(RunError::NoDocument)
        );
    }

    #[tokio::test]
    async fn test_full_review_stores_current_report() {
        let outputs = ReviewerRole::ALL
            .iter()
            .map(|role| (*role, Ok(format!("CRITIQUE-{}", role.position()))))
            .collect();
        let orchestrator = orchestrator(StubService::with_role_outputs(outputs));
        orchestrator.set_document(pdf("bab1.pdf")).await;

        let outcome = orchestrator.start_analysis().await.unwrap();

        assert_eq!(outcome.document_name, "bab1.pdf");
        assert_eq!(outcome.failed_agents(), 0);
        // The stub echoes the synthesis prompt, which embeds every critique
        for position in 0..4 {
            assert!(outcome.report.text.contains(&format!("CRITIQUE-{}", position)));
        }
        assert_eq!(outcome.report.run_id, outcome.run_id);

        let current = orchestrator.current_report().await.unwrap();
        assert_eq!(current.id, outcome.report.id);
    }

    #[tokio::test]
    async fn test_all_agents_failing_still_synthesizes() {
        let service = StubService::new(|request| match role_of(request) {
            Some(_) => Err(api_error("network down")),
            None => Ok(GenerationResponse::text("Proposal ditolak.")),
        });
        let orchestrator = orchestrator(service);
        orchestrator.set_document(pdf("proposal.pdf")).await;

        let outcome = orchestrator.start_analysis().await.unwrap();

        assert_eq!(outcome.failed_agents(), 4);
        assert!(outcome
            .tasks
            .iter()
            .all(|task| task.status == AgentStatus::Failed));
        assert_eq!(outcome.report.text, "Proposal ditolak.");
        assert!(orchestrator.current_report().await.is_some());
    }

    #[tokio::test]
    async fn test_failed_synthesis_clears_current_report() {
        let service = StubService::new(|request| match role_of(request) {
            Some(role) => Ok(GenerationResponse::text(format!("output of {}", role))),
            None => Err(api_error("overloaded")),
        });
        let orchestrator = orchestrator(service);
        orchestrator.set_document(pdf("proposal.pdf")).await;

        let outcome = orchestrator.start_analysis().await.unwrap();

        assert_eq!(outcome.report.text, SYNTHESIS_FAILURE_REPORT);
        assert!(!outcome.report.succeeded);
        assert!(orchestrator.current_report().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_document_drops_report() {
        let orchestrator = orchestrator(StubService::with_role_outputs(HashMap::new()));
        orchestrator.set_document(pdf("proposal.pdf")).await;
        orchestrator.start_analysis().await.unwrap();
        assert!(orchestrator.current_report().await.is_some());

        orchestrator.clear_document().await;

        assert!(orchestrator.selected_document().await.is_none());
        assert!(orchestrator.current_report().await.is_none());
        assert!(!orchestrator.can_start_analysis().await);
    }

    #[tokio::test]
    async fn test_cannot_start_while_running() {
        let service = StubService::with_role_outputs(HashMap::new());
        let (service, gate) = service.gate(ReviewerRole::Methodology);
        let service = Arc::new(service);
        let orchestrator = Arc::new(ReviewOrchestrator::new(
            service.clone(),
            Arc::new(AgentCommunicationBus::new()),
            OrchestratorConfig::default(),
        ));
        orchestrator.set_document(pdf("proposal.pdf")).await;

        let handle = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.start_analysis().await })
        };
        service.wait_for_requests(4).await;

        assert!(!orchestrator.can_start_analysis().await);
        assert_eq!(
            orchestrator.start_analysis().await.unwrap_err(),
            ReviewError::Run(RunError::AlreadyRunning)
        );

        gate.add_permits(1);
        handle.await.unwrap().unwrap();
        assert!(orchestrator.can_start_analysis().await);
    }

    #[tokio::test]
    async fn test_cannot_start_while_previous_synthesis_runs() {
        let (service, synthesis) = StubService::with_role_outputs(HashMap::new()).gate_synthesis();
        let service = Arc::new(service);
        let orchestrator = Arc::new(ReviewOrchestrator::new(
            service.clone(),
            Arc::new(AgentCommunicationBus::new()),
            OrchestratorConfig::default(),
        ));
        orchestrator.set_document(pdf("proposal.pdf")).await;

        let handle = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.start_analysis().await })
        };
        // Four agent requests, then the held synthesis request
        service.wait_for_requests(5).await;
        assert!(orchestrator.snapshot().await.is_settled());

        assert!(!orchestrator.can_start_analysis().await);
        assert_eq!(
            orchestrator.start_analysis().await.unwrap_err(),
            ReviewError::Run(RunError::AlreadyRunning)
        );
        assert_eq!(service.requests().len(), 5);

        synthesis.add_permits(1);
        let first = handle.await.unwrap().unwrap();
        let current = orchestrator.current_report().await.unwrap();
        assert_eq!(current.run_id, first.run_id);
        assert!(orchestrator.can_start_analysis().await);
    }

    #[tokio::test]
    async fn test_health_check_reports_remote_status() {
        let orchestrator = orchestrator(StubService::with_role_outputs(HashMap::new()));
        let health = orchestrator.health_check().await;
        assert!(health.healthy);
        assert_eq!(health.components[0].name, "generation_service");
    }
}
