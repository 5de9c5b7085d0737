use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Core types for the dissertation critic system

/// Output recorded for an agent whose request failed.
pub const AGENT_FAILURE_PLACEHOLDER: &str = "Analisis Gagal.";

/// Error marker recorded for an agent whose request failed.
pub const AGENT_FAILURE_MARKER: &str = "Gagal menganalisis";

/// Output recorded when the model answered with no text.
pub const AGENT_EMPTY_FALLBACK: &str = "Analisis tidak dihasilkan.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewerRole {
    Originality,
    Literature,
    Methodology,
    Feasibility,
}

impl ReviewerRole {
    /// Every role, in the fixed order used for display and synthesis.
    pub const ALL: [ReviewerRole; 4] = [
        ReviewerRole::Originality,
        ReviewerRole::Literature,
        ReviewerRole::Methodology,
        ReviewerRole::Feasibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewerRole::Originality => "originality",
            ReviewerRole::Literature => "literature",
            ReviewerRole::Methodology => "methodology",
            ReviewerRole::Feasibility => "feasibility",
        }
    }

    pub fn display_name(&self) -> &'static str {
        crate::llm::AgentPrompts::for_role(*self).display_name
    }

    pub fn position(&self) -> usize {
        match self {
            ReviewerRole::Originality => 0,
            ReviewerRole::Literature => 1,
            ReviewerRole::Methodology => 2,
            ReviewerRole::Feasibility => 3,
        }
    }
}

impl std::fmt::Display for ReviewerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Failed)
    }

    /// Short status label shown next to each agent.
    pub fn label(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "Menunggu",
            AgentStatus::Running => "Sedang Menganalisis...",
            AgentStatus::Completed => "Selesai",
            AgentStatus::Failed => "Gagal",
        }
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus::Idle
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub role: ReviewerRole,
    pub name: String,
    pub status: AgentStatus,
    pub output: String,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    pub fn idle(role: ReviewerRole) -> Self {
        Self {
            role,
            name: role.display_name().to_string(),
            status: AgentStatus::Idle,
            output: String::new(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn begin(&mut self) {
        self.status = AgentStatus::Running;
        self.output.clear();
        self.error = None;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
    }

    pub(crate) fn complete(&mut self, text: &str) {
        self.status = AgentStatus::Completed;
        self.output = if text.trim().is_empty() {
            AGENT_EMPTY_FALLBACK.to_string()
        } else {
            text.to_string()
        };
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self) {
        self.status = AgentStatus::Failed;
        self.output = AGENT_FAILURE_PLACEHOLDER.to_string();
        self.error = Some(AGENT_FAILURE_MARKER.to_string());
        self.finished_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: Uuid,
    pub document_name: Option<String>,
    pub tasks: Vec<AgentTask>,
}

impl Default for AnalysisRun {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            document_name: None,
            tasks: ReviewerRole::ALL.iter().map(|role| AgentTask::idle(*role)).collect(),
        }
    }
}

impl AnalysisRun {
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| task.status == AgentStatus::Running)
    }

    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(|task| task.status.is_terminal())
    }

    pub fn task(&self, role: ReviewerRole) -> &AgentTask {
        &self.tasks[role.position()]
    }

    pub fn task_mut(&mut self, role: ReviewerRole) -> &mut AgentTask {
        &mut self.tasks[role.position()]
    }

    pub fn failed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == AgentStatus::Failed)
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedReport {
    pub id: Uuid,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub composite_input: String,
    pub text: String,
    pub succeeded: bool,
}

/// Everything produced by one critique: the settled agent tasks and the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub run_id: Uuid,
    pub document_name: String,
    pub tasks: Vec<AgentTask>,
    pub report: SynthesizedReport,
    pub completed_at: DateTime<Utc>,
}

impl ReviewOutcome {
    pub fn failed_agents(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == AgentStatus::Failed)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptRole {
    User,
    Model,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub role: TranscriptRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(role: TranscriptRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewEventKind {
    RunStarted,
    AgentCompleted,
    AgentFailed,
    RunSettled,
    SynthesisStarted,
    SynthesisCompleted,
    SynthesisFailed,
    ReviewCompleted,
    SessionPrimed,
    SessionPrimeFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub agent_name: String,
    pub kind: ReviewEventKind,
    pub data: serde_json::Value,
}
