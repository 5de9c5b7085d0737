use crate::types::{AgentStatus, ReviewOutcome};
use anyhow::Result;

const REPORT_TITLE: &str = "Laporan Kritik Proposal Disertasi";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Trait for report formatters
pub trait ReportFormatter {
    fn format(&self, outcome: &ReviewOutcome) -> Result<String>;
}

fn status_marker(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Completed => "✅",
        AgentStatus::Failed => "❌",
        AgentStatus::Running => "⏳",
        AgentStatus::Idle => "⏸",
    }
}

/// Markdown formatter
pub struct MarkdownFormatter;

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, outcome: &ReviewOutcome) -> Result<String> {
        let agent_lines = outcome
            .tasks
            .iter()
            .map(|task| {
                format!(
                    "- {} **{}**: {}",
                    status_marker(task.status),
                    task.name,
                    task.status.label()
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(format!(
            r#"# {}

**Dokumen**: {}
**Agen gagal**: {} dari {}

## Status Agen
{}

{}

---
*Dihasilkan pada: {}*
"#,
            REPORT_TITLE,
            outcome.document_name,
            outcome.failed_agents(),
            outcome.tasks.len(),
            agent_lines,
            outcome.report.text.trim_end(),
            outcome.report.generated_at.format(TIMESTAMP_FORMAT)
        ))
    }
}

/// JSON formatter
pub struct JsonFormatter;

impl ReportFormatter for JsonFormatter {
    fn format(&self, outcome: &ReviewOutcome) -> Result<String> {
        Ok(serde_json::to_string_pretty(outcome)?)
    }
}

/// Plain text formatter
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, outcome: &ReviewOutcome) -> Result<String> {
        let agent_lines = outcome
            .tasks
            .iter()
            .map(|task| format!("- {}: {}", task.name, task.status.label()))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(format!(
            r#"{}
{}

Dokumen: {}
Agen gagal: {} dari {}

Status Agen:
{}

{}

Dihasilkan pada: {}
"#,
            REPORT_TITLE,
            "=".repeat(REPORT_TITLE.len()),
            outcome.document_name,
            outcome.failed_agents(),
            outcome.tasks.len(),
            agent_lines,
            outcome.report.text.trim_end(),
            outcome.report.generated_at.format(TIMESTAMP_FORMAT)
        ))
    }
}
