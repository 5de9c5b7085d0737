use super::formatters::{JsonFormatter, MarkdownFormatter, ReportFormatter, TextFormatter};
use crate::types::ReviewOutcome;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXPORT_CONTENT_TYPE: &str = "text/markdown";
const EXPORT_PREFIX: &str = "Laporan_Kritik_";
const EXPORT_FALLBACK_NAME: &str = "Proposal";

/// A downloadable copy of the final report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub file_name: String,
    pub content_type: String,
    pub content: String,
}

impl ExportArtifact {
    /// Write the artifact into `directory`, returning the full path
    pub async fn write_to(&self, directory: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(directory)
            .await
            .with_context(|| format!("Failed to create export directory {}", directory.display()))?;

        let path = directory.join(&self.file_name);
        tokio::fs::write(&path, &self.content)
            .await
            .with_context(|| format!("Failed to write export {}", path.display()))?;

        info!("Exported report to {}", path.display());
        Ok(path)
    }
}

/// Report generator for creating various output formats
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate report in the specified format
    pub fn generate(&self, outcome: &ReviewOutcome, format: &str) -> Result<String> {
        let formatter: &dyn ReportFormatter = match format.to_lowercase().as_str() {
            "json" => &JsonFormatter,
            "markdown" | "md" => &MarkdownFormatter,
            "text" => &TextFormatter,
            _ => return Err(anyhow::anyhow!("Unsupported format: {}", format)),
        };
        formatter.format(outcome)
    }

    /// Export the raw report text as markdown, named after the source document
    pub fn export_artifact(&self, report_text: &str, document_name: Option<&str>) -> ExportArtifact {
        // Final path component only
        let base_name = document_name
            .and_then(|name| Path::new(name).file_name())
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(EXPORT_FALLBACK_NAME);

        ExportArtifact {
            file_name: format!("{}{}.md", EXPORT_PREFIX, base_name),
            content_type: EXPORT_CONTENT_TYPE.to_string(),
            content: report_text.to_string(),
        }
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}
