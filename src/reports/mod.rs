pub mod formatters;
pub mod generator;

pub use formatters::{JsonFormatter, MarkdownFormatter, ReportFormatter, TextFormatter};
pub use generator::{ExportArtifact, ReportGenerator, EXPORT_CONTENT_TYPE};
