pub mod agents;
pub mod config;
pub mod documents;
pub mod llm;
pub mod reports;
pub mod types;
