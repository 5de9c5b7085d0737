use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The only media type accepted for analysis
pub const ACCEPTED_MIME_TYPE: &str = "application/pdf";

/// Notice shown when the selected file is not a PDF
pub const UNSUPPORTED_TYPE_NOTICE: &str = "Mohon unggah file PDF.";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Mohon unggah file PDF.")]
    UnsupportedType { file_name: String, mime_type: String },

    #[error("Dokumen {0} kosong.")]
    Empty(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A proposal document ready to be attached to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub file_name: String,
    pub mime_type: String,
    /// Standard base64 of the file bytes
    pub data_base64: String,
    pub size_bytes: usize,
}

/// Reads proposal files and encodes them for transmission
pub struct DocumentLoader;

impl DocumentLoader {
    /// Load a file from disk, rejecting anything that is not a PDF
    pub async fn load(path: &Path) -> Result<Document, DocumentError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let mime_type = Self::declared_mime_type(path);

        // Type check happens before any read, same as a file picker filter
        Self::validate_type(&file_name, &mime_type)?;

        let bytes = tokio::fs::read(path).await.map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_bytes(file_name, &mime_type, &bytes)
    }

    /// Build a document from bytes already in memory
    pub fn from_bytes(
        file_name: impl Into<String>,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<Document, DocumentError> {
        let file_name = file_name.into();
        Self::validate_type(&file_name, mime_type)?;

        if bytes.is_empty() {
            return Err(DocumentError::Empty(file_name));
        }

        debug!("Encoding {} ({} bytes)", file_name, bytes.len());
        let document = Document {
            data_base64: BASE64.encode(bytes),
            size_bytes: bytes.len(),
            mime_type: mime_type.to_string(),
            file_name,
        };

        info!(
            "Loaded document {} ({} bytes, {})",
            document.file_name, document.size_bytes, document.mime_type
        );
        Ok(document)
    }

    /// Media type implied by the file extension
    pub fn declared_mime_type(path: &Path) -> String {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    fn validate_type(file_name: &str, mime_type: &str) -> Result<(), DocumentError> {
        if mime_type != ACCEPTED_MIME_TYPE {
            warn!("Rejected {}: unsupported type {}", file_name, mime_type);
            return Err(DocumentError::UnsupportedType {
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
            });
        }
        Ok(())
    }
}
