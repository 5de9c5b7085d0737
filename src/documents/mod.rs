pub mod loader;

pub use loader::{Document, DocumentError, DocumentLoader, ACCEPTED_MIME_TYPE, UNSUPPORTED_TYPE_NOTICE};
