//! Upload validation applied before a document is submitted.
//!
//! The ingestion endpoint accepts a fixed set of document formats. The
//! checks here run client-side so an obviously bad upload never reaches
//! the server; the gateway does not retry on their failure.

use std::path::Path;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CONTENT_TYPE_PDF: &str = "application/pdf";
pub const CONTENT_TYPE_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const CONTENT_TYPE_MARKDOWN: &str = "text/markdown";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Content types the ingestion pipeline has a parser for.
pub const SUPPORTED_CONTENT_TYPES: &[&str] = &[
    CONTENT_TYPE_PDF,
    CONTENT_TYPE_DOCX,
    CONTENT_TYPE_MARKDOWN,
    CONTENT_TYPE_TEXT,
];

/// Default upper bound on an upload body (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum length of an uploaded file name.
const MAX_FILE_NAME_LEN: usize = 255;

// ---------------------------------------------------------------------------
// UploadRequest
// ---------------------------------------------------------------------------

/// A document ready to be sent to the submission endpoint.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadRequest {
    /// Build an upload, inferring the content type from the file
    /// extension when none is given.
    pub fn new(
        file_name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, CoreError> {
        let file_name = file_name.into();
        let content_type = match content_type {
            Some(ct) => ct,
            None => content_type_for_name(&file_name)
                .ok_or_else(|| {
                    CoreError::UnsupportedContentType(format!(
                        "cannot infer content type of '{file_name}'"
                    ))
                })?
                .to_string(),
        };
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Check the upload against the endpoint's constraints.
    ///
    /// Rules:
    /// - File name must not be blank and must not exceed 255 characters.
    /// - Body must not be empty and must not exceed `max_bytes`.
    /// - Content type must be one of [`SUPPORTED_CONTENT_TYPES`].
    pub fn validate(&self, max_bytes: u64) -> Result<(), CoreError> {
        if self.file_name.trim().is_empty() {
            return Err(CoreError::Validation("file name must not be empty".into()));
        }
        if self.file_name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "file name exceeds {MAX_FILE_NAME_LEN} characters"
            )));
        }
        if self.bytes.is_empty() {
            return Err(CoreError::Validation(format!(
                "'{}' is empty",
                self.file_name
            )));
        }
        if self.size() > max_bytes {
            return Err(CoreError::Validation(format!(
                "'{}' is {} bytes, limit is {max_bytes}",
                self.file_name,
                self.size()
            )));
        }
        if !is_supported_content_type(&self.content_type) {
            return Err(CoreError::UnsupportedContentType(self.content_type.clone()));
        }
        Ok(())
    }
}

/// Whether the ingestion pipeline can parse `content_type`.
///
/// Parameters such as `; charset=utf-8` are ignored.
pub fn is_supported_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    SUPPORTED_CONTENT_TYPES.contains(&essence.as_str())
}

/// Infer a supported content type from a file name's extension.
pub fn content_type_for_name(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(CONTENT_TYPE_PDF),
        "docx" => Some(CONTENT_TYPE_DOCX),
        "md" | "markdown" => Some(CONTENT_TYPE_MARKDOWN),
        "txt" => Some(CONTENT_TYPE_TEXT),
        _ => None,
    }
}
