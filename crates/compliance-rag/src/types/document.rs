//! Document, status and chunk types with provenance for citations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{Error, ErrorKind};

/// Supported content types
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// HTML page
    Html,
    /// Markdown file
    Markdown,
    /// Plain text
    #[default]
    Text,
}

impl ContentType {
    /// Detect content type from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "html" | "htm" => Some(Self::Html),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" | "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Detect content type from an HTTP `Content-Type` header value
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "text/html" | "application/xhtml+xml" => Some(Self::Html),
            "text/markdown" => Some(Self::Markdown),
            "text/plain" => Some(Self::Text),
            _ => None,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "Word Document (.docx)",
            Self::Html => "HTML",
            Self::Markdown => "Markdown",
            Self::Text => "Text",
        }
    }
}

/// Where a document's bytes come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentSource {
    /// Text supplied directly at registration
    Inline { text: String },
    /// Uploaded file on local disk
    File { path: PathBuf },
    /// Remote page or file
    Url { url: String },
}

impl DocumentSource {
    /// Short human-readable label for logs and errors
    pub fn label(&self) -> String {
        match self {
            Self::Inline { .. } => "inline".to_string(),
            Self::File { path } => path.display().to_string(),
            Self::Url { url } => url.clone(),
        }
    }
}

/// Processing status of a document
///
/// `Uploaded → Extracting → Chunking → Embedding → Indexed`, with `Failed`
/// reachable from every non-terminal state. `Indexed` and `Failed` persist
/// until the document is re-processed or deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Uploaded,
    Extracting,
    Chunking,
    Embedding,
    Indexed,
    Failed { kind: ErrorKind, reason: String },
}

impl DocumentStatus {
    /// Failed status describing `error`
    pub fn failed(error: &Error) -> Self {
        Self::Failed {
            kind: error.kind(),
            reason: error.to_string(),
        }
    }

    /// `Indexed` or `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Indexed | Self::Failed { .. })
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Stable lowercase name of the state
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexed => "indexed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A regulatory document known to the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Display title
    pub title: String,
    /// Content type used to pick an extractor
    pub content_type: ContentType,
    /// Upload path, URL or inline text
    pub source: DocumentSource,
    /// Extracted text from the latest extraction (kept in memory only)
    #[serde(skip)]
    pub raw_text: Option<String>,
    /// Processing status
    #[serde(default)]
    pub status: DocumentStatus,
    /// Regulation this document belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulation_id: Option<String>,
    /// Jurisdiction the regulation applies in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction_id: Option<String>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document in `Uploaded` status
    pub fn new(title: impl Into<String>, content_type: ContentType, source: DocumentSource) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content_type,
            source,
            raw_text: None,
            status: DocumentStatus::Uploaded,
            regulation_id: None,
            jurisdiction_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a document whose text is supplied inline
    pub fn inline(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            title,
            ContentType::Text,
            DocumentSource::Inline { text: text.into() },
        )
    }

    pub fn with_regulation(mut self, regulation_id: impl Into<String>) -> Self {
        self.regulation_id = Some(regulation_id.into());
        self
    }

    pub fn with_jurisdiction(mut self, jurisdiction_id: impl Into<String>) -> Self {
        self.jurisdiction_id = Some(jurisdiction_id.into());
        self
    }

    /// Metadata snapshot copied into every index entry
    pub fn entry_metadata(&self) -> EntryMetadata {
        EntryMetadata {
            document_id: self.id,
            title: self.title.clone(),
            content_type: self.content_type,
            regulation_id: self.regulation_id.clone(),
            jurisdiction_id: self.jurisdiction_id.clone(),
        }
    }
}

/// Simple document metadata stored alongside each vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryMetadata {
    pub document_id: Uuid,
    pub title: String,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction_id: Option<String>,
}

/// A chunk of document text
///
/// Offsets are character (not byte) positions in the extracted text, `end`
/// exclusive. Chunk ids are derived from the document id and sequence index,
/// so re-chunking identical text yields identical ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Position within the document, starting at 0
    pub sequence_index: usize,
    /// First character (inclusive)
    pub start_offset: usize,
    /// Last character (exclusive)
    pub end_offset: usize,
    /// Text content
    pub text: String,
    /// Word count
    pub token_count: usize,
}

impl Chunk {
    /// Deterministic chunk id for `(document_id, sequence_index)`
    pub fn id_for(document_id: Uuid, sequence_index: usize) -> Uuid {
        Uuid::new_v5(&document_id, format!("chunk-{}", sequence_index).as_bytes())
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}
