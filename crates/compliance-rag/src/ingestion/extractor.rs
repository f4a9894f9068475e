//! Text extraction from inline text, local files and URLs

use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{ContentType, Document, DocumentSource};

/// Extracts plain text from a document's source
#[derive(Debug, Clone)]
pub struct TextExtractor {
    client: reqwest::Client,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl TextExtractor {
    /// Create an extractor whose URL fetches time out after `fetch_timeout`
    pub fn new(fetch_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Extract the text of `document`; empty output is an error
    pub async fn extract(&self, document: &Document) -> Result<String> {
        let label = document.source.label();
        let text = match &document.source {
            DocumentSource::Inline { text } => text.clone(),
            DocumentSource::File { path } => {
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| Error::extraction(&label, e.to_string()))?;
                let content_type = detect_from_path(path).unwrap_or(document.content_type);
                extract_blocking(label.clone(), content_type, data).await?
            }
            DocumentSource::Url { url } => {
                let (content_type, data) = self.fetch(url, document.content_type).await?;
                extract_blocking(label.clone(), content_type, data).await?
            }
        };

        if text.trim().is_empty() {
            return Err(Error::extraction(label, "no text content could be extracted"));
        }
        Ok(text)
    }

    async fn fetch(&self, url: &str, fallback: ContentType) -> Result<(ContentType, Vec<u8>)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::extraction(url, format!("fetch failed: {}", e)))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentType::from_mime)
            .or_else(|| detect_from_path(Path::new(url)))
            .unwrap_or(fallback);

        let data = response
            .bytes()
            .await
            .map_err(|e| Error::extraction(url, format!("read failed: {}", e)))?;

        tracing::debug!("[{}] fetched {} bytes as {:?}", url, data.len(), content_type);
        Ok((content_type, data.to_vec()))
    }

    /// Extract text from raw bytes of a known content type
    pub fn extract_bytes(label: &str, content_type: ContentType, data: &[u8]) -> Result<String> {
        match content_type {
            ContentType::Pdf => extract_pdf(label, data),
            ContentType::Docx => extract_docx(label, data),
            ContentType::Html => extract_html(label, data),
            ContentType::Markdown | ContentType::Text => Ok(decode_text(data)),
        }
    }
}

/// Parsers are synchronous and may be slow on large files
async fn extract_blocking(label: String, content_type: ContentType, data: Vec<u8>) -> Result<String> {
    let task_label = label.clone();
    tokio::task::spawn_blocking(move || {
        TextExtractor::extract_bytes(&task_label, content_type, &data)
    })
    .await
    .map_err(|e| Error::extraction(label, format!("extraction task failed: {}", e)))?
}

fn detect_from_path(path: &Path) -> Option<ContentType> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(ContentType::from_extension)
}

/// UTF-8, falling back to Latin-1 for legacy files
fn decode_text(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => data.iter().map(|&b| b as char).collect(),
    }
}

fn extract_pdf(label: &str, data: &[u8]) -> Result<String> {
    let raw = match pdf_extract::extract_text_from_mem(data) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            tracing::warn!("[{}] pdf-extract produced no text, trying fallback", label);
            extract_pdf_fallback(label, data)?
        }
        Err(e) => {
            tracing::warn!("[{}] pdf-extract failed: {}, trying fallback", label, e);
            extract_pdf_fallback(label, data)?
        }
    };
    Ok(cleanup_pdf_text(&raw))
}

/// Page-by-page extraction with lopdf
fn extract_pdf_fallback(label: &str, data: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(data)
        .map_err(|e| Error::extraction(label, format!("failed to load PDF: {}", e)))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut text = String::new();
    for page_number in page_numbers {
        match doc.extract_text(&[page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => tracing::debug!("[{}] no text on page {}: {}", label, page_number, e),
        }
    }

    if text.trim().is_empty() {
        return Err(Error::extraction(
            label,
            "PDF appears to be image-based or has no extractable text",
        ));
    }
    Ok(text)
}

fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\0', "")
        .replace('\u{00A0}', " ")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_docx(label: &str, data: &[u8]) -> Result<String> {
    let doc = docx_rs::read_docx(data).map_err(|e| Error::extraction(label, e.to_string()))?;

    let mut content = String::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            content.push_str(&t.text);
                        }
                    }
                }
            }
            content.push('\n');
        }
    }
    Ok(content)
}

fn extract_html(label: &str, data: &[u8]) -> Result<String> {
    let html = decode_text(data);
    let document = scraper::Html::parse_document(&html);
    let body_selector = scraper::Selector::parse("body")
        .map_err(|e| Error::extraction(label, format!("invalid selector: {}", e)))?;

    let mut content = String::new();
    if let Some(body) = document.select(&body_selector).next() {
        for text in body.text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if !content.is_empty() {
                    content.push(' ');
                }
                content.push_str(trimmed);
            }
        }
    }
    Ok(content)
}
