//! Boundary to the document-metadata collaborator.
//!
//! Implementations of [`MetadataExtractor`] hand back whatever they could
//! read, or an empty [`FileMetadata`] when the blob is not parseable; they
//! never fail the surrounding file creation. The `pdf` feature adds an
//! extractor backed by `lopdf`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{FileContent, FileMetadata};

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, content: &FileContent) -> FileMetadata;
}

/// Extractor that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

#[async_trait]
impl MetadataExtractor for NoMetadata {
    async fn extract(&self, _content: &FileContent) -> FileMetadata {
        FileMetadata::default()
    }
}

/// Reads the page count and document-information dictionary with `lopdf`.
/// Parsing runs on the blocking pool; unreadable input yields empty metadata.
#[cfg(feature = "pdf")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfExtractor;

#[cfg(feature = "pdf")]
#[async_trait]
impl MetadataExtractor for LopdfExtractor {
    async fn extract(&self, content: &FileContent) -> FileMetadata {
        let bytes = content.as_bytes().to_vec();
        match tokio::task::spawn_blocking(move || read_pdf_metadata(&bytes)).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "pdf metadata extraction failed");
                FileMetadata::default()
            }
            Err(err) => {
                tracing::warn!(error = %err, "pdf metadata task did not complete");
                FileMetadata::default()
            }
        }
    }
}

#[cfg(feature = "pdf")]
fn read_pdf_metadata(bytes: &[u8]) -> Result<FileMetadata, lopdf::Error> {
    const KEYS: [&str; 8] = [
        "Author",
        "Title",
        "Subject",
        "Keywords",
        "Creator",
        "Producer",
        "CreationDate",
        "ModDate",
    ];

    let doc = lopdf::Document::load_mem(bytes)?;
    let page_count = u32::try_from(doc.get_pages().len()).ok();

    let mut info = BTreeMap::new();
    let dictionary = doc.trailer.get(b"Info").ok().and_then(|object| {
        match object.as_reference() {
            Ok(id) => doc.get_dictionary(id).ok(),
            Err(_) => object.as_dict().ok(),
        }
    });
    if let Some(dictionary) = dictionary {
        for key in KEYS {
            if let Ok(value) = dictionary.get(key.as_bytes()).and_then(|value| value.as_string()) {
                info.insert(key.to_string(), value.to_string());
            }
        }
    }

    Ok(metadata_from_pdf_info(page_count, &info))
}

/// Builds [`FileMetadata`] from a PDF document-information dictionary as
/// produced by a PDF reader (`Author`, `Title`, `CreationDate`, ...).
/// Empty strings count as absent.
pub fn metadata_from_pdf_info(
    page_count: Option<u32>,
    info: &BTreeMap<String, String>,
) -> FileMetadata {
    let field = |key: &str| {
        info.get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    FileMetadata {
        page_count,
        author: field("Author"),
        title: field("Title"),
        subject: field("Subject"),
        keywords: field("Keywords"),
        creator: field("Creator"),
        producer: field("Producer"),
        creation_date: info.get("CreationDate").and_then(|raw| parse_pdf_date(raw)),
        modification_date: info.get("ModDate").and_then(|raw| parse_pdf_date(raw)),
    }
}

/// Parses the `D:YYYYMMDDHHmmSS` prefix of a PDF date string. Any timezone
/// suffix is ignored and the value is taken as UTC.
pub fn parse_pdf_date(raw: &str) -> Option<DateTime<Utc>> {
    let start = raw.find("D:")? + 2;
    let digits = raw.get(start..start + 14)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let number = |range: std::ops::Range<usize>| digits[range].parse::<u32>().ok();
    let year = number(0..4)? as i32;
    let date = NaiveDate::from_ymd_opt(year, number(4..6)?, number(6..8)?)?;
    let datetime = date.and_hms_opt(number(8..10)?, number(10..12)?, number(12..14)?)?;
    Some(datetime.and_utc())
}
