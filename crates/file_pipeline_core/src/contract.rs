use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::file_id;
use crate::notification::UploadedObject;

pub const METADATA_RECORD_SCHEMA_VERSION: &str = "v1";
pub const RESULT_MESSAGE_SCHEMA_VERSION: &str = "v1";
pub const DEFAULT_PAGE_LIMIT: usize = 25;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Partition key attribute of the metadata table.
pub const FILE_ID_ATTRIBUTE: &str = "file_id";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Processed,
    /// The object was deleted between the notification and processing.
    Missing,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Missing => "missing",
        }
    }
}

/// Object metadata looked up at processing time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectDetails {
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadataRecord {
    pub file_id: String,
    pub bucket: String,
    pub status: FileStatus,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
    pub processed_at: String,
    pub record_schema: String,
}

impl FileMetadataRecord {
    /// Builds the record for one upload. `details` is `None` when the object
    /// could not be found anymore; the notification size is kept in that case.
    pub fn from_upload(
        upload: &UploadedObject,
        details: Option<ObjectDetails>,
        processed_at: impl Into<String>,
    ) -> Self {
        let (status, content_type, size) = match details {
            Some(details) => (
                FileStatus::Processed,
                details.content_type,
                details.size.unwrap_or(upload.size),
            ),
            None => (FileStatus::Missing, None, upload.size),
        };

        Self {
            file_id: file_id(upload),
            bucket: upload.bucket.clone(),
            status,
            size,
            content_type,
            etag: upload.etag.clone(),
            uploaded_at: upload.event_time.clone(),
            processed_at: processed_at.into(),
            record_schema: METADATA_RECORD_SCHEMA_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessedFileMessage {
    pub file_id: String,
    pub bucket: String,
    pub status: FileStatus,
    pub size: u64,
    pub processed_at: String,
    pub schema_version: String,
}

impl ProcessedFileMessage {
    pub fn from_record(record: &FileMetadataRecord) -> Self {
        Self {
            file_id: record.file_id.clone(),
            bucket: record.bucket.clone(),
            status: record.status,
            size: record.size,
            processed_at: record.processed_at.clone(),
            schema_version: RESULT_MESSAGE_SCHEMA_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordPage {
    pub items: Vec<FileMetadataRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn parse_page_limit(raw: Option<&str>) -> Result<usize, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(DEFAULT_PAGE_LIMIT);
    };

    let limit = raw.parse::<usize>().map_err(|_| {
        ValidationError::new(format!("limit must be a positive integer, got '{raw}'"))
    })?;
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(ValidationError::new(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    Ok(limit)
}
