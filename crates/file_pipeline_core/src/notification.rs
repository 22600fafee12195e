//! S3 event notification parsing.
//!
//! Notifications reach the pipeline either as SQS message bodies or as a
//! direct S3 event; both carry the same `Records` document.

use serde::Deserialize;
use serde_json::Value;

use crate::contract::ValidationError;
use crate::keys::decode_object_key;

pub const TEST_EVENT_NAME: &str = "s3:TestEvent";
pub const OBJECT_CREATED_PREFIX: &str = "ObjectCreated:";

#[derive(Debug, Clone, Deserialize)]
pub struct S3Notification {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3NotificationRecord>,
    #[serde(rename = "Event")]
    pub event: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3NotificationRecord {
    #[serde(rename = "eventSource")]
    pub event_source: Option<String>,
    #[serde(rename = "eventName")]
    pub event_name: Option<String>,
    #[serde(rename = "eventTime")]
    pub event_time: Option<String>,
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: Option<S3BucketEntity>,
    pub object: Option<S3ObjectEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3BucketEntity {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3ObjectEntity {
    pub key: Option<String>,
    pub size: Option<u64>,
    #[serde(rename = "eTag")]
    pub e_tag: Option<String>,
    pub sequencer: Option<String>,
}

/// One created object, with its key already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub sequencer: Option<String>,
    pub event_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationBatch {
    pub uploads: Vec<UploadedObject>,
    /// Test events and non-create records.
    pub skipped: usize,
}

impl NotificationBatch {
    pub fn extend(&mut self, other: NotificationBatch) {
        self.uploads.extend(other.uploads);
        self.skipped += other.skipped;
    }
}

pub fn parse_notification(body: &str) -> Result<NotificationBatch, ValidationError> {
    let notification: S3Notification = serde_json::from_str(body)
        .map_err(|error| ValidationError::new(format!("Malformed notification body: {error}")))?;
    uploaded_objects(notification)
}

pub fn parse_notification_value(value: Value) -> Result<NotificationBatch, ValidationError> {
    if !value.is_object() {
        return Err(ValidationError::new("Notification must be a JSON object"));
    }
    let notification: S3Notification = serde_json::from_value(value)
        .map_err(|error| ValidationError::new(format!("Malformed notification: {error}")))?;
    uploaded_objects(notification)
}

pub fn uploaded_objects(
    notification: S3Notification,
) -> Result<NotificationBatch, ValidationError> {
    if notification.event.as_deref() == Some(TEST_EVENT_NAME) {
        return Ok(NotificationBatch {
            uploads: Vec::new(),
            skipped: 1,
        });
    }

    if notification.records.is_empty() {
        return Err(ValidationError::new(
            "Notification must contain at least one record",
        ));
    }

    let mut batch = NotificationBatch::default();
    for (index, record) in notification.records.into_iter().enumerate() {
        let event_name = record
            .event_name
            .as_deref()
            .ok_or_else(|| missing_field(index, "eventName"))?;
        if !event_name.starts_with(OBJECT_CREATED_PREFIX) {
            batch.skipped += 1;
            continue;
        }
        batch.uploads.push(uploaded_object(index, record)?);
    }

    Ok(batch)
}

fn uploaded_object(
    index: usize,
    record: S3NotificationRecord,
) -> Result<UploadedObject, ValidationError> {
    let entity = record.s3.ok_or_else(|| missing_field(index, "s3"))?;
    let bucket = entity
        .bucket
        .and_then(|bucket| bucket.name)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| missing_field(index, "s3.bucket.name"))?;
    let object = entity
        .object
        .ok_or_else(|| missing_field(index, "s3.object"))?;
    let raw_key = object
        .key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| missing_field(index, "s3.object.key"))?;
    let key = decode_object_key(&raw_key).map_err(|error| {
        ValidationError::new(format!("Record {index}: {}", error.message()))
    })?;

    Ok(UploadedObject {
        bucket,
        key,
        size: object.size.unwrap_or(0),
        etag: object
            .e_tag
            .map(|etag| etag.trim_matches('"').to_string())
            .filter(|etag| !etag.is_empty()),
        sequencer: object.sequencer,
        event_time: record.event_time,
    })
}

fn missing_field(index: usize, field: &str) -> ValidationError {
    ValidationError::new(format!("Record {index} is missing {field}"))
}
