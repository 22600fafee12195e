use sha2::{Digest, Sha256};

use crate::contract::ValidationError;
use crate::notification::UploadedObject;

/// Decodes an object key as it appears in S3 event notifications, where
/// spaces arrive as `+` and everything else is percent-encoded.
pub fn decode_object_key(raw: &str) -> Result<String, ValidationError> {
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced)
        .map_err(|error| ValidationError::new(format!("object key is not valid UTF-8: {error}")))?;
    Ok(decoded.into_owned())
}

pub fn file_id(upload: &UploadedObject) -> String {
    upload.key.clone()
}

pub fn message_group_id(upload: &UploadedObject) -> String {
    upload.bucket.clone()
}

/// Stable id for FIFO result queues so redelivered notifications for the
/// same object version collapse into one message.
pub fn deduplication_id(upload: &UploadedObject) -> String {
    let version = upload
        .sequencer
        .as_deref()
        .or(upload.etag.as_deref())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(upload.bucket.as_bytes());
    hasher.update(b"/");
    hasher.update(upload.key.as_bytes());
    hasher.update(b"/");
    hasher.update(version.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn is_fifo_queue(queue_url: &str) -> bool {
    queue_url.trim_end_matches('/').ends_with(".fifo")
}
