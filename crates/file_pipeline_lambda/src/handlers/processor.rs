//! File-processing handler: one metadata record and one result message per
//! created object.

use std::time::Instant;

use aws_lambda_events::event::sqs::SqsEvent;
use file_pipeline_core::contract::{
    FileMetadataRecord, FileStatus, ProcessedFileMessage, ValidationError,
};
use file_pipeline_core::keys::{deduplication_id, message_group_id};
use file_pipeline_core::notification::{
    parse_notification, parse_notification_value, NotificationBatch, UploadedObject,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::adapters::metadata_store::MetadataStore;
use crate::adapters::object_inspector::ObjectInspector;
use crate::adapters::result_queue::{PublishOptions, ResultPublisher};
use crate::handlers::dispatch::is_sqs_event;
use crate::handlers::response::{error_response, success_response, ApiGatewayResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub processed_at: String,
}

/// `result_publisher` is `None` when no result queue is configured; the
/// processor then rejects notifications as a misconfiguration.
#[derive(Clone, Copy)]
pub struct PipelineAdapters<'a> {
    pub metadata_store: &'a dyn MetadataStore,
    pub result_publisher: Option<&'a dyn ResultPublisher>,
    pub object_inspector: &'a dyn ObjectInspector,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error(transparent)]
    InvalidEvent(#[from] ValidationError),
    #[error("RESULT_QUEUE_URL must be configured")]
    MissingResultQueue,
    #[error("failed to inspect s3://{bucket}/{key}: {message}")]
    Inspect {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("failed to write metadata for '{file_id}': {message}")]
    MetadataWrite { file_id: String, message: String },
    #[error("failed to publish result for '{file_id}': {message}")]
    Publish { file_id: String, message: String },
}

impl ProcessError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidEvent(_) => 400,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "validation_error",
            Self::MissingResultQueue => "misconfiguration",
            Self::Inspect { .. } | Self::MetadataWrite { .. } | Self::Publish { .. } => {
                "processing_failed"
            }
        }
    }

    fn file_id(&self) -> Option<&str> {
        match self {
            Self::Inspect { key, .. } => Some(key),
            Self::MetadataWrite { file_id, .. } | Self::Publish { file_id, .. } => Some(file_id),
            Self::InvalidEvent(_) | Self::MissingResultQueue => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessedFile {
    pub file_id: String,
    pub status: FileStatus,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessorSummary {
    pub status: String,
    pub processed: Vec<ProcessedFile>,
    pub skipped: usize,
}

pub fn handle_notification_event(
    event: Value,
    config: &ProcessorConfig,
    adapters: PipelineAdapters<'_>,
) -> ApiGatewayResponse {
    match process_notification_event(event, config, adapters) {
        Ok(summary) => success_response(200, summary),
        Err(error) => {
            match &error {
                ProcessError::InvalidEvent(_) => {
                    tracing::warn!(error = %error, "rejected notification event")
                }
                _ => tracing::error!(error = %error, "notification processing failed"),
            }
            let mut body = json!({
                "error": error.error_code(),
                "message": error.to_string(),
            });
            if let Some(file_id) = error.file_id() {
                body["file_id"] = json!(file_id);
            }
            error_response(error.status_code(), body)
        }
    }
}

pub fn process_notification_event(
    event: Value,
    config: &ProcessorConfig,
    adapters: PipelineAdapters<'_>,
) -> Result<ProcessorSummary, ProcessError> {
    let batch = extract_uploads(event)?;

    let publisher = adapters
        .result_publisher
        .ok_or(ProcessError::MissingResultQueue)?;

    tracing::info!(
        uploads = batch.uploads.len(),
        skipped = batch.skipped,
        "processing notification batch"
    );

    let mut processed = Vec::with_capacity(batch.uploads.len());
    for upload in &batch.uploads {
        processed.push(process_upload(upload, publisher, config, adapters)?);
    }

    Ok(ProcessorSummary {
        status: "processed".to_string(),
        processed,
        skipped: batch.skipped,
    })
}

/// Collects uploads from either an SQS batch of notification bodies or a
/// direct S3 event.
pub fn extract_uploads(event: Value) -> Result<NotificationBatch, ValidationError> {
    if !is_sqs_event(&event) {
        return parse_notification_value(event);
    }

    let sqs_event: SqsEvent = serde_json::from_value(event)
        .map_err(|error| ValidationError::new(format!("Malformed SQS event: {error}")))?;

    let mut batch = NotificationBatch::default();
    for (index, record) in sqs_event.records.into_iter().enumerate() {
        let body = record
            .body
            .ok_or_else(|| ValidationError::new(format!("SQS record {index} has no body")))?;
        batch.extend(parse_notification(&body)?);
    }
    Ok(batch)
}

#[tracing::instrument(skip_all, fields(bucket = %upload.bucket, key = %upload.key))]
fn process_upload(
    upload: &UploadedObject,
    publisher: &dyn ResultPublisher,
    config: &ProcessorConfig,
    adapters: PipelineAdapters<'_>,
) -> Result<ProcessedFile, ProcessError> {
    let started_at = Instant::now();

    let details = adapters
        .object_inspector
        .inspect(&upload.bucket, &upload.key)
        .map_err(|message| ProcessError::Inspect {
            bucket: upload.bucket.clone(),
            key: upload.key.clone(),
            message,
        })?;
    if details.is_none() {
        tracing::warn!("object no longer exists, recording as missing");
    }

    let record = FileMetadataRecord::from_upload(upload, details, config.processed_at.clone());
    adapters
        .metadata_store
        .put_record(&record)
        .map_err(|message| ProcessError::MetadataWrite {
            file_id: record.file_id.clone(),
            message,
        })?;

    let options = if publisher.is_fifo() {
        PublishOptions {
            message_group_id: Some(message_group_id(upload)),
            deduplication_id: Some(deduplication_id(upload)),
        }
    } else {
        PublishOptions::default()
    };
    let message_id = publisher
        .publish(&ProcessedFileMessage::from_record(&record), &options)
        .map_err(|message| ProcessError::Publish {
            file_id: record.file_id.clone(),
            message,
        })?;

    tracing::info!(
        file_id = %record.file_id,
        status = record.status.as_str(),
        size = record.size,
        message_id = %message_id,
        duration_ms = started_at.elapsed().as_millis() as u64,
        "file processed"
    );

    Ok(ProcessedFile {
        file_id: record.file_id,
        status: record.status,
        message_id,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use file_pipeline_core::contract::{ObjectDetails, RecordPage};

    use super::*;

    #[derive(Default)]
    struct CapturingStore {
        records: Mutex<Vec<FileMetadataRecord>>,
        fail_on: Option<String>,
    }

    impl CapturingStore {
        fn failing_on(file_id: &str) -> Self {
            Self {
                fail_on: Some(file_id.to_string()),
                ..Self::default()
            }
        }

        fn records(&self) -> Vec<FileMetadataRecord> {
            self.records.lock().expect("poisoned mutex").clone()
        }
    }

    impl MetadataStore for CapturingStore {
        fn put_record(&self, record: &FileMetadataRecord) -> Result<(), String> {
            if self.fail_on.as_deref() == Some(record.file_id.as_str()) {
                return Err("throttled".to_string());
            }
            self.records
                .lock()
                .expect("poisoned mutex")
                .push(record.clone());
            Ok(())
        }

        fn get_record(&self, _file_id: &str) -> Result<Option<FileMetadataRecord>, String> {
            Ok(None)
        }

        fn list_records(&self, _limit: usize, _cursor: Option<&str>) -> Result<RecordPage, String> {
            Ok(RecordPage {
                items: Vec::new(),
                next_cursor: None,
            })
        }
    }

    #[derive(Default)]
    struct CapturingPublisher {
        messages: Mutex<Vec<(ProcessedFileMessage, PublishOptions)>>,
        fifo: bool,
        unavailable: bool,
    }

    impl CapturingPublisher {
        fn messages(&self) -> Vec<(ProcessedFileMessage, PublishOptions)> {
            self.messages.lock().expect("poisoned mutex").clone()
        }
    }

    impl ResultPublisher for CapturingPublisher {
        fn publish(
            &self,
            message: &ProcessedFileMessage,
            options: &PublishOptions,
        ) -> Result<String, String> {
            if self.unavailable {
                return Err("queue does not exist".to_string());
            }
            let mut messages = self.messages.lock().expect("poisoned mutex");
            messages.push((message.clone(), options.clone()));
            Ok(format!("msg-{}", messages.len()))
        }

        fn is_fifo(&self) -> bool {
            self.fifo
        }
    }

    #[derive(Default)]
    struct FixedInspector {
        details: Option<ObjectDetails>,
        fail_on: Option<String>,
        inspected: Mutex<Vec<String>>,
    }

    impl FixedInspector {
        fn inspected(&self) -> Vec<String> {
            self.inspected.lock().expect("poisoned mutex").clone()
        }
    }

    impl ObjectInspector for FixedInspector {
        fn inspect(&self, _bucket: &str, key: &str) -> Result<Option<ObjectDetails>, String> {
            self.inspected
                .lock()
                .expect("poisoned mutex")
                .push(key.to_string());
            if self.fail_on.as_deref() == Some(key) {
                return Err("access denied".to_string());
            }
            Ok(self.details.clone())
        }
    }

    fn present() -> FixedInspector {
        FixedInspector {
            details: Some(ObjectDetails {
                content_type: Some("text/csv".to_string()),
                size: Some(42),
            }),
            ..FixedInspector::default()
        }
    }

    fn config() -> ProcessorConfig {
        ProcessorConfig {
            processed_at: "2026-02-14T10:00:05+00:00".to_string(),
        }
    }

    fn adapters<'a>(
        store: &'a CapturingStore,
        publisher: &'a CapturingPublisher,
        inspector: &'a FixedInspector,
    ) -> PipelineAdapters<'a> {
        PipelineAdapters {
            metadata_store: store,
            result_publisher: Some(publisher),
            object_inspector: inspector,
        }
    }

    fn notification_body(keys: &[&str]) -> String {
        let records: Vec<Value> = keys
            .iter()
            .map(|key| {
                json!({
                    "eventSource": "aws:s3",
                    "eventName": "ObjectCreated:Put",
                    "eventTime": "2026-02-14T10:00:00.000Z",
                    "s3": {
                        "bucket": {"name": "uploads"},
                        "object": {"key": key, "size": 7, "sequencer": "00A1"}
                    }
                })
            })
            .collect();
        json!({"Records": records}).to_string()
    }

    fn sqs_event(bodies: &[String]) -> Value {
        let records: Vec<Value> = bodies
            .iter()
            .enumerate()
            .map(|(index, body)| {
                json!({
                    "messageId": format!("m-{index}"),
                    "eventSource": "aws:sqs",
                    "body": body,
                })
            })
            .collect();
        json!({"Records": records})
    }

    #[test]
    fn writes_record_and_sends_message_per_upload() {
        let store = CapturingStore::default();
        let publisher = CapturingPublisher::default();
        let inspector = present();

        let response = handle_notification_event(
            sqs_event(&[notification_body(&["a.csv", "nested/b+c.csv"])]),
            &config(),
            adapters(&store, &publisher, &inspector),
        );

        assert_eq!(response.status_code, 200);
        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].file_id, "nested/b c.csv");
        assert_eq!(records[1].size, 42);
        assert_eq!(records[1].processed_at, "2026-02-14T10:00:05+00:00");

        let messages = publisher.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0.file_id, "a.csv");
        assert_eq!(messages[0].1, PublishOptions::default());

        let summary: ProcessorSummary =
            serde_json::from_str(&response.body).expect("summary should parse");
        assert_eq!(summary.processed[1].message_id, "msg-2");
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn accepts_direct_s3_events() {
        let store = CapturingStore::default();
        let publisher = CapturingPublisher::default();
        let inspector = present();
        let event: Value =
            serde_json::from_str(&notification_body(&["direct.txt"])).expect("valid json");

        let summary =
            process_notification_event(event, &config(), adapters(&store, &publisher, &inspector))
                .expect("direct event should process");

        assert_eq!(summary.processed.len(), 1);
        assert_eq!(store.records()[0].file_id, "direct.txt");
    }

    #[test]
    fn malformed_event_returns_400_without_side_effects() {
        let store = CapturingStore::default();
        let publisher = CapturingPublisher::default();
        let inspector = present();

        let response = handle_notification_event(
            sqs_event(&["{\"Records\": [{\"eventName\": \"ObjectCreated:Put\"}]}".to_string()]),
            &config(),
            adapters(&store, &publisher, &inspector),
        );

        assert_eq!(response.status_code, 400);
        let body = response.body_json().expect("error body should parse");
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["message"], "Record 0 is missing s3");
        assert!(store.records().is_empty());
        assert!(publisher.messages().is_empty());
        assert!(inspector.inspected().is_empty());
    }

    #[test]
    fn event_without_records_returns_400() {
        let store = CapturingStore::default();
        let publisher = CapturingPublisher::default();
        let inspector = present();

        let response = handle_notification_event(
            json!({"detail": "unexpected"}),
            &config(),
            adapters(&store, &publisher, &inspector),
        );

        assert_eq!(response.status_code, 400);
    }

    #[test]
    fn missing_result_queue_is_a_misconfiguration() {
        let store = CapturingStore::default();
        let inspector = present();

        let response = handle_notification_event(
            sqs_event(&[notification_body(&["a.csv"])]),
            &config(),
            PipelineAdapters {
                metadata_store: &store,
                result_publisher: None,
                object_inspector: &inspector,
            },
        );

        assert_eq!(response.status_code, 500);
        let body = response.body_json().expect("error body should parse");
        assert_eq!(body["error"], "misconfiguration");
        assert!(store.records().is_empty());
        assert!(inspector.inspected().is_empty());
    }

    #[test]
    fn store_failure_returns_500_and_skips_publish() {
        let store = CapturingStore::failing_on("a.csv");
        let publisher = CapturingPublisher::default();
        let inspector = present();

        let response = handle_notification_event(
            sqs_event(&[notification_body(&["a.csv"])]),
            &config(),
            adapters(&store, &publisher, &inspector),
        );

        assert_eq!(response.status_code, 500);
        let body = response.body_json().expect("error body should parse");
        assert_eq!(body["error"], "processing_failed");
        assert_eq!(body["file_id"], "a.csv");
        assert!(publisher.messages().is_empty());
    }

    #[test]
    fn publish_failure_returns_500_after_the_record_is_written() {
        let store = CapturingStore::default();
        let publisher = CapturingPublisher {
            unavailable: true,
            ..CapturingPublisher::default()
        };
        let inspector = present();

        let response = handle_notification_event(
            sqs_event(&[notification_body(&["report.csv"])]),
            &config(),
            adapters(&store, &publisher, &inspector),
        );

        assert_eq!(response.status_code, 500);
        let body = response.body_json().expect("error body should parse");
        assert_eq!(body["error"], "processing_failed");
        assert_eq!(body["file_id"], "report.csv");
        assert_eq!(
            body["message"],
            "failed to publish result for 'report.csv': queue does not exist"
        );

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_id, "report.csv");
        assert!(publisher.messages().is_empty());
    }

    #[test]
    fn inspect_failure_returns_500_without_writes() {
        let store = CapturingStore::default();
        let publisher = CapturingPublisher::default();
        let inspector = FixedInspector {
            fail_on: Some("locked.csv".to_string()),
            ..present()
        };

        let response = handle_notification_event(
            sqs_event(&[notification_body(&["locked.csv"])]),
            &config(),
            adapters(&store, &publisher, &inspector),
        );

        assert_eq!(response.status_code, 500);
        let body = response.body_json().expect("error body should parse");
        assert_eq!(body["error"], "processing_failed");
        assert_eq!(body["file_id"], "locked.csv");
        assert!(store.records().is_empty());
        assert!(publisher.messages().is_empty());
    }

    #[test]
    fn batch_stops_at_the_first_failing_upload() {
        let store = CapturingStore::failing_on("second.csv");
        let publisher = CapturingPublisher::default();
        let inspector = present();

        let error = process_notification_event(
            sqs_event(&[notification_body(&["first.csv", "second.csv", "third.csv"])]),
            &config(),
            adapters(&store, &publisher, &inspector),
        )
        .expect_err("second upload should fail the batch");

        assert_eq!(
            error,
            ProcessError::MetadataWrite {
                file_id: "second.csv".to_string(),
                message: "throttled".to_string(),
            }
        );

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_id, "first.csv");

        let messages = publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0.file_id, "first.csv");

        assert_eq!(inspector.inspected(), vec!["first.csv", "second.csv"]);
    }

    #[test]
    fn vanished_objects_are_recorded_as_missing() {
        let store = CapturingStore::default();
        let publisher = CapturingPublisher::default();
        let inspector = FixedInspector::default();

        let summary = process_notification_event(
            sqs_event(&[notification_body(&["gone.bin"])]),
            &config(),
            adapters(&store, &publisher, &inspector),
        )
        .expect("missing object is not an error");

        assert_eq!(summary.processed[0].status, FileStatus::Missing);
        assert_eq!(store.records()[0].size, 7);
    }

    #[test]
    fn fifo_queues_receive_group_and_deduplication_ids() {
        let store = CapturingStore::default();
        let publisher = CapturingPublisher {
            fifo: true,
            ..CapturingPublisher::default()
        };
        let inspector = present();

        process_notification_event(
            sqs_event(&[notification_body(&["a.csv"])]),
            &config(),
            adapters(&store, &publisher, &inspector),
        )
        .expect("event should process");

        let (_, options) = publisher.messages().remove(0);
        assert_eq!(options.message_group_id.as_deref(), Some("uploads"));
        assert_eq!(options.deduplication_id.map(|id| id.len()), Some(64));
    }

    #[test]
    fn test_events_are_acknowledged() {
        let store = CapturingStore::default();
        let publisher = CapturingPublisher::default();
        let inspector = present();

        let summary = process_notification_event(
            sqs_event(&[json!({"Event": "s3:TestEvent", "Bucket": "uploads"}).to_string()]),
            &config(),
            adapters(&store, &publisher, &inspector),
        )
        .expect("test event should be accepted");

        assert!(summary.processed.is_empty());
        assert_eq!(summary.skipped, 1);
    }
}
