//! AWS SDK implementations of the adapter traits.
//!
//! Handlers are synchronous, so each call parks the current worker with
//! `block_in_place` and drives the SDK future on the ambient runtime. This
//! requires the multi-threaded tokio runtime.

use std::collections::HashMap;
use std::future::Future;

use aws_sdk_dynamodb::types::AttributeValue;
use file_pipeline_core::contract::{
    FileMetadataRecord, ObjectDetails, ProcessedFileMessage, RecordPage, FILE_ID_ATTRIBUTE,
};
use file_pipeline_core::keys::is_fifo_queue;

use crate::adapters::metadata_store::MetadataStore;
use crate::adapters::object_inspector::ObjectInspector;
use crate::adapters::result_queue::{PublishOptions, ResultPublisher};

type DynamoItem = HashMap<String, AttributeValue>;

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

#[derive(Debug, Clone)]
pub struct DynamoMetadataStore {
    table: String,
    client: aws_sdk_dynamodb::Client,
}

impl DynamoMetadataStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            client,
        }
    }
}

impl MetadataStore for DynamoMetadataStore {
    fn put_record(&self, record: &FileMetadataRecord) -> Result<(), String> {
        let item: DynamoItem = serde_dynamo::to_item(record)
            .map_err(|error| format!("failed to convert metadata record: {error}"))?;
        let client = self.client.clone();
        let table = self.table.clone();

        block_on(async move {
            client
                .put_item()
                .table_name(table)
                .set_item(Some(item))
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to put metadata record: {error}"))
        })
    }

    fn get_record(&self, file_id: &str) -> Result<Option<FileMetadataRecord>, String> {
        let client = self.client.clone();
        let table = self.table.clone();
        let key = AttributeValue::S(file_id.to_string());

        let output = block_on(async move {
            client
                .get_item()
                .table_name(table)
                .key(FILE_ID_ATTRIBUTE, key)
                .send()
                .await
                .map_err(|error| format!("failed to get metadata record: {error}"))
        })?;

        output
            .item()
            .cloned()
            .map(|item| {
                serde_dynamo::from_item(item)
                    .map_err(|error| format!("failed to deserialize metadata record: {error}"))
            })
            .transpose()
    }

    fn list_records(&self, limit: usize, cursor: Option<&str>) -> Result<RecordPage, String> {
        let client = self.client.clone();
        let table = self.table.clone();
        let start_key = cursor.map(|file_id| {
            HashMap::from([(
                FILE_ID_ATTRIBUTE.to_string(),
                AttributeValue::S(file_id.to_string()),
            )])
        });
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);

        let output = block_on(async move {
            client
                .scan()
                .table_name(table)
                .limit(limit)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|error| format!("failed to scan metadata table: {error}"))
        })?;

        let items = output
            .items()
            .iter()
            .cloned()
            .map(|item| {
                serde_dynamo::from_item(item)
                    .map_err(|error| format!("failed to deserialize metadata record: {error}"))
            })
            .collect::<Result<Vec<FileMetadataRecord>, String>>()?;
        let next_cursor = output
            .last_evaluated_key()
            .and_then(|key| key.get(FILE_ID_ATTRIBUTE))
            .and_then(|value| value.as_s().ok())
            .cloned();

        Ok(RecordPage { items, next_cursor })
    }
}

#[derive(Debug, Clone)]
pub struct SqsResultPublisher {
    queue_url: String,
    client: aws_sdk_sqs::Client,
}

impl SqsResultPublisher {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            client,
        }
    }
}

impl ResultPublisher for SqsResultPublisher {
    fn publish(
        &self,
        message: &ProcessedFileMessage,
        options: &PublishOptions,
    ) -> Result<String, String> {
        let body = serde_json::to_string(message)
            .map_err(|error| format!("failed to serialize result message: {error}"))?;
        let client = self.client.clone();
        let queue_url = self.queue_url.clone();
        let options = options.clone();

        let output = block_on(async move {
            client
                .send_message()
                .queue_url(queue_url)
                .message_body(body)
                .set_message_group_id(options.message_group_id)
                .set_message_deduplication_id(options.deduplication_id)
                .send()
                .await
                .map_err(|error| format!("failed to send result message: {error}"))
        })?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }

    fn is_fifo(&self) -> bool {
        is_fifo_queue(&self.queue_url)
    }
}

#[derive(Debug, Clone)]
pub struct S3ObjectInspector {
    client: aws_sdk_s3::Client,
}

impl S3ObjectInspector {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

impl ObjectInspector for S3ObjectInspector {
    fn inspect(&self, bucket: &str, key: &str) -> Result<Option<ObjectDetails>, String> {
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();

        let result =
            block_on(async move { client.head_object().bucket(bucket).key(key).send().await });

        match result {
            Ok(output) => Ok(Some(ObjectDetails {
                content_type: output.content_type().map(str::to_string),
                size: output
                    .content_length()
                    .and_then(|length| u64::try_from(length).ok()),
            })),
            Err(error)
                if error
                    .as_service_error()
                    .map(|service_error| service_error.is_not_found())
                    .unwrap_or(false) =>
            {
                Ok(None)
            }
            Err(error) => Err(format!("failed to inspect object: {error}")),
        }
    }
}
