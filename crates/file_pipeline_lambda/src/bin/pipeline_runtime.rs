use std::sync::Arc;

use chrono::Utc;
use file_pipeline_lambda::adapters::aws::{
    DynamoMetadataStore, S3ObjectInspector, SqsResultPublisher,
};
use file_pipeline_lambda::adapters::result_queue::ResultPublisher;
use file_pipeline_lambda::config::RuntimeConfig;
use file_pipeline_lambda::handlers::api::handle_api_event;
use file_pipeline_lambda::handlers::dispatch::{classify_event, EventKind};
use file_pipeline_lambda::handlers::processor::{
    handle_notification_event, PipelineAdapters, ProcessorConfig,
};
use file_pipeline_lambda::handlers::response::ApiGatewayResponse;
use file_pipeline_lambda::telemetry::init_tracing;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

struct RuntimeDependencies {
    metadata_store: DynamoMetadataStore,
    result_publisher: Option<SqsResultPublisher>,
    object_inspector: S3ObjectInspector,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<ApiGatewayResponse, Error> {
    let kind = classify_event(&event.payload);
    tracing::info!(request_id = %event.context.request_id, kind = ?kind, "received event");

    let response = match kind {
        EventKind::HttpRequest => handle_api_event(event.payload, &deps.metadata_store),
        EventKind::Notification => {
            let config = ProcessorConfig {
                processed_at: Utc::now().to_rfc3339(),
            };
            let adapters = PipelineAdapters {
                metadata_store: &deps.metadata_store,
                result_publisher: deps
                    .result_publisher
                    .as_ref()
                    .map(|publisher| publisher as &dyn ResultPublisher),
                object_inspector: &deps.object_inspector,
            };
            handle_notification_event(event.payload, &config, adapters)
        }
    };

    tracing::info!(status_code = response.status_code, "request completed");
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = RuntimeConfig::from_env()?;
    init_tracing(config.log_format);

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = Arc::new(RuntimeDependencies {
        metadata_store: DynamoMetadataStore::new(
            aws_sdk_dynamodb::Client::new(&aws_config),
            config.metadata_table.clone(),
        ),
        result_publisher: config
            .result_queue_url
            .as_ref()
            .map(|queue_url| {
                SqsResultPublisher::new(aws_sdk_sqs::Client::new(&aws_config), queue_url.clone())
            }),
        object_inspector: S3ObjectInspector::new(aws_sdk_s3::Client::new(&aws_config)),
    });

    tracing::info!(
        metadata_table = %config.metadata_table,
        result_queue_configured = config.result_queue_url.is_some(),
        "pipeline runtime started"
    );

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let deps = Arc::clone(&deps);
        async move { handle_request(event, &deps).await }
    }))
    .await
}
