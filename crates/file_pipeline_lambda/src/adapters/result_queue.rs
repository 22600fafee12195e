use file_pipeline_core::contract::ProcessedFileMessage;

/// FIFO attributes; both stay `None` for standard queues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub message_group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

pub trait ResultPublisher {
    /// Returns the queue-assigned message id.
    fn publish(
        &self,
        message: &ProcessedFileMessage,
        options: &PublishOptions,
    ) -> Result<String, String>;

    /// FIFO queues require a message group and deduplication id.
    fn is_fifo(&self) -> bool {
        false
    }
}
