use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// API Gateway proxy request (REST or HTTP API payload).
    HttpRequest,
    /// Anything else is treated as an upload notification and validated by
    /// the processor.
    Notification,
}

pub fn classify_event(event: &Value) -> EventKind {
    let rest_method = event.get("httpMethod").and_then(Value::as_str).is_some();
    let http_api_method = event
        .pointer("/requestContext/http/method")
        .and_then(Value::as_str)
        .is_some();

    if rest_method || http_api_method {
        EventKind::HttpRequest
    } else {
        EventKind::Notification
    }
}

pub fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}
