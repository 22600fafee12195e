//! Read endpoint over the metadata table.
//!
//! Routes:
//! - `GET /files` lists records, paged by `limit` and `cursor`.
//! - `GET /files/{file_id+}` returns one record.

use file_pipeline_core::contract::parse_page_limit;
use serde_json::{json, Map, Value};

use crate::adapters::metadata_store::MetadataStore;
use crate::handlers::response::{
    error_response, success_response, validation_error_response, ApiGatewayResponse,
};

pub const FILES_ROUTE: &str = "/files";
pub const FILE_ROUTE: &str = "/files/{file_id+}";
pub const FILE_ID_PATH_PARAMETER: &str = "file_id";

const HTTP_API_DEFAULT_STAGE: &str = "$default";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    ListFiles,
    GetFile(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
struct GatewayRequest {
    method: String,
    /// Request path relative to the API, without any HTTP API stage prefix.
    path: String,
    /// Matched route template: REST `resource` or the path part of an HTTP
    /// API `routeKey`.
    route_template: Option<String>,
    path_parameters: Map<String, Value>,
    query: Map<String, Value>,
}

impl GatewayRequest {
    fn from_event(event: &Value) -> Result<Self, String> {
        let Some(object) = event.as_object() else {
            return Err("Request payload must be a JSON object".to_string());
        };

        let method = object
            .get("httpMethod")
            .and_then(Value::as_str)
            .or_else(|| {
                event
                    .pointer("/requestContext/http/method")
                    .and_then(Value::as_str)
            })
            .ok_or_else(|| "Request is missing an HTTP method".to_string())?
            .to_ascii_uppercase();

        // REST `path` never carries the stage; HTTP API `rawPath` does unless
        // the stage is `$default`.
        let path = match object.get("path").and_then(Value::as_str) {
            Some(path) => path.to_string(),
            None => {
                let raw_path = object
                    .get("rawPath")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let stage = event
                    .pointer("/requestContext/stage")
                    .and_then(Value::as_str);
                strip_stage(raw_path, stage).to_string()
            }
        };

        let route_template = object
            .get("resource")
            .and_then(Value::as_str)
            .or_else(|| {
                object
                    .get("routeKey")
                    .and_then(Value::as_str)
                    .and_then(|route_key| route_key.split_once(' '))
                    .map(|(_, template)| template)
            })
            .map(str::to_string);

        Ok(Self {
            method,
            path,
            route_template,
            path_parameters: object_field(object, "pathParameters"),
            query: object_field(object, "queryStringParameters"),
        })
    }

    fn route(&self) -> Route {
        match self.route_template.as_deref() {
            Some(FILES_ROUTE) => Route::ListFiles,
            Some(FILE_ROUTE) => self
                .path_parameter_file_id()
                .or_else(|| self.path_file_id())
                .map_or(Route::Unknown, Route::GetFile),
            Some(_) => Route::Unknown,
            None => self.route_from_path(),
        }
    }

    fn route_from_path(&self) -> Route {
        if self.path.trim_end_matches('/') == FILES_ROUTE {
            return Route::ListFiles;
        }
        match self.path_file_id() {
            Some(from_path) => Route::GetFile(self.path_parameter_file_id().unwrap_or(from_path)),
            None => Route::Unknown,
        }
    }

    fn path_parameter_file_id(&self) -> Option<String> {
        self.path_parameters
            .get(FILE_ID_PATH_PARAMETER)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(decode_path_segment)
    }

    fn path_file_id(&self) -> Option<String> {
        self.path
            .strip_prefix(FILES_ROUTE)?
            .strip_prefix('/')
            .filter(|file_id| !file_id.is_empty())
            .map(decode_path_segment)
    }

    fn query_value(&self, name: &str) -> Option<&str> {
        self.query.get(name).and_then(Value::as_str)
    }
}

fn strip_stage<'a>(raw_path: &'a str, stage: Option<&str>) -> &'a str {
    match stage {
        Some(stage) if !stage.is_empty() && stage != HTTP_API_DEFAULT_STAGE => raw_path
            .strip_prefix('/')
            .and_then(|rest| rest.strip_prefix(stage))
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(raw_path),
        _ => raw_path,
    }
}

fn object_field(object: &Map<String, Value>, name: &str) -> Map<String, Value> {
    object
        .get(name)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn decode_path_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

pub fn handle_api_event(event: Value, store: &dyn MetadataStore) -> ApiGatewayResponse {
    let request = match GatewayRequest::from_event(&event) {
        Ok(value) => value,
        Err(message) => return validation_error_response(&message),
    };

    match (request.route(), request.method.as_str()) {
        (Route::Unknown, _) => error_response(
            404,
            json!({
                "error": "route_not_found",
                "message": format!("No route for {} {}", request.method, request.path),
            }),
        ),
        (_, method) if method != "GET" => error_response(
            405,
            json!({
                "error": "method_not_allowed",
                "message": format!("{method} is not supported"),
            }),
        ),
        (Route::GetFile(file_id), _) => get_file(store, &file_id),
        (Route::ListFiles, _) => list_files(store, &request),
    }
}

fn get_file(store: &dyn MetadataStore, file_id: &str) -> ApiGatewayResponse {
    match store.get_record(file_id) {
        Ok(Some(record)) => success_response(200, record),
        Ok(None) => error_response(
            404,
            json!({
                "error": "not_found",
                "message": format!("File '{file_id}' not found"),
            }),
        ),
        Err(message) => store_error_response(&message),
    }
}

fn list_files(store: &dyn MetadataStore, request: &GatewayRequest) -> ApiGatewayResponse {
    let limit = match parse_page_limit(request.query_value("limit")) {
        Ok(value) => value,
        Err(error) => return validation_error_response(error.message()),
    };
    // API Gateway has already decoded query string values.
    let cursor = request
        .query_value("cursor")
        .filter(|value| !value.is_empty());

    match store.list_records(limit, cursor) {
        Ok(page) => success_response(200, page),
        Err(message) => store_error_response(&message),
    }
}

fn store_error_response(message: &str) -> ApiGatewayResponse {
    tracing::error!(error = %message, "metadata store request failed");
    error_response(
        500,
        json!({
            "error": "store_error",
            "message": "Failed to read file metadata",
        }),
    )
}
