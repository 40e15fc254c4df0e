/// Request errors returned to HTTP callers and the pipeline failures that
/// produce them.
///
/// Each [`ErrorCode`] has a fixed status, title and description. The body
/// sent to the caller is built once from that table and never modified:
///
/// ```json
/// {
///   "httpCode": 503,
///   "httpError": "Service Unavailable",
///   "error": "water-usage-forecasts.NO_WATER_USAGE_DATA",
///   "errorName": "No Water Usage Data",
///   "errorDescription": "..."
/// }
/// ```

use serde::{Deserialize, Serialize};

use crate::job::{ForecasterError, JobError};
use crate::series::TransformError;
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Error code table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MissingAuthorizationInformation,
    InsufficientScope,
    UnsupportedMethod,
    RouteNotFound,
    MissingShapeKeys,
    NoWaterUsageData,
    DatabaseQueryError,
    DataWriting,
    RScriptError,
    MissingForecastResult,
    InternalError,
}

impl ErrorCode {
    /// Code as it appears after the service name in the `error` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingAuthorizationInformation => "MISSING_AUTHORIZATION_INFORMATION",
            ErrorCode::InsufficientScope => "INSUFFICIENT_SCOPE",
            ErrorCode::UnsupportedMethod => "UNSUPPORTED_METHOD",
            ErrorCode::RouteNotFound => "ROUTE_NOT_FOUND",
            ErrorCode::MissingShapeKeys => "NO_SHAPE_KEYS",
            ErrorCode::NoWaterUsageData => "NO_WATER_USAGE_DATA",
            ErrorCode::DatabaseQueryError => "DATABASE_QUERY_ERROR",
            ErrorCode::DataWriting => "INTERNAL_DATA_WRITE_ERROR",
            ErrorCode::RScriptError => "R_SCRIPT_EXECUTION_ERROR",
            ErrorCode::MissingForecastResult => "MISSING_FORECAST_RESULT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::MissingAuthorizationInformation => 401,
            ErrorCode::InsufficientScope => 403,
            ErrorCode::UnsupportedMethod => 405,
            ErrorCode::RouteNotFound => 404,
            ErrorCode::MissingShapeKeys => 400,
            ErrorCode::NoWaterUsageData => 503,
            ErrorCode::DatabaseQueryError
            | ErrorCode::DataWriting
            | ErrorCode::RScriptError
            | ErrorCode::MissingForecastResult
            | ErrorCode::InternalError => 500,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorCode::MissingAuthorizationInformation => "Unauthorized",
            ErrorCode::InsufficientScope => "Insufficient Scope",
            ErrorCode::UnsupportedMethod => "Unsupported HTTP Method",
            ErrorCode::RouteNotFound => "Route Not Found",
            ErrorCode::MissingShapeKeys => "No Shape Keys",
            ErrorCode::NoWaterUsageData => "No Water Usage Data",
            ErrorCode::DatabaseQueryError => "Database Query Error",
            ErrorCode::DataWriting => "Internal data writing error",
            ErrorCode::RScriptError => "R Script execution error",
            ErrorCode::MissingForecastResult => "Missing Forecast Result",
            ErrorCode::InternalError => "Internal Error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::MissingAuthorizationInformation => {
                "The accessed resource requires authorization, however the request did not \
                 contain valid authorization information. Please check the request"
            }
            ErrorCode::InsufficientScope => {
                "The authorization was successful, but the resource is protected by a scope \
                 which was not included in the authorization information"
            }
            ErrorCode::UnsupportedMethod => {
                "The used HTTP method is not supported by this service. Please check the \
                 documentation for further information"
            }
            ErrorCode::RouteNotFound => "The requested path is not served by this service",
            ErrorCode::MissingShapeKeys => "The request did not contain any shape keys",
            ErrorCode::NoWaterUsageData => {
                "The request was formed correctly, but there are no water usage datasets \
                 available for the selected areas"
            }
            ErrorCode::DatabaseQueryError => {
                "The service was unable to successfully execute the database query. Please \
                 check the logs for more information"
            }
            ErrorCode::DataWriting => "A file needed for making the prognosis could not be written",
            ErrorCode::RScriptError => {
                "An error occurred while trying to execute the underlying R script. Please \
                 check the server logs"
            }
            ErrorCode::MissingForecastResult => {
                "The forecasting process finished but did not produce a readable result for \
                 every migration scenario"
            }
            ErrorCode::InternalError => "During the handling of the request an unexpected error occurred",
        }
    }
}

/// Reason phrase for the status codes this service emits.
fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

// ---------------------------------------------------------------------------
// Request error body
// ---------------------------------------------------------------------------

/// JSON error body sent back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    #[serde(rename = "httpCode")]
    pub http_status: u16,
    #[serde(rename = "httpError")]
    pub http_error: String,
    #[serde(rename = "error")]
    pub code: String,
    #[serde(rename = "errorName")]
    pub title: String,
    #[serde(rename = "errorDescription")]
    pub description: String,
}

impl RequestError {
    pub fn new(service_name: &str, code: ErrorCode) -> Self {
        let status = code.http_status();
        Self {
            http_status: status,
            http_error: reason_phrase(status).to_string(),
            code: format!("{}.{}", service_name, code.as_str()),
            title: code.title().to_string(),
            description: code.description().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline failures
// ---------------------------------------------------------------------------

/// Technical cause of a failed forecast request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("request did not contain any shape keys")]
    MissingShapeKeys,

    #[error("no water usage data for {key_count} resolved municipality keys")]
    NoWaterUsageData { key_count: usize },

    #[error("municipality key lookup failed: {0}")]
    ResolveKeys(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Forecaster(#[from] ForecasterError),
}

impl PipelineError {
    /// Request error code reported for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::MissingShapeKeys => ErrorCode::MissingShapeKeys,
            PipelineError::NoWaterUsageData { .. } => ErrorCode::NoWaterUsageData,
            PipelineError::ResolveKeys(_) => ErrorCode::InternalError,
            PipelineError::Store(_) => ErrorCode::DatabaseQueryError,
            PipelineError::Transform(_) => ErrorCode::InternalError,
            PipelineError::Job(JobError::MissingResult { .. }) => ErrorCode::MissingForecastResult,
            PipelineError::Job(_) => ErrorCode::DataWriting,
            PipelineError::Forecaster(_) => ErrorCode::RScriptError,
        }
    }

    pub fn to_request_error(&self, service_name: &str) -> RequestError {
        RequestError::new(service_name, self.code())
    }
}
