/// HTTP endpoint for water usage forecasts
///
/// Endpoints:
/// - GET /ping, GET /healthcheck - Container health check (204, no body)
/// - GET /forecast?key=<id>&key=<id>... - Forecast for the given areas
///   (also served at `/`)
///
/// Requests are handed to a worker pool. Each worker opens its own database
/// connection per request, so the shared working directory is the only
/// state requests have in common.

use std::sync::Arc;

use threadpool::ThreadPool;

use crate::db::DbConfigError;
use crate::error::{ErrorCode, RequestError};
use crate::job::{ForecastJob, Forecaster, JobId};
use crate::keys::build_match_pattern;
use crate::model::AreaQuery;
use crate::pipeline::{ForecastPipeline, PipelineOptions};
use crate::store::ForecastStore;

pub const SCOPE_HEADER: &str = "X-Authenticated-Scope";
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";
pub const CONTENT_TYPE: &str = "text/json";

/// Opens the store used by a single request.
pub type StoreFactory =
    Box<dyn Fn() -> Result<Box<dyn ForecastStore>, DbConfigError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Dependencies shared (read-only) by all request handlers.
pub struct EndpointContext {
    pub service_name: String,
    pub required_scope: Option<String>,
    pub options: PipelineOptions,
    pub forecaster: Box<dyn Forecaster + Send + Sync>,
    pub open_store: StoreFactory,
}

/// Response produced by [`handle_request`] before it is put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Option<String>,
    pub request_id: String,
}

impl Reply {
    fn error(ctx: &EndpointContext, code: ErrorCode, request_id: &JobId) -> Self {
        let error = RequestError::new(&ctx.service_name, code);
        let body = serde_json::to_string(&error).unwrap_or_else(|e| {
            log::error!("unable to encode request error into json: {}", e);
            String::new()
        });
        Reply {
            status: error.http_status,
            body: Some(body),
            request_id: request_id.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

/// Collects every `key` parameter of a query string, in order.
pub fn parse_area_query(query_string: &str) -> AreaQuery {
    let identifiers = query_string
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(name) == "key").then(|| decode(value))
        });
    AreaQuery::new(identifiers)
}

fn decode(component: &str) -> String {
    let component = component.replace('+', " ");
    match urlencoding::decode(&component) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => component,
    }
}

/// Checks the scope list the gateway put into `X-Authenticated-Scope`.
fn check_scope(required: &str, header: Option<&str>) -> Result<(), ErrorCode> {
    let header = match header {
        Some(h) if !h.trim().is_empty() => h,
        _ => return Err(ErrorCode::MissingAuthorizationInformation),
    };

    if header.split(',').any(|scope| scope.trim() == required) {
        Ok(())
    } else {
        Err(ErrorCode::InsufficientScope)
    }
}

/// Routes one request and runs the forecast pipeline if asked to.
pub fn handle_request(
    ctx: &EndpointContext,
    method: &str,
    url: &str,
    scope_header: Option<&str>,
) -> Reply {
    let request_id = JobId::generate();
    let (path, query_string) = url.split_once('?').unwrap_or((url, ""));

    if !method.eq_ignore_ascii_case("GET") {
        log::warn!("{} {} rejected: unsupported method", method, path);
        return Reply::error(ctx, ErrorCode::UnsupportedMethod, &request_id);
    }

    if path == "/ping" || path == "/healthcheck" {
        return Reply {
            status: 204,
            body: None,
            request_id: request_id.to_string(),
        };
    }

    if let Some(required) = &ctx.required_scope {
        if let Err(code) = check_scope(required, scope_header) {
            log::warn!("request {} rejected: {:?}", request_id, code);
            return Reply::error(ctx, code, &request_id);
        }
    }

    match path {
        "/" | "/forecast" => handle_forecast(ctx, parse_area_query(query_string), request_id),
        _ => Reply::error(ctx, ErrorCode::RouteNotFound, &request_id),
    }
}

fn handle_forecast(ctx: &EndpointContext, query: AreaQuery, request_id: JobId) -> Reply {
    log::info!("request {}: forecast for {:?}", request_id, query.identifiers);

    if build_match_pattern(&query).is_none() {
        log::warn!("request {}: no shape keys supplied", request_id);
        return Reply::error(ctx, ErrorCode::MissingShapeKeys, &request_id);
    }

    let mut store = match (ctx.open_store)() {
        Ok(store) => store,
        Err(e) => {
            log::error!("request {}: {}", request_id, e);
            return Reply::error(ctx, ErrorCode::InternalError, &request_id);
        }
    };

    let job = ForecastJob::with_id(request_id.clone(), &ctx.options.work_dir);
    let mut pipeline = ForecastPipeline::new(store.as_mut(), ctx.forecaster.as_ref(), &ctx.options);

    let response = match pipeline.run_with_job(&query, &job) {
        Ok(response) => response,
        Err(e) => return Reply::error(ctx, e.code(), &request_id),
    };

    match serde_json::to_string(&response) {
        Ok(body) => Reply {
            status: 200,
            body: Some(body),
            request_id: request_id.to_string(),
        },
        Err(e) => {
            log::error!("request {}: unable to encode forecast into json: {}", request_id, e);
            Reply::error(ctx, ErrorCode::InternalError, &request_id)
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

fn header(name: &str, value: &str) -> Option<tiny_http::Header> {
    tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn serve(ctx: &EndpointContext, request: tiny_http::Request) {
    let method = request.method().to_string();
    let url = request.url().to_string();
    let scope = request
        .headers()
        .iter()
        .find(|h| h.field.equiv(SCOPE_HEADER))
        .map(|h| h.value.as_str().to_string());

    let reply = handle_request(ctx, &method, &url, scope.as_deref());
    log::debug!("{} {} -> {}", method, url, reply.status);

    let mut response = tiny_http::Response::from_data(reply.body.unwrap_or_default().into_bytes())
        .with_status_code(tiny_http::StatusCode(reply.status));
    if reply.status != 204 {
        if let Some(h) = header("Content-Type", CONTENT_TYPE) {
            response.add_header(h);
        }
    }
    if let Some(h) = header(REQUEST_ID_HEADER, &reply.request_id) {
        response.add_header(h);
    }

    if let Err(e) = request.respond(response) {
        log::error!("failed to send response for request {}: {}", reply.request_id, e);
    }
}

/// Start HTTP endpoint server on the specified port. Blocks forever.
pub fn start_endpoint_server(
    port: u16,
    workers: usize,
    ctx: Arc<EndpointContext>,
) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    log::info!("HTTP endpoint listening on http://0.0.0.0:{}", port);
    log::info!("   GET /forecast?key=... - Water usage forecast");
    log::info!("   GET /ping, /healthcheck - Health check");

    let pool = ThreadPool::new(workers.max(1));
    for request in server.incoming_requests() {
        let ctx = Arc::clone(&ctx);
        pool.execute(move || serve(&ctx, request));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
