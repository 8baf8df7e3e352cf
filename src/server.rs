//! HTTP surface of the predictor.
//!
//! One resource, `/predict`: `POST` scores a flat JSON record, `OPTIONS`
//! answers `{"success": true}` without touching the model. Failures come back
//! as `{"error": ..., "code": ...}`.

use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warp::http::header::{self, HeaderValue};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Filter, Rejection, Reply};

use crate::config::ServerConfig;
use crate::predictor::{FeatureRecord, PredictError, Predictor, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid bind address '{0}': {1}")]
    InvalidBind(String, std::net::AddrParseError),
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, warp::Error),
}

/// Build the `/predict` route tree around a shared, read-only predictor.
///
/// `OPTIONS` is answered ahead of the CORS layer so browser preflights still
/// get the `{"success": true}` body.
pub fn predict_routes<M: Regressor + 'static>(
    predictor: Arc<Predictor<M>>,
    allowed_origins: &[String],
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let predict = warp::path("predict")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_predictor(predictor))
        .and_then(handle_predict::<M>)
        .with(cors(allowed_origins));

    let origins = allowed_origins.to_vec();
    let preflight = warp::path("predict")
        .and(warp::path::end())
        .and(warp::options())
        .and(warp::header::optional::<String>("origin"))
        .map(move |origin: Option<String>| preflight_response(origin.as_deref(), &origins));

    preflight
        .or(predict)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

fn origin_allowed(allowed_origins: &[String], origin: &str) -> bool {
    allowed_origins
        .iter()
        .any(|allowed| allowed == "*" || allowed == origin)
}

fn cors(allowed_origins: &[String]) -> warp::cors::Builder {
    let cors = warp::cors()
        .allow_methods(vec!["POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);
    if allowed_origins.iter().any(|origin| origin == "*") {
        cors.allow_any_origin()
    } else {
        cors.allow_origins(allowed_origins.iter().map(String::as_str))
    }
}

// A disallowed origin still gets the body, just no CORS grant.
fn preflight_response(origin: Option<&str>, allowed_origins: &[String]) -> warp::reply::Response {
    let mut response = warp::reply::json(&PreflightResponse { success: true }).into_response();
    let Some(origin) = origin.filter(|origin| origin_allowed(allowed_origins, origin)) else {
        return response;
    };
    if let Ok(value) = HeaderValue::from_str(origin) {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("content-type"),
        );
        headers.insert(header::VARY, HeaderValue::from_static("origin"));
    }
    response
}

fn with_predictor<M: Regressor + 'static>(
    predictor: Arc<Predictor<M>>,
) -> impl Filter<Extract = (Arc<Predictor<M>>,), Error = Infallible> + Clone {
    warp::any().map(move || predictor.clone())
}

/// The body is parsed as JSON whatever its `Content-Type` says.
async fn handle_predict<M: Regressor>(
    body: Bytes,
    predictor: Arc<Predictor<M>>,
) -> Result<warp::reply::Response, Infallible> {
    let record: FeatureRecord = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(err) => {
            warn!(error = %err, "unparseable request body");
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                "invalid_body",
                &format!("Invalid request body: {}", err),
            ));
        }
    };
    match predictor.predict(&record) {
        Ok(prediction) => {
            debug!(prediction, "prediction served");
            Ok(warp::reply::json(&PredictionResponse { prediction }).into_response())
        }
        Err(err) => {
            warn!(error = %err, "prediction rejected");
            Ok(predict_error_response(&err))
        }
    }
}

fn predict_error_response(err: &PredictError) -> warp::reply::Response {
    let (status, code) = match err {
        PredictError::SchemaMismatch { .. } => (StatusCode::BAD_REQUEST, "schema_mismatch"),
        PredictError::InvalidValue { .. } => (StatusCode::BAD_REQUEST, "invalid_value"),
        PredictError::NonFinite => (StatusCode::INTERNAL_SERVER_ERROR, "inference_error"),
    };
    error_response(status, code, &err.to_string())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> warp::reply::Response {
    let body = ApiError {
        error: message.to_string(),
        code: code.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    let (status, code, message) =
        if let Some(e) = err.find::<warp::cors::CorsForbidden>() {
            (StatusCode::FORBIDDEN, "cors_forbidden", e.to_string())
        } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
            (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                "Method not allowed".to_string(),
            )
        } else if err.is_not_found() {
            (StatusCode::NOT_FOUND, "not_found", "Not found".to_string())
        } else {
            tracing::error!("Unhandled rejection: {:?}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            )
        };
    Ok(error_response(status, code, &message))
}

pub fn bind_address(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
    let ip: IpAddr = config
        .bind
        .parse()
        .map_err(|e| ServerError::InvalidBind(config.bind.clone(), e))?;
    Ok(SocketAddr::new(ip, config.port))
}

/// Serve until `shutdown` resolves. Binding happens before the first await.
pub async fn serve<M, F>(
    predictor: Predictor<M>,
    config: &ServerConfig,
    shutdown: F,
) -> Result<(), ServerError>
where
    M: Regressor + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let addr = bind_address(config)?;
    let routes = predict_routes(Arc::new(predictor), &config.allowed_origins);
    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| ServerError::Bind(addr, e))?;

    info!("Predictor listening on {}", bound);
    server.await;
    info!("Predictor stopped");
    Ok(())
}
